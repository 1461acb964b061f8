//! Flat key-value queue settings persisted as a JSON file.
//!
//! Two keys are recognized: `max-retries` (default retry budget for new
//! jobs) and `backoff-base` (exponent base of the retry delay). The file is
//! re-read on every access, so a `config set` from another process is seen
//! by running workers on their next failure.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::AppError;
use crate::result::AppResult;

/// Key for the default retry budget of newly enqueued jobs.
pub const MAX_RETRIES_KEY: &str = "max-retries";
/// Key for the exponential backoff base.
pub const BACKOFF_BASE_KEY: &str = "backoff-base";

/// Default retry budget.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default backoff base.
pub const DEFAULT_BACKOFF_BASE: u32 = 2;

const RECOGNIZED_KEYS: [&str; 2] = [MAX_RETRIES_KEY, BACKOFF_BASE_KEY];

/// JSON-file backed settings store.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Open the store at `path`, writing the defaults if the file is absent.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let store = Self { path: path.into() };
        if !store.path.exists() {
            if let Some(parent) = store.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            store.write(&Self::defaults())?;
            debug!(path = %store.path.display(), "Created settings file with defaults");
        }
        Ok(store)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored key and value.
    pub fn get_all(&self) -> AppResult<BTreeMap<String, Value>> {
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Self::defaults());
        }
        let data: BTreeMap<String, Value> = serde_json::from_str(&raw)?;
        Ok(data)
    }

    /// Value for `key`, or `None` when unset.
    pub fn get(&self, key: &str) -> AppResult<Option<Value>> {
        Ok(self.get_all()?.remove(key))
    }

    /// Set `key` to `value`.
    ///
    /// Only the recognized keys are accepted, and their values must be
    /// non-negative integers (`backoff-base` at least 1).
    pub fn set(&self, key: &str, value: &str) -> AppResult<()> {
        if !RECOGNIZED_KEYS.contains(&key) {
            return Err(AppError::validation(format!(
                "Unknown setting '{key}' (expected one of: {})",
                RECOGNIZED_KEYS.join(", ")
            )));
        }

        let parsed: u32 = value.trim().parse().map_err(|_| {
            AppError::validation(format!(
                "Setting '{key}' must be a non-negative integer, got '{value}'"
            ))
        })?;
        if key == BACKOFF_BASE_KEY && parsed == 0 {
            return Err(AppError::validation("Setting 'backoff-base' must be at least 1"));
        }

        let mut data = self.get_all()?;
        data.insert(key.to_string(), Value::from(parsed));
        self.write(&data)?;

        debug!(key, value = parsed, "Updated setting");
        Ok(())
    }

    /// Default retry budget for new jobs.
    pub fn max_retries(&self) -> AppResult<u32> {
        self.get_u32(MAX_RETRIES_KEY, DEFAULT_MAX_RETRIES)
    }

    /// Exponential backoff base.
    pub fn backoff_base(&self) -> AppResult<u32> {
        self.get_u32(BACKOFF_BASE_KEY, DEFAULT_BACKOFF_BASE)
            .map(|base| base.max(1))
    }

    fn get_u32(&self, key: &str, default: u32) -> AppResult<u32> {
        match self.get(key)? {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    AppError::configuration(format!(
                        "Setting '{key}' in {} is not a non-negative integer: {value}",
                        self.path.display()
                    ))
                }),
        }
    }

    fn defaults() -> BTreeMap<String, Value> {
        BTreeMap::from([
            (MAX_RETRIES_KEY.to_string(), Value::from(DEFAULT_MAX_RETRIES)),
            (BACKOFF_BASE_KEY.to_string(), Value::from(DEFAULT_BACKOFF_BASE)),
        ])
    }

    /// Write through a uniquely named temp file in the same directory and
    /// rename it over the target, so readers never see a half-written file
    /// and concurrent writers never share a temp path.
    fn write(&self, data: &BTreeMap<String, Value>) -> AppResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
