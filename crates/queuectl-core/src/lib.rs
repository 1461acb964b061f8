//! # queuectl-core
//!
//! Core crate for queuectl. Contains the layered application configuration,
//! the flat key-value queue settings store, logging initialisation, and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other queuectl crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod result;
pub mod settings;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
pub use settings::SettingsStore;
