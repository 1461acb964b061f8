//! Timestamp helpers. Timestamps are stored as INTEGER Unix epoch
//! milliseconds (UTC).

use chrono::{DateTime, TimeZone, Utc};

/// Convert a `DateTime<Utc>` to Unix epoch milliseconds.
#[inline]
pub fn to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert Unix epoch milliseconds to `DateTime<Utc>`, clamping values
/// chrono cannot represent.
pub fn from_ms(ms: i64) -> DateTime<Utc> {
    match Utc.timestamp_millis_opt(ms) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None if ms.is_negative() => DateTime::<Utc>::MIN_UTC,
        chrono::LocalResult::None => DateTime::<Utc>::MAX_UTC,
    }
}
