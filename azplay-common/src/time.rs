//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds since the unix epoch, as carried in telemetry envelopes
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
