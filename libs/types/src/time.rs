//! Wall-clock helpers

use chrono::Utc;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}
