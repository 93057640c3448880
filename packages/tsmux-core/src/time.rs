//! Wall-clock helpers shared across the multiplexer core.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// `0` is treated by the rest of the crate as "never" (see
/// `LiveStream::started_at`'s documented pre-first-start value).
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
