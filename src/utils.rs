use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock Unix millis, 0 if the clock is before the epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
