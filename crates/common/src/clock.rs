use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since epoch. The core stores
/// milliseconds exclusively.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
