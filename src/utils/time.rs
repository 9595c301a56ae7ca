use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Milliseconds since the unix epoch, `0` if the clock is before it.
pub fn get_now_as_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
