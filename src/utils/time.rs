use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return second
pub fn get_now_as_u64() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
