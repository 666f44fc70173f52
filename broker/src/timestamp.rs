use chrono::Utc;

/// Milliseconds since the Unix epoch. Assigned to messages at append time
/// and compared against receiver liveness and retention windows.
pub fn timestamp_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}
