use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Current wall-clock time in microseconds since the Unix epoch
pub fn now_micros() -> i64 {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_micros();
    micros.min(i64::MAX as u128) as i64
}

// Shortens a payload for log lines
pub fn preview(payload: &str, max_chars: usize) -> String {
    match payload.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &payload[..cut]),
        None => payload.to_string(),
    }
}
