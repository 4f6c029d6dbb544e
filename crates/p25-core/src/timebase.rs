use chrono::{Local, TimeZone, Utc};

/// Wall clock in seconds since the unix epoch, microsecond resolution.
/// All trunking timers compare against values from here (or an injected equivalent in tests).
pub fn now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Formats an epoch timestamp in local time, e.g. `2024-05-01 13:37:00.125`
pub fn format_local(ts: f64) -> String {
    let micros = (ts * 1_000_000.0) as i64;
    match Local.timestamp_micros(micros).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => format!("{:.3}", ts),
    }
}
