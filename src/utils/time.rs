//! Time and timestamp utilities

use chrono::{DateTime, Utc};

/// Get current Unix timestamp in seconds
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Whole seconds elapsed since `since`, never negative
pub fn uptime_secs(since: DateTime<Utc>) -> u64 {
    (Utc::now() - since).num_seconds().max(0) as u64
}

/// Human readable duration, e.g. `2h 5m 3s`
pub fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, _) => format!("{}m {}s", minutes, seconds),
        _ => format!("{}h {}m {}s", hours, minutes, seconds),
    }
}
