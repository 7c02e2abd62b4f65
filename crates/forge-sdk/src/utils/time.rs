//! Time Utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Number of whole or partial `interval`s between two instants.
///
/// Negative spans (clock moved backwards) count as zero.
pub fn elapsed_intervals(from: DateTime<Utc>, to: DateTime<Utc>, interval: Duration) -> f64 {
    let interval_ms = interval.as_millis() as f64;
    if interval_ms <= 0.0 {
        return 0.0;
    }
    let elapsed_ms = (to - from).num_milliseconds().max(0) as f64;
    elapsed_ms / interval_ms
}

/// Format datetime for terminal output
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}
