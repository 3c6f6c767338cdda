/// Utility functions for time-related operations
use std::time::Duration;

/// Format a duration to a human-readable string.
/// Sub-second durations are shown in milliseconds, e.g. "850ms", "1m 5s"
pub fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        return format!("{}ms", duration.as_millis());
    }

    let seconds = duration.as_secs();
    if seconds < 60 {
        return format!("{}s", seconds);
    }

    let minutes = seconds / 60;
    let seconds = seconds % 60;
    if minutes < 60 {
        return format!("{}m {}s", minutes, seconds);
    }

    let hours = minutes / 60;
    let minutes = minutes % 60;
    format!("{}h {}m {}s", hours, minutes, seconds)
}

/// Format a heights-per-second throughput
pub fn format_rate(heights: usize, elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return "n/a".to_string();
    }

    let per_second = heights as f64 / seconds;
    if per_second < 1.0 {
        format!("{:.2} heights/min", per_second * 60.0)
    } else {
        format!("{:.2} heights/sec", per_second)
    }
}
