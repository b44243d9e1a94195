//! Human readable durations ("1 hour, 32 seconds").

use chrono::TimeDelta;

fn unit(value: i64, singular: &str) -> String {
    if value == 1 {
        format!("{value} {singular}")
    } else {
        format!("{value} {singular}s")
    }
}

/// Formats a span as hours, minutes and seconds.
///
/// Zero units are left out and sub-second precision is dropped. Negative spans
/// are clamped to zero, and an empty span reads "0 seconds".
pub fn format_duration(span: TimeDelta) -> String {
    let total = span.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(unit(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(unit(minutes, "minute"));
    }
    if seconds > 0 {
        parts.push(unit(seconds, "second"));
    }
    if parts.is_empty() {
        return unit(0, "second");
    }
    parts.join(", ")
}
