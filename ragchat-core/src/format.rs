//! Formatting helpers shared across front ends.

use chrono::{DateTime, Utc};

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    format_relative_to(ts, Utc::now())
}

/// Format an optional timestamp as relative time, or "-" if missing.
pub fn format_relative_time_opt(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => format_relative_time(ts),
        None => "-".to_string(),
    }
}

fn format_relative_to(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

/// Single-line preview of message content, cut at `max_chars` characters.
pub fn preview(content: &str, max_chars: usize) -> String {
    let line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let line = line.trim();
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let cut = line
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| &line[..idx])
        .unwrap_or(line);
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc::now();
        assert_eq!(format_relative_to(now - Duration::seconds(5), now), "5s ago");
        assert_eq!(format_relative_to(now - Duration::minutes(3), now), "3m ago");
        assert_eq!(format_relative_to(now - Duration::hours(2), now), "2h ago");
        assert_eq!(format_relative_to(now - Duration::days(4), now), "4d ago");
        assert_eq!(format_relative_to(now + Duration::seconds(5), now), "just now");
    }

    #[test]
    fn test_relative_time_opt_missing() {
        assert_eq!(format_relative_time_opt(None), "-");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("\n\n  first line\nsecond", 20), "first line");
    }
}
