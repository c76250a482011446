//! Human-readable formatting for intervals and uptime

use std::time::Duration;

/// Format a job interval, e.g. "1 minute", "45 minutes", "2 hours", "1.5 hours"
///
/// Sub-minute intervals are shown in seconds.
pub fn format_interval(interval: Duration) -> String {
    let seconds = interval.as_secs();
    if seconds < 60 {
        return format!("{} second{}", seconds, plural(seconds));
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{} minute{}", minutes, plural(minutes));
    }

    if minutes % 60 == 0 {
        let hours = minutes / 60;
        format!("{} hour{}", hours, plural(hours))
    } else {
        format!("{:.1} hours", minutes as f64 / 60.0)
    }
}

/// Format uptime as "1d 2h 3m", or "< 1m" below one minute
pub fn format_uptime(uptime: Duration) -> String {
    let seconds = uptime.as_secs();
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }

    if parts.is_empty() {
        "< 1m".to_string()
    } else {
        parts.join(" ")
    }
}

fn plural(count: u64) -> &'static str {
    if count == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(60, "1 minute")]
    #[case(45 * 60, "45 minutes")]
    #[case(60 * 60, "1 hour")]
    #[case(120 * 60, "2 hours")]
    #[case(90 * 60, "1.5 hours")]
    #[case(100 * 60, "1.7 hours")]
    #[case(1, "1 second")]
    #[case(30, "30 seconds")]
    fn test_format_interval(#[case] seconds: u64, #[case] expected: &str) {
        assert_eq!(format_interval(Duration::from_secs(seconds)), expected);
    }

    #[rstest]
    #[case(0, "< 1m")]
    #[case(59, "< 1m")]
    #[case(3 * 60, "3m")]
    #[case(2 * 3_600, "2h")]
    #[case(86_400 + 2 * 3_600 + 3 * 60, "1d 2h 3m")]
    #[case(2 * 86_400 + 5 * 60, "2d 5m")]
    fn test_format_uptime(#[case] seconds: u64, #[case] expected: &str) {
        assert_eq!(format_uptime(Duration::from_secs(seconds)), expected);
    }
}
