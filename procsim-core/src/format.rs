//! Formatting helpers shared by front ends.

use chrono::{DateTime, Utc};

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    let now = Utc::now();
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

/// Format a metric value with at most two decimals and its unit.
pub fn format_metric_value(value: f64, unit: &str) -> String {
    let number = if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        let s = format!("{:.2}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    };
    match unit.trim() {
        "" => number,
        "%" => format!("{number}%"),
        unit => format!("{number} {unit}"),
    }
}

/// Format an optional value, or "-" if missing.
pub fn format_metric_value_opt(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(value) => format_metric_value(value, unit),
        None => "-".to_string(),
    }
}

/// Signed percent change with one decimal (e.g., "+12.5%").
pub fn format_delta(delta_percent: Option<f64>) -> String {
    match delta_percent {
        Some(d) if d > 0.0 => format!("+{:.1}%", d),
        Some(d) => format!("{:.1}%", d),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_relative_time() {
        let now = Utc::now();
        assert_eq!(format_relative_time(now + Duration::seconds(30)), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(5)), "5m ago");
        assert_eq!(format_relative_time(now - Duration::hours(3)), "3h ago");
    }

    #[test]
    fn test_metric_value() {
        assert_eq!(format_metric_value(95.0, "%"), "95%");
        assert_eq!(format_metric_value(12.5, "min"), "12.5 min");
        assert_eq!(format_metric_value(1.234, ""), "1.23");
        assert_eq!(format_metric_value_opt(None, "kg"), "-");
    }

    #[test]
    fn test_delta() {
        assert_eq!(format_delta(Some(12.5)), "+12.5%");
        assert_eq!(format_delta(Some(-3.0)), "-3.0%");
        assert_eq!(format_delta(Some(0.0)), "0.0%");
        assert_eq!(format_delta(None), "-");
    }
}
