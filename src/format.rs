//! Date formatting provider used by the hydrator's final pass.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Formats `DATE`-typed values after hydration
pub trait DateFormatter: Send + Sync {
    /// Format one value; `None` leaves it untouched
    fn format(&self, value: &Value) -> Option<String>;
}

/// Formats with a chrono pattern
///
/// Accepts RFC 3339 strings, naive date-times (`2024-01-02 03:04:05`,
/// optionally with `T` and fractional seconds, read as UTC), plain dates and
/// epoch milliseconds.
#[derive(Debug, Clone)]
pub struct ChronoDateFormatter {
    pattern: String,
}

impl ChronoDateFormatter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    fn parse(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => {
                let s = s.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
                for pattern in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                    if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
                        return Some(naive.and_utc());
                    }
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|naive| naive.and_utc())
            }
            Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
            _ => None,
        }
    }
}

impl Default for ChronoDateFormatter {
    fn default() -> Self {
        Self::new("%Y-%m-%dT%H:%M:%S%.3fZ")
    }
}

impl DateFormatter for ChronoDateFormatter {
    fn format(&self, value: &Value) -> Option<String> {
        Self::parse(value).map(|dt| dt.format(&self.pattern).to_string())
    }
}
