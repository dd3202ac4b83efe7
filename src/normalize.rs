// 🧹 Normalisation - phone numbers, emails and timestamps
// Providers disagree on formats; everything is brought to one shape
// before identity resolution and merging.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::warn;
use serde_json::Value;

/// Naive formats tried after RFC 3339, interpreted as UTC
const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

/// Normalise an Indian mobile number to `+91XXXXXXXXXX`.
///
/// Accepts 10-digit numbers starting with 6-9 and 12-digit numbers with a
/// `91` prefix, ignoring punctuation. Anything else is returned trimmed but
/// otherwise untouched.
pub fn normalize_mobile(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 12 && digits.starts_with("91") {
        return format!("+91{}", &digits[2..]);
    }
    if digits.len() == 10 && digits.starts_with(['6', '7', '8', '9']) {
        return format!("+91{}", digits);
    }

    warn!("Could not normalize mobile number: {}", raw);
    raw.trim().to_string()
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Parse a provider timestamp into UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Timestamp from a JSON value: strings as above, integers as Unix seconds
pub fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_mobile() {
        assert_eq!(normalize_mobile("9876543210"), "+919876543210");
        assert_eq!(normalize_mobile("+91 98765-43210"), "+919876543210");
        assert_eq!(normalize_mobile("919876543210"), "+919876543210");
        // Landline-looking and foreign numbers are left alone
        assert_eq!(normalize_mobile(" 0221234567 "), "0221234567");
        assert_eq!(normalize_mobile("+1 415 555 0100"), "+1 415 555 0100");
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  John@Example.COM "), "john@example.com");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 8, 15, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-08-15T14:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-08-15T14:30:00.000Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-08-15T20:00:00+05:30"), Some(expected));
        assert_eq!(parse_timestamp("2025-08-15T14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-08-15 14:30:00"), Some(expected));
        assert_eq!(parse_timestamp("15-08-2025 14:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-08-15"),
            Some(Utc.with_ymd_and_hms(2025, 8, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("last tuesday"), None);
    }

    #[test]
    fn test_timestamp_from_value() {
        assert_eq!(
            timestamp_from_value(&json!(1_755_268_200)),
            Some(Utc.with_ymd_and_hms(2025, 8, 15, 14, 30, 0).unwrap())
        );
        assert_eq!(timestamp_from_value(&json!(true)), None);
    }
}
