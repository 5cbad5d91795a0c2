pub mod query;
pub mod response;
pub mod validation;

pub use query::{paginate, FieldKind, ListQuery, ListSpec};
pub use response::{ApiError, ApiResponse, Created, Pagination};
pub use validation::*;

use chrono::{DateTime as ChronoDateTime, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime;

pub const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Parses a path or body id, reporting `label` in the 400 message.
pub fn parse_id(raw: &str, label: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw.trim()).map_err(|_| ApiError::bad_request(format!("Invalid {} ID", label)))
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(raw: &str) -> Option<DateTime> {
    let raw = raw.trim();
    if let Ok(dt) = ChronoDateTime::parse_from_rfc3339(raw) {
        return Some(DateTime::from_millis(dt.with_timezone(&Utc).timestamp_millis()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| DateTime::from_millis(dt.and_utc().timestamp_millis()))
}

pub fn require_date(raw: &str, field: &str) -> Result<DateTime, ApiError> {
    parse_date(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid {}", field)))
}

pub fn fmt_date(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string()
        .unwrap_or_else(|_| dt.timestamp_millis().to_string())
}

/// Calendar day (`YYYY-MM-DD`, UTC) for human-facing text.
pub fn fmt_day(dt: &DateTime) -> String {
    ChronoDateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis())
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

pub fn add_days(dt: DateTime, days: i64) -> DateTime {
    DateTime::from_millis(dt.timestamp_millis() + days * DAY_MILLIS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_date_forms() {
        let plain = parse_date("2024-03-01").unwrap();
        let full = parse_date("2024-03-01T00:00:00Z").unwrap();
        assert_eq!(plain, full);
        assert!(parse_date("01/03/2024").is_none());
    }

    #[test]
    fn add_days_moves_forward() {
        let start = parse_date("2024-01-01").unwrap();
        assert_eq!(add_days(start, 30), parse_date("2024-01-31").unwrap());
        assert_eq!(fmt_day(&add_days(start, 30)), "2024-01-31");
    }

    #[test]
    fn bad_ids_are_rejected() {
        let err = parse_id("nope", "provider").unwrap_err();
        assert_eq!(err.message, "Invalid provider ID");
        assert!(parse_id(&ObjectId::new().to_hex(), "provider").is_ok());
    }
}
