use regex::Regex;
use std::sync::LazyLock;
use validator::{Validate, ValidationErrors};

use super::ApiError;

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{10}$").unwrap());
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

pub fn validate_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

pub fn validate_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Normalises an email the way account lookups expect it.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Returns the names of required fields that are absent or blank.
pub fn missing_fields<'a>(fields: &[(&'a str, bool)]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect()
}

pub fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).is_none_or(str::is_empty)
}

/// Trimmed text of an optional field, empty when absent.
pub fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

/// Trimmed text of an optional field, `None` when absent or blank.
pub fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Runs derive-based validation and turns the first failure into a 400.
pub fn validate_dto<T: Validate>(dto: &T) -> Result<(), ApiError> {
    dto.validate()
        .map_err(|errors| ApiError::bad_request(first_error(&errors)))
}

pub fn first_error(errors: &ValidationErrors) -> String {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.keys().copied().collect();
    fields.sort_unstable();

    fields
        .first()
        .and_then(|field| {
            field_errors.get(field).and_then(|list| list.first()).map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field))
            })
        })
        .unwrap_or_else(|| "Validation failed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Sample {
        #[validate(email(message = "Invalid email"))]
        email: Option<String>,
        #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
        password: Option<String>,
    }

    #[test]
    fn phone_must_be_ten_digits() {
        assert!(validate_phone("0123456789"));
        assert!(!validate_phone("12345"));
        assert!(!validate_phone("01234567890"));
        assert!(!validate_phone("01234abcde"));
    }

    #[test]
    fn email_format() {
        assert!(validate_email("jane@example.com"));
        assert!(!validate_email("jane@"));
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
    }

    #[test]
    fn blank_and_missing_fields() {
        assert!(is_blank(&None));
        assert!(is_blank(&Some("   ".into())));
        assert!(!is_blank(&Some("x".into())));
        assert_eq!(text(&Some("  Jo ".into())), "Jo");
        assert_eq!(text(&None), "");
        assert_eq!(non_blank(&Some(" ".into())), None);
        assert_eq!(non_blank(&Some(" a ".into())), Some("a".to_string()));
        assert_eq!(
            missing_fields(&[("name", true), ("email", false), ("phone", false)]),
            vec!["email", "phone"]
        );
    }

    #[test]
    fn first_error_reports_a_message() {
        let dto = Sample {
            email: Some("not-an-email".into()),
            password: Some("short".into()),
        };
        let err = validate_dto(&dto).unwrap_err();
        assert_eq!(err.status, rocket::http::Status::BadRequest);
        assert_eq!(err.message, "Invalid email");

        let ok = Sample {
            email: None,
            password: Some("long-enough".into()),
        };
        assert!(validate_dto(&ok).is_ok());
    }
}
