use regex::Regex;
use std::sync::LazyLock;

use super::{PHONE_MAX_LENGTH, ValidationError};
use crate::threat::sanitize_text;

// optional leading +, then digits with common separators
#[allow(clippy::unwrap_used)]
static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 ().-]{5,18}[0-9]$").unwrap());

pub fn validate_phone(phone: &str) -> Result<String, ValidationError> {
    let trimmed = phone.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::PhoneEmpty);
    }

    if trimmed.chars().count() > PHONE_MAX_LENGTH {
        return Err(ValidationError::PhoneTooLong);
    }

    let clean = sanitize_text(trimmed, PHONE_MAX_LENGTH);
    if !PHONE_REGEX.is_match(&clean) {
        return Err(ValidationError::PhoneInvalidFormat);
    }

    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_phones() {
        assert_eq!(validate_phone("+1 (555) 123-4567").unwrap(), "+1 (555) 123-4567");
        assert!(validate_phone("5551234567").is_ok());
        assert!(validate_phone("+44 20 7946 0958").is_ok());
    }

    #[test]
    fn test_invalid_phones() {
        assert_eq!(validate_phone("").unwrap_err(), ValidationError::PhoneEmpty);
        assert_eq!(validate_phone("12").unwrap_err(), ValidationError::PhoneInvalidFormat);
        assert_eq!(validate_phone("call me").unwrap_err(), ValidationError::PhoneInvalidFormat);
        assert_eq!(
            validate_phone("555; rm -rf").unwrap_err(),
            ValidationError::PhoneInvalidFormat
        );
    }

    #[test]
    fn test_phone_too_long() {
        assert_eq!(
            validate_phone("+1 555 123 4567 8901 2345").unwrap_err(),
            ValidationError::PhoneTooLong
        );
    }
}
