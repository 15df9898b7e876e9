use regex::Regex;
use std::sync::LazyLock;

use super::{EMAIL_MAX_LENGTH, ValidationError};
use crate::threat::sanitize_text;

#[allow(clippy::unwrap_used)]
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

/// Returns the lowercased address.
///
/// An address the sanitizer would alter (markup, `--`, `;`, SQL keywords in
/// the local part) is rejected rather than repaired.
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmailEmpty);
    }

    if trimmed.chars().count() > EMAIL_MAX_LENGTH {
        return Err(ValidationError::EmailTooLong);
    }

    let clean = sanitize_text(trimmed, EMAIL_MAX_LENGTH);
    if clean != trimmed || !EMAIL_REGEX.is_match(&clean) {
        return Err(ValidationError::EmailInvalidFormat);
    }

    Ok(clean.to_lowercase())
}
