use regex::Regex;
use std::sync::LazyLock;

use super::{DECIMAL_MAX_LENGTH, NUMERIC_MAX_LENGTH, ValidationError};
use crate::threat::sanitize_text;

#[allow(clippy::unwrap_used)]
static NUMERIC_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?[0-9]+$").unwrap());

#[allow(clippy::unwrap_used)]
static DECIMAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+(?:\.[0-9]+)?$").unwrap());

#[allow(clippy::unwrap_used)]
static ALPHANUMERIC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

/// Sanitizes and bounds `input`; anything the sanitizer would alter is a
/// format error rather than silently repaired.
fn sanitize_exact(
    input: &str,
    max_length: usize,
    format_error: ValidationError,
) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.chars().count() > max_length {
        return Err(ValidationError::TooLong { max: max_length });
    }

    let clean = sanitize_text(trimmed, max_length);
    if clean != trimmed {
        return Err(format_error);
    }
    Ok(clean)
}

pub fn validate_numeric(input: &str) -> Result<String, ValidationError> {
    let clean = sanitize_exact(input, NUMERIC_MAX_LENGTH, ValidationError::NotNumeric)?;
    if !NUMERIC_REGEX.is_match(&clean) {
        return Err(ValidationError::NotNumeric);
    }
    Ok(clean)
}

pub fn validate_decimal(input: &str) -> Result<String, ValidationError> {
    let clean = sanitize_exact(input, DECIMAL_MAX_LENGTH, ValidationError::NotDecimal)?;
    if !DECIMAL_REGEX.is_match(&clean) {
        return Err(ValidationError::NotDecimal);
    }
    Ok(clean)
}

pub fn validate_alphanumeric(input: &str, max_length: usize) -> Result<String, ValidationError> {
    let clean = sanitize_exact(input, max_length, ValidationError::NotAlphanumeric)?;
    if !ALPHANUMERIC_REGEX.is_match(&clean) {
        return Err(ValidationError::NotAlphanumeric);
    }
    Ok(clean)
}
