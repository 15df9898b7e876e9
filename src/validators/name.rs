use super::{NAME_MAX_LENGTH, ValidationError};
use crate::threat::sanitize_text;

pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.chars().count() > NAME_MAX_LENGTH {
        return Err(ValidationError::NameTooLong);
    }

    let clean = sanitize_text(trimmed, NAME_MAX_LENGTH);
    if clean.is_empty() {
        return Err(ValidationError::NameEmpty);
    }

    Ok(clean)
}
