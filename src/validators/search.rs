use super::{SEARCH_MAX_LENGTH, ValidationError};
use crate::threat::sanitize_text;

/// Overlong queries are truncated rather than rejected.
pub fn validate_search_query(query: &str) -> Result<String, ValidationError> {
    let clean = sanitize_text(query, SEARCH_MAX_LENGTH);
    if clean.is_empty() {
        return Err(ValidationError::SearchEmpty);
    }
    Ok(clean)
}
