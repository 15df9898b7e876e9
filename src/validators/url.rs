use std::sync::LazyLock;

use url::Url;

use super::{URL_MAX_LENGTH, ValidationError};
use crate::threat::{ThreatCategory, ThreatScanner};

static MARKUP_SCANNER: LazyLock<ThreatScanner> =
    LazyLock::new(|| ThreatScanner::only(&[ThreatCategory::Xss]));

/// Accepts absolute `http`/`https` URLs.
///
/// Entity encoding would mangle `/`, so instead of sanitizing, URLs carrying
/// markup or a script payload are rejected. SQL keywords and `;` are
/// ordinary in paths and queries (`/update-profile`, `?a=1;b=2`) and pass.
pub fn validate_url(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::UrlEmpty);
    }

    if trimmed.chars().count() > URL_MAX_LENGTH {
        return Err(ValidationError::UrlTooLong);
    }

    if trimmed.contains(&['<', '>', '"', '`'][..]) || !MARKUP_SCANNER.scan(trimmed).is_safe() {
        return Err(ValidationError::UrlUnsafe);
    }

    let parsed = Url::parse(trimmed).map_err(|_| ValidationError::UrlInvalid)?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ValidationError::UrlInvalid);
    }

    Ok(parsed.into())
}
