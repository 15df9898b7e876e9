//! Field validators built on the threat sanitizer.
//!
//! Each validator sanitizes first, then matches the cleaned value against a
//! format, and returns the cleaned value on success.

pub mod email;
pub mod name;
pub mod numeric;
pub mod phone;
pub mod search;
pub mod url;

pub use email::validate_email;
pub use name::validate_name;
pub use numeric::{validate_alphanumeric, validate_decimal, validate_numeric};
pub use phone::validate_phone;
pub use search::validate_search_query;
pub use url::validate_url;

use serde::{Deserialize, Serialize};

pub const EMAIL_MAX_LENGTH: usize = 254;
pub const PHONE_MAX_LENGTH: usize = 20;
pub const URL_MAX_LENGTH: usize = 2048;
pub const SEARCH_MAX_LENGTH: usize = 200;
pub const NAME_MAX_LENGTH: usize = 100;
pub const NUMERIC_MAX_LENGTH: usize = 20;
pub const DECIMAL_MAX_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    #[error("Email cannot be empty")]
    EmailEmpty,
    #[error("Email is too long (max 254 characters)")]
    EmailTooLong,
    #[error("Invalid email format")]
    EmailInvalidFormat,
    #[error("Phone number cannot be empty")]
    PhoneEmpty,
    #[error("Phone number is too long (max 20 characters)")]
    PhoneTooLong,
    #[error("Invalid phone number format")]
    PhoneInvalidFormat,
    #[error("URL cannot be empty")]
    UrlEmpty,
    #[error("URL is too long (max 2048 characters)")]
    UrlTooLong,
    #[error("Invalid URL")]
    UrlInvalid,
    #[error("URL contains unsafe content")]
    UrlUnsafe,
    #[error("Value must be a whole number")]
    NotNumeric,
    #[error("Value must be a decimal number")]
    NotDecimal,
    #[error("Value may only contain letters and digits")]
    NotAlphanumeric,
    #[error("Value is too long (max {max} characters)")]
    TooLong { max: usize },
    #[error("Search query cannot be empty")]
    SearchEmpty,
    #[error("Name cannot be empty")]
    NameEmpty,
    #[error("Name is too long (max 100 characters)")]
    NameTooLong,
}
