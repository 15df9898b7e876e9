//! Bearer token parsing and validation.
//!
//! Tokens are three dot-separated base64url segments
//! (`header.payload.signature`). The payload must carry a string `email`
//! and an integer `exp`.
//!
//! # Example
//!
//! ```ignore
//! use warden::token::{TokenError, TokenValidator};
//!
//! let validator = TokenValidator::new();
//! match validator.validate(&token) {
//!     Ok(claims) => println!("logged in as {}", claims.email),
//!     Err(TokenError::ExpiringSoon) => println!("please sign in again"),
//!     Err(other) => println!("rejected: {other}"),
//! }
//! ```

mod claims;
mod validator;

pub use claims::{Claims, DEFAULT_ROLE, RESERVED_CLAIMS};
pub use validator::{DEFAULT_EXPIRATION_BUFFER, TokenValidator};

/// Why a token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("No token present")]
    Missing,
    #[error("Token does not have three segments")]
    MalformedStructure,
    #[error("Token payload could not be decoded")]
    MalformedPayload,
    #[error("Token payload lacks email or exp")]
    MissingClaims,
    #[error("Token has expired")]
    Expired,
    #[error("Token expires within the safety buffer")]
    ExpiringSoon,
}
