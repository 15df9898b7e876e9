//! Pattern-based threat detection and text neutralization.
//!
//! [`ThreatScanner`] reports which detectors matched; [`sanitize_text`]
//! removes XSS and SQL payloads and entity-encodes the rest;
//! [`sanitize_html`] runs an allow-list HTML cleaner.
//!
//! Detection prefers false positives: everyday words such as `update` or a
//! stray `;` are reported. Callers that need looser screening build a
//! scanner with [`ThreatScanner::without`] or [`ThreatScanner::only`].

mod encoding;
mod patterns;
mod sanitizer;
mod scanner;

pub use encoding::{decode_entities, encode_entities};
pub use patterns::{PatternId, ThreatCategory};
pub use sanitizer::{
    ALLOWED_HTML_TAGS, ALLOWED_URL_SCHEMES, sanitize_html, sanitize_text, strip_patterns,
};
pub use scanner::{ThreatReport, ThreatScanner, scan};
