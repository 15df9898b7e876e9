use std::collections::BTreeSet;

use serde::Serialize;

use super::encoding::decode_entities;
use super::patterns::{PatternId, ThreatCategory};

/// Outcome of scanning one input. Producing it has no side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreatReport {
    safe: bool,
    matched_patterns: BTreeSet<PatternId>,
}

impl ThreatReport {
    fn from_matches(matched_patterns: BTreeSet<PatternId>) -> Self {
        Self {
            safe: matched_patterns.is_empty(),
            matched_patterns,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn matched_patterns(&self) -> &BTreeSet<PatternId> {
        &self.matched_patterns
    }

    pub fn matches(&self, id: PatternId) -> bool {
        self.matched_patterns.contains(&id)
    }

    pub fn has_category(&self, category: ThreatCategory) -> bool {
        self.matched_patterns.iter().any(|id| id.category() == category)
    }

    pub fn categories(&self) -> BTreeSet<ThreatCategory> {
        self.matched_patterns.iter().map(|id| id.category()).collect()
    }

    pub fn into_patterns(self) -> Vec<PatternId> {
        self.matched_patterns.into_iter().collect()
    }
}

/// Runs an ordered set of detectors over user-supplied text.
///
/// Input is checked both as given and with HTML entities decoded, so an
/// entity-encoded payload is reported the same as its plain form.
///
/// # Example
///
/// ```rust
/// use warden::threat::{PatternId, ThreatScanner};
///
/// let scanner = ThreatScanner::new();
/// let report = scanner.scan("<script>alert(1)</script>");
/// assert!(!report.is_safe());
/// assert!(report.matches(PatternId::XssScriptTag));
/// assert!(scanner.scan("hello world").is_safe());
/// ```
#[derive(Debug, Clone)]
pub struct ThreatScanner {
    detectors: Vec<PatternId>,
}

impl Default for ThreatScanner {
    fn default() -> Self {
        Self {
            detectors: PatternId::ALL.to_vec(),
        }
    }
}

impl ThreatScanner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the scanner to the given categories, keeping detector order.
    #[must_use]
    pub fn only(categories: &[ThreatCategory]) -> Self {
        Self {
            detectors: PatternId::ALL
                .into_iter()
                .filter(|id| categories.contains(&id.category()))
                .collect(),
        }
    }

    #[must_use]
    pub fn without(mut self, id: PatternId) -> Self {
        self.detectors.retain(|d| *d != id);
        self
    }

    pub fn detectors(&self) -> &[PatternId] {
        &self.detectors
    }

    pub fn scan(&self, input: &str) -> ThreatReport {
        let decoded = decode_entities(input);
        let mut matched = BTreeSet::new();

        for &id in &self.detectors {
            let regex = id.regex();
            if regex.is_match(input) || (decoded != input && regex.is_match(&decoded)) {
                matched.insert(id);
            }
        }

        ThreatReport::from_matches(matched)
    }
}

/// Scans with every detector enabled.
pub fn scan(input: &str) -> ThreatReport {
    ThreatScanner::default().scan(input)
}
