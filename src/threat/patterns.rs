use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Class of malicious input a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Xss,
    SqlInjection,
    PathTraversal,
    CommandInjection,
}

/// A named detector. Declaration order is detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternId {
    XssScriptTag,
    XssIframeTag,
    XssJavascriptScheme,
    XssEventHandler,
    XssImgSrc,
    SqlKeyword,
    SqlCommentOrSeparator,
    SqlTautology,
    PathTraversal,
    ShellMetacharacter,
    DestructiveCommand,
}

impl PatternId {
    pub const ALL: [PatternId; 11] = [
        Self::XssScriptTag,
        Self::XssIframeTag,
        Self::XssJavascriptScheme,
        Self::XssEventHandler,
        Self::XssImgSrc,
        Self::SqlKeyword,
        Self::SqlCommentOrSeparator,
        Self::SqlTautology,
        Self::PathTraversal,
        Self::ShellMetacharacter,
        Self::DestructiveCommand,
    ];

    pub fn category(self) -> ThreatCategory {
        match self {
            Self::XssScriptTag
            | Self::XssIframeTag
            | Self::XssJavascriptScheme
            | Self::XssEventHandler
            | Self::XssImgSrc => ThreatCategory::Xss,
            Self::SqlKeyword | Self::SqlCommentOrSeparator | Self::SqlTautology => {
                ThreatCategory::SqlInjection
            }
            Self::PathTraversal => ThreatCategory::PathTraversal,
            Self::ShellMetacharacter | Self::DestructiveCommand => {
                ThreatCategory::CommandInjection
            }
        }
    }

    /// Dot-separated name used in logs and audit records.
    pub fn name(self) -> &'static str {
        match self {
            Self::XssScriptTag => "xss.script_tag",
            Self::XssIframeTag => "xss.iframe_tag",
            Self::XssJavascriptScheme => "xss.javascript_scheme",
            Self::XssEventHandler => "xss.event_handler",
            Self::XssImgSrc => "xss.img_src",
            Self::SqlKeyword => "sql.keyword",
            Self::SqlCommentOrSeparator => "sql.comment_or_separator",
            Self::SqlTautology => "sql.tautology",
            Self::PathTraversal => "path.traversal",
            Self::ShellMetacharacter => "cmd.shell_metacharacter",
            Self::DestructiveCommand => "cmd.destructive_command",
        }
    }

    /// Patterns removed by `sanitize_text`.
    pub fn is_strippable(self) -> bool {
        matches!(
            self.category(),
            ThreatCategory::Xss | ThreatCategory::SqlInjection
        )
    }

    pub(crate) fn regex(self) -> &'static Regex {
        &COMPILED[self as usize]
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Indexed by `PatternId as usize`. None of these may match the empty string.
const SOURCES: [&str; 11] = [
    // whole script blocks first, then stray opening/closing tags
    r"(?is)<\s*script\b[^>]*>.*?<\s*/\s*script\s*>|<\s*/?\s*script\b[^>]*>?",
    r"(?is)<\s*iframe\b[^>]*>.*?<\s*/\s*iframe\s*>|<\s*/?\s*iframe\b[^>]*>?",
    r"(?i)\b(?:java|vb)script\s*:",
    r"(?i)\bon[a-z]+\s*=",
    r"(?i)<\s*img\b[^>]*\bsrc\b[^>]*>?",
    r"(?i)\b(?:select|insert|update|delete|drop|create|alter|truncate|exec|execute|union|grant|revoke)\b",
    r"--|/\*|\*/|;",
    r"(?i)\b\d+\s*=\s*\d+\b|'\s*(?:or|and)\s*'[^']*'\s*=\s*'",
    r"(?i)(?:\.\.|%2e%2e)(?:/|\\|%2f|%5c)",
    r"[;&|`]|\$\(|\$\{",
    r"(?i)\b(?:rm\s+-[a-z]+|mkfs|shutdown|reboot|wget|curl|netcat|nc\s+-[a-z]+|chmod|chown|sudo|kill\s+-9)\b|\bdd\s+if=",
];

#[allow(clippy::expect_used)]
static COMPILED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SOURCES
        .iter()
        .map(|source| Regex::new(source).expect("threat pattern must compile"))
        .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_pattern_compiles_and_rejects_empty() {
        for id in PatternId::ALL {
            assert!(!id.regex().is_match(""), "{id} matches the empty string");
        }
    }

    #[test]
    fn test_indexes_line_up() {
        assert!(PatternId::XssScriptTag.regex().is_match("<script>"));
        assert!(PatternId::SqlTautology.regex().is_match("1=1"));
        assert!(PatternId::DestructiveCommand.regex().is_match("rm -rf /"));
        assert!(PatternId::DestructiveCommand.regex().is_match("dd if=/dev/zero"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(PatternId::XssImgSrc.category(), ThreatCategory::Xss);
        assert_eq!(PatternId::SqlKeyword.category(), ThreatCategory::SqlInjection);
        assert_eq!(PatternId::PathTraversal.category(), ThreatCategory::PathTraversal);
        assert_eq!(
            PatternId::ShellMetacharacter.category(),
            ThreatCategory::CommandInjection
        );
        assert!(PatternId::SqlKeyword.is_strippable());
        assert!(!PatternId::PathTraversal.is_strippable());
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&PatternId::XssScriptTag).unwrap();
        assert_eq!(json, "\"xss_script_tag\"");
    }
}
