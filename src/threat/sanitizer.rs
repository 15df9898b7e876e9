use std::collections::{HashMap, HashSet};

use super::encoding::{decode_entities, encode_entities};
use super::patterns::PatternId;

/// Inline tags that survive `sanitize_html`.
pub const ALLOWED_HTML_TAGS: [&str; 8] = ["b", "i", "em", "strong", "u", "a", "p", "br"];

/// URL schemes accepted in `href`.
pub const ALLOWED_URL_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

/// Removes every XSS and SQL pattern match until none is left.
///
/// Removal can splice a new match together (`<scr<script>ipt>`), so this
/// loops to a fixpoint. Each pass that changes the text shortens it.
pub fn strip_patterns(input: &str) -> String {
    let mut current = input.to_owned();

    loop {
        let mut next = current.clone();
        for id in PatternId::ALL.into_iter().filter(|id| id.is_strippable()) {
            let regex = id.regex();
            if regex.is_match(&next) {
                next = regex.replace_all(&next, "").into_owned();
            }
        }

        if next == current {
            return current;
        }
        current = next;
    }
}

fn trim_and_truncate(input: &str, max_length: usize) -> String {
    input.trim().chars().take(max_length).collect::<String>()
}

/// Neutralizes free text for display.
///
/// Steps, in order: decode the entities this function emits, strip XSS/SQL
/// patterns, trim and truncate to `max_length` characters, then encode
/// `& < > " ' /`. Truncation runs before encoding so an entity is never cut
/// in half; stripping runs before encoding so an encoded payload cannot slip
/// past the patterns.
///
/// The output is a fixpoint: feeding it back in returns it unchanged.
///
/// # Example
///
/// ```rust
/// use warden::threat::sanitize_text;
///
/// let clean = sanitize_text("<script>alert(1)</script>Hi & bye", 100);
/// assert_eq!(clean, "Hi &amp; bye");
/// assert_eq!(sanitize_text(&clean, 100), clean);
/// ```
pub fn sanitize_text(input: &str, max_length: usize) -> String {
    let mut text = decode_entities(input);

    loop {
        let stripped = strip_patterns(&text);
        let bounded = trim_and_truncate(&stripped, max_length);
        // truncation or trimming can expose a new word boundary match
        if bounded == text {
            break;
        }
        text = bounded;
    }

    encode_entities(&text)
}

/// Allow-list HTML cleaning through `ammonia`.
///
/// Only [`ALLOWED_HTML_TAGS`] are kept, `href` on `a` is the only attribute,
/// and links with a scheme outside [`ALLOWED_URL_SCHEMES`] lose their `href`.
/// Script and style contents are dropped entirely.
pub fn sanitize_html(input: &str) -> String {
    let tags: HashSet<&str> = ALLOWED_HTML_TAGS.into_iter().collect();
    let schemes: HashSet<&str> = ALLOWED_URL_SCHEMES.into_iter().collect();
    let tag_attributes: HashMap<&str, HashSet<&str>> =
        HashMap::from([("a", HashSet::from(["href"]))]);

    ammonia::Builder::default()
        .tags(tags)
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::new())
        .url_schemes(schemes)
        .link_rel(Some("noopener noreferrer"))
        .clean(input)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOADS: [&str; 10] = [
        "<script>alert(1)</script>",
        "'; DROP TABLE users; --",
        "<img src=x onerror=alert(1)>",
        "<scr<script>ipt>alert(1)</script>",
        "javascript:alert(document.cookie)",
        "admin' OR 1=1 --",
        "&lt;script&gt;alert(1)&lt;/script&gt;",
        "Tom & Jerry's \"show\" </b>",
        "/* comment */ SELECT * FROM accounts",
        "<iframe src=//evil.example></iframe>hello",
    ];

    #[test]
    fn test_strips_script_block() {
        assert_eq!(sanitize_text("<script>alert(1)</script>hello", 100), "hello");
    }

    #[test]
    fn test_strips_sql() {
        let clean = sanitize_text("'; DROP TABLE users; --", 100);
        assert_eq!(clean, "&#x27;  TABLE users");
    }

    #[test]
    fn test_spliced_payload_is_removed() {
        let clean = sanitize_text("<scr<script>ipt>alert(1)</script>", 100);
        assert!(!clean.to_lowercase().contains("script"));
    }

    #[test]
    fn test_encodes_reserved_characters() {
        assert_eq!(
            sanitize_text("a < b > c \"d\" 'e' f/g", 100),
            "a &lt; b &gt; c &quot;d&quot; &#x27;e&#x27; f&#x2F;g"
        );
    }

    #[test]
    fn test_truncates_by_characters_before_encoding() {
        assert_eq!(sanitize_text("  héllo wörld  ", 5), "héllo");
        assert_eq!(sanitize_text("a&b", 2), "a&amp;");
    }

    #[test]
    fn test_idempotent_on_payloads() {
        for payload in PAYLOADS {
            for max in [5, 20, 200] {
                let once = sanitize_text(payload, max);
                let twice = sanitize_text(&once, max);
                assert_eq!(once, twice, "payload {payload:?} max {max}");
            }
        }
    }

    #[test]
    fn test_no_detected_markup_survives() {
        for payload in PAYLOADS {
            let clean = sanitize_text(payload, 200);
            let visible = decode_entities(&clean);
            for id in PatternId::ALL.into_iter().filter(|id| id.is_strippable()) {
                assert!(
                    !id.regex().is_match(&visible),
                    "{id} survived sanitizing {payload:?} as {clean:?}"
                );
            }
        }
    }

    #[test]
    fn test_truncation_exposing_keyword_is_stripped() {
        // "selection" cut to "select" would form a keyword
        let clean = sanitize_text("selection", 6);
        assert!(!clean.eq_ignore_ascii_case("select"));
    }

    #[test]
    fn test_sanitize_html_keeps_allowed_tags() {
        let clean = sanitize_html("<b>bold</b> <em>em</em> <a href=\"https://example.com\">x</a>");
        assert!(clean.contains("<b>bold</b>"));
        assert!(clean.contains("<em>em</em>"));
        assert!(clean.contains("href=\"https://example.com\""));
    }

    #[test]
    fn test_sanitize_html_drops_scripts_and_handlers() {
        let clean = sanitize_html("<p onclick=\"x()\">hi</p><script>alert(1)</script>");
        assert_eq!(clean, "<p>hi</p>");
    }

    #[test]
    fn test_sanitize_html_rejects_unknown_schemes() {
        let clean = sanitize_html("<a href=\"javascript:alert(1)\">x</a>");
        assert!(!clean.contains("javascript"));
        let clean = sanitize_html("<div><img src=x>text</div>");
        assert_eq!(clean, "text");
    }
}
