use once_cell::sync::Lazy;
use regex::Regex;

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>?").expect("valid regex"));
static OCTET_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"%[a-fA-F0-9]{2}").expect("valid regex"));
static WHITESPACE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").expect("valid regex")
});

/// Single-line plain text: tags and percent-encoded octets removed,
/// whitespace runs collapsed, ends trimmed.
pub fn sanitize_text_field(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let stripped = TAG_PATTERN.replace_all(input, "");
    let stripped = OCTET_PATTERN.replace_all(&stripped, "");
    WHITESPACE_PATTERN
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

pub fn is_email(candidate: &str) -> bool {
    let candidate = candidate.trim();
    candidate.len() >= 6 && EMAIL_PATTERN.is_match(candidate)
}
