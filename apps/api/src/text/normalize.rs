//! Text normalization for extracted document text and scraped posting fields.

use once_cell::sync::Lazy;
use regex::Regex;

// Compile regexes once at startup
static HORIZONTAL_WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static SPACED_LETTERS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\b[A-Za-z0-9À-ÿ] ){2,}[A-Za-z0-9À-ÿ]\b").unwrap());
static ANY_WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Repairs the usual PDF-extraction artifacts:
///
/// - horizontal whitespace runs become a single space
/// - two or more line breaks (with only whitespace between) become one blank line
/// - letters typeset with inter-letter spacing (`J O H N`) are joined back (`JOHN`);
///   runs never cross a line break
/// - leading/trailing whitespace is trimmed
///
/// Idempotent: `normalize_extracted(normalize_extracted(x)) == normalize_extracted(x)`.
pub fn normalize_extracted(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = HORIZONTAL_WS_RE.replace_all(text, " ");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    // Letter runs are joined last so that collapsed spacing cannot create a new run.
    let text = SPACED_LETTERS_RE.replace_all(&text, |caps: &regex::Captures| {
        caps[0].chars().filter(|c| !c.is_whitespace()).collect::<String>()
    });

    text.trim().to_string()
}

/// Flattens text to a single line: every whitespace run (newlines included)
/// becomes one space. Used for posting fields stored as table cells.
pub fn collapse_whitespace(text: &str) -> String {
    ANY_WS_RE.replace_all(text, " ").trim().to_string()
}
