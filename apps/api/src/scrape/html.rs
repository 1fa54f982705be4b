//! Just enough HTML handling to turn a job board page into text and links.
//! Not a parser: tag soup in, best-effort text out.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::Url;

static HIDDEN_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|svg|template)\b[^>]*>.*?</(script|style|noscript|svg|template)\s*>")
        .unwrap()
});
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static MAIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<main\b[^>]*>(.*)</main\s*>").unwrap());
static H1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1\s*>").unwrap());
static BLOCK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(br|p|div|li|ul|ol|h[1-6]|section|article|header|footer|tr|td|button|span)\b[^>]*>")
        .unwrap()
});
static ANY_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap());
static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a\s*>"#).unwrap()
});

/// Link found on a results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorText {
    pub url: Url,
    /// Visible text of the anchor, one entry per non-empty line.
    pub lines: Vec<String>,
}

/// Visible text of the page, preferring the `<main>` element when present.
/// One line per block element, blank lines dropped.
pub fn visible_text(html: &str) -> String {
    let html = COMMENT_RE.replace_all(html, "");
    let html = HIDDEN_BLOCK_RE.replace_all(&html, "");
    let scope = MAIN_RE
        .captures(&html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(&html);
    fragment_lines(scope).join("\n")
}

/// Text of the first `<h1>`, if any.
pub fn page_title(html: &str) -> Option<String> {
    H1_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| fragment_lines(m.as_str()).join(" "))
        .filter(|t| !t.is_empty())
}

/// Anchors whose resolved URL satisfies `keep`, deduplicated by URL, in page order.
pub fn anchors(html: &str, base: &Url, keep: impl Fn(&Url) -> bool) -> Vec<AnchorText> {
    let html = HIDDEN_BLOCK_RE.replace_all(html, "");
    let mut seen = Vec::<Url>::new();
    let mut out = Vec::new();
    for caps in ANCHOR_RE.captures_iter(&html) {
        let Ok(url) = base.join(&decode_entities(&caps[1])) else {
            continue;
        };
        if !keep(&url) || seen.contains(&url) {
            continue;
        }
        let lines = fragment_lines(&caps[2]);
        if lines.is_empty() {
            continue;
        }
        seen.push(url.clone());
        out.push(AnchorText { url, lines });
    }
    out
}

fn fragment_lines(fragment: &str) -> Vec<String> {
    let text = BLOCK_TAG_RE.replace_all(fragment, "\n");
    let text = ANY_TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
