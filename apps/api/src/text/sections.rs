//! Section Splitter: separates a posting body into "responsibilities" and
//! "candidate profile" using ordered marker probes.
//!
//! Best-effort heuristic, not a grammar:
//! 1. The first body-start marker (in list order) found anywhere cuts off the
//!    navigation noise before it.
//! 2. The first profile marker (in list order) found past the leading title
//!    splits the remainder in two.
//! 3. Long bodies with no profile marker get [`PROFILE_NOT_SEPARATED`] so the
//!    reader knows the profile is buried in the responsibilities.

use serde::{Deserialize, Serialize};

use crate::text::normalize::collapse_whitespace;

/// Stored as the profile when a long posting has no recognisable profile section.
pub const PROFILE_NOT_SEPARATED: &str =
    "Not automatically separated (see responsibilities column)";

/// Marker hits at or before this many characters are treated as part of the title.
const MIN_PROFILE_OFFSET: usize = 10;

/// Bodies longer than this without a profile marker get the sentinel profile.
const LONG_BODY_CHARS: usize = 500;

/// Body-start markers, highest priority first.
const BODY_START_MARKERS: &[&str] = &[
    "the role",
    "responsibilities",
    "about the position",
    "job description",
    "les missions du poste",
    "le poste",
    "description du poste",
    "à propos du poste",
    "vos missions",
];

/// Profile-start markers, highest priority first. Generic words come last.
const PROFILE_MARKERS: &[&str] = &[
    "desired profile",
    "what we're looking for",
    "what we are looking for",
    "your profile",
    "le profil recherché",
    "ce que nous recherchons",
    "votre profil",
    "profil attendu",
    "profile",
    "profil",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingSections {
    pub responsibilities: String,
    pub profile: String,
}

/// Splits a posting body into responsibilities and profile.
///
/// Both halves are flattened with [`collapse_whitespace`]; either may be empty.
pub fn split_sections(full_text: &str) -> PostingSections {
    if full_text.is_empty() {
        return PostingSections::default();
    }

    let body = match first_marker(full_text, BODY_START_MARKERS, 0) {
        Some(start) if start > 0 => &full_text[start..],
        _ => full_text,
    };

    let (responsibilities, profile) =
        match first_marker(body, PROFILE_MARKERS, MIN_PROFILE_OFFSET + 1) {
            Some(split) => (&body[..split], collapse_whitespace(&body[split..])),
            None if body.chars().count() > LONG_BODY_CHARS => {
                (body, PROFILE_NOT_SEPARATED.to_string())
            }
            None => (body, String::new()),
        };

    PostingSections {
        responsibilities: collapse_whitespace(responsibilities),
        profile,
    }
}

/// Returns the byte offset of the first marker (in list order) whose first
/// occurrence sits at a character offset of at least `min_char_offset`.
///
/// Only each marker's first occurrence is probed; a too-early hit moves on to
/// the next marker rather than searching further into the text.
fn first_marker(text: &str, markers: &[&str], min_char_offset: usize) -> Option<usize> {
    let folded = fold_case(text);
    markers.iter().find_map(|marker| {
        folded
            .find(marker)
            .filter(|&idx| text[..idx].chars().count() >= min_char_offset)
    })
}

/// Lower-cases `text` char by char while keeping every byte offset valid for
/// the original string. Chars whose lowercase form has a different UTF-8
/// length (or expands to several chars) are kept as they are.
fn fold_case(text: &str) -> String {
    text.chars()
        .map(|c| {
            let mut lower = c.to_lowercase();
            match (lower.next(), lower.next()) {
                (Some(l), None) if l.len_utf8() == c.len_utf8() => l,
                _ => c,
            }
        })
        .collect()
}
