use serde::{Deserialize, Serialize};

/// One row of every tabular artifact. Stages only ever add fields: ingest
/// fills the posting columns, rewrite adds `summary`, the matchers add
/// `match_score`, explain adds `explanation`.
///
/// Absent fields deserialize to empty values, so a hand-edited or partial
/// artifact still loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingRecord {
    pub title: String,
    pub company: String,
    pub location: String,
    pub responsibilities: String,
    pub profile: String,
    pub link: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl PostingRecord {
    /// Text embedded / cross-encoded against the CV.
    pub fn matching_text(&self) -> String {
        format!("{} {} {}", self.title, self.company, self.summary)
    }
}

/// Sorts by `match_score`, best first. Rows without a score go last.
pub fn sort_by_score_desc(records: &mut [PostingRecord]) {
    records.sort_by(|a, b| {
        let a = a.match_score.unwrap_or(f32::NEG_INFINITY);
        let b = b.match_score.unwrap_or(f32::NEG_INFINITY);
        b.total_cmp(&a)
    });
}
