use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    /// Markdown source. The title is its first H1.
    pub content: String,
    pub created_time: i64, // Unix timestamp in ms
    pub updated_time: i64, // Unix timestamp in ms
    #[serde(default)]
    pub access_count: Option<u32>,
    #[serde(default)]
    pub last_accessed_time: Option<i64>,
}

/// A note the similarity provider considers related to the current note.
/// Only valid for the context it was fetched for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarNote {
    pub id: String,
    pub title: String,
    pub similarity: f64, // 0.0 to 1.0
    pub updated_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DateGroup {
    Today,
    Yesterday,
    ThisWeek,
    ThisMonth,
    Older,
}

impl DateGroup {
    /// Display order used by the browse view.
    pub const ALL: [DateGroup; 5] = [
        DateGroup::Today,
        DateGroup::Yesterday,
        DateGroup::ThisWeek,
        DateGroup::ThisMonth,
        DateGroup::Older,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedBucket {
    pub group: DateGroup,
    pub notes: Vec<Note>,
    pub count: usize,
}

/// Per-factor values behind a ranking score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub recency: f64,
    pub frequency: f64,
    pub heuristic: f64,
    /// Present only when the score was blended with a similarity signal.
    pub similarity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNote {
    pub note: Note,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortCriterion {
    #[default]
    LastModified,
    Alphabetical,
    CreatedDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Anything the navigation controller can put under the cursor.
pub trait Candidate {
    fn candidate_id(&self) -> &str;
}

impl Candidate for Note {
    fn candidate_id(&self) -> &str {
        &self.id
    }
}

impl Candidate for SimilarNote {
    fn candidate_id(&self) -> &str {
        &self.id
    }
}

impl Candidate for ScoredNote {
    fn candidate_id(&self) -> &str {
        &self.note.id
    }
}

impl<C: Candidate + ?Sized> Candidate for &C {
    fn candidate_id(&self) -> &str {
        (**self).candidate_id()
    }
}

/// Convert a Unix-ms timestamp into a `DateTime`.
/// Returns `None` for values chrono cannot represent.
pub fn to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Text of the first ATX level-1 heading (`# Title`) in a markdown document.
pub fn title_from_markdown(content: &str) -> Option<String> {
    let mut in_fence = false;
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('#') {
            // "## Sub" is a level-2 heading; "#tag" is not a heading at all.
            if !rest.starts_with(' ') && !rest.starts_with('\t') && !rest.is_empty() {
                continue;
            }
            let title = rest.trim().trim_end_matches('#').trim_end();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_h1_is_the_title() {
        let md = "intro\n## Not this\n# Groceries #\n# Second";
        assert_eq!(title_from_markdown(md).as_deref(), Some("Groceries"));
    }

    #[test]
    fn headings_inside_code_fences_are_skipped() {
        let md = "```sh\n# comment\n```\n#hashtag\n# Real";
        assert_eq!(title_from_markdown(md).as_deref(), Some("Real"));
    }

    #[test]
    fn no_heading_yields_none() {
        assert_eq!(title_from_markdown("just text"), None);
        assert_eq!(title_from_markdown("#   "), None);
    }

    #[test]
    fn out_of_range_timestamps_are_rejected() {
        assert!(to_datetime(i64::MAX).is_none());
        assert!(to_datetime(1_700_000_000_000).is_some());
    }
}
