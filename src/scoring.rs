//! Relevance scoring for the "for you" list.
//!
//! ```text
//! recency   = 1 / (1 + hoursSinceAccess)
//! frequency = min(accessCount / 20, 1.0)
//! score     = 0.6 × recency + 0.4 × frequency
//! blended   = 0.4 × score + 0.6 × similarity
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::ScoringWeights;
use crate::types::{to_datetime, Note, ScoreBreakdown, ScoredNote, SimilarNote};

/// Default number of suggestions returned by the top-N helpers.
pub const DEFAULT_TOP_COUNT: usize = 3;

const MS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    weights: ScoringWeights,
}

impl RelevanceScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Heuristic score from recency and access frequency. Normal inputs land in [0, 1].
    pub fn compute_score(&self, note: &Note, now: DateTime<Utc>) -> f64 {
        self.breakdown(note, now).heuristic
    }

    pub fn breakdown(&self, note: &Note, now: DateTime<Utc>) -> ScoreBreakdown {
        let recency = 1.0 / (1.0 + hours_since(note, now));
        let saturation = self.weights.frequency_saturation.max(1) as f64;
        let frequency = (note.access_count.unwrap_or(0) as f64 / saturation).min(1.0);
        ScoreBreakdown {
            recency,
            frequency,
            heuristic: self.weights.recency * recency + self.weights.frequency * frequency,
            similarity: None,
        }
    }

    /// Highest-scoring notes, never including `exclude_id`.
    pub fn top_scored(
        &self,
        notes: &[Note],
        exclude_id: Option<&str>,
        count: usize,
        now: DateTime<Utc>,
    ) -> Vec<ScoredNote> {
        let scored = notes
            .iter()
            .filter(|n| Some(n.id.as_str()) != exclude_id)
            .map(|n| {
                let breakdown = self.breakdown(n, now);
                ScoredNote {
                    note: n.clone(),
                    score: breakdown.heuristic,
                    breakdown,
                }
            })
            .collect();
        take_top(scored, count)
    }

    /// Like [`top_scored`](Self::top_scored), but mixes in similarity scores when any
    /// are available. Notes the similarity provider did not return count as 0.
    pub fn blended_top_scored(
        &self,
        notes: &[Note],
        exclude_id: Option<&str>,
        similar: &[SimilarNote],
        count: usize,
        now: DateTime<Utc>,
    ) -> Vec<ScoredNote> {
        if similar.is_empty() {
            return self.top_scored(notes, exclude_id, count, now);
        }

        let lookup: HashMap<&str, f64> = similar
            .iter()
            .map(|s| (s.id.as_str(), sanitize(s.similarity)))
            .collect();

        let scored = notes
            .iter()
            .filter(|n| Some(n.id.as_str()) != exclude_id)
            .map(|n| {
                let mut breakdown = self.breakdown(n, now);
                let similarity = lookup.get(n.id.as_str()).copied().unwrap_or(0.0);
                breakdown.similarity = Some(similarity);
                ScoredNote {
                    note: n.clone(),
                    score: self.weights.blend_heuristic * breakdown.heuristic
                        + self.weights.blend_similarity * similarity,
                    breakdown,
                }
            })
            .collect();
        take_top(scored, count)
    }
}

/// Hours between the note's reference time and `now`, never negative.
/// Missing or unrepresentable timestamps count as infinitely old.
fn hours_since(note: &Note, now: DateTime<Utc>) -> f64 {
    let reference = note.last_accessed_time.unwrap_or(note.updated_time);
    match to_datetime(reference) {
        Some(at) => ((now - at).num_milliseconds() as f64 / MS_PER_HOUR).max(0.0),
        None => f64::INFINITY,
    }
}

fn sanitize(similarity: f64) -> f64 {
    if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(0.0, 1.0)
    }
}

fn take_top(mut scored: Vec<ScoredNote>, count: usize) -> Vec<ScoredNote> {
    // Stable: equal scores keep collection order.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(count);
    scored
}

/// Score with the default weights.
pub fn compute_score(note: &Note, now: DateTime<Utc>) -> f64 {
    RelevanceScorer::default().compute_score(note, now)
}

pub fn get_top_scored(
    notes: &[Note],
    exclude_id: Option<&str>,
    count: usize,
    now: DateTime<Utc>,
) -> Vec<ScoredNote> {
    RelevanceScorer::default().top_scored(notes, exclude_id, count, now)
}

pub fn get_blended_top_scored(
    notes: &[Note],
    exclude_id: Option<&str>,
    similar: &[SimilarNote],
    count: usize,
    now: DateTime<Utc>,
) -> Vec<ScoredNote> {
    RelevanceScorer::default().blended_top_scored(notes, exclude_id, similar, count, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 14, 12, 0, 0).unwrap()
    }

    fn note(id: &str, hours_ago: i64, access_count: Option<u32>) -> Note {
        let at = (now() - Duration::hours(hours_ago)).timestamp_millis();
        Note {
            id: id.to_string(),
            title: id.to_string(),
            content: String::new(),
            created_time: at,
            updated_time: at,
            access_count,
            last_accessed_time: Some(at),
        }
    }

    #[test]
    fn day_old_note_with_ten_accesses() {
        let score = compute_score(&note("a", 24, Some(10)), now());
        assert!((score - 0.224).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn fresh_and_saturated_scores_one() {
        let score = compute_score(&note("a", 0, Some(20)), now());
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn frequency_saturates_at_twenty() {
        let a = compute_score(&note("a", 3, Some(20)), now());
        let b = compute_score(&note("b", 3, Some(100)), now());
        assert_eq!(a, b);
    }

    #[test]
    fn future_access_clamps_to_max_recency() {
        let future = note("f", -48, None);
        assert!((compute_score(&future, now()) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_updated_time_without_access_telemetry() {
        let mut n = note("a", 0, None);
        n.last_accessed_time = None;
        n.updated_time = (now() - Duration::hours(1)).timestamp_millis();
        assert!((compute_score(&n, now()) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn unrepresentable_timestamp_is_maximally_old() {
        let mut n = note("a", 0, Some(10));
        n.last_accessed_time = Some(i64::MAX);
        let score = compute_score(&n, now());
        assert!(!score.is_nan());
        assert!((score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn top_scored_excludes_current_note() {
        let notes = vec![note("a", 0, Some(20)), note("b", 5, None), note("c", 50, None)];
        let top = get_top_scored(&notes, Some("a"), 3, now());
        assert_eq!(top.len(), 2);
        assert!(top.iter().all(|s| s.note.id != "a"));
        assert_eq!(top[0].note.id, "b");
    }

    #[test]
    fn top_scored_on_empty_pool() {
        assert!(get_top_scored(&[], None, 3, now()).is_empty());
    }

    #[test]
    fn blending_without_similarity_matches_heuristic() {
        let notes = vec![note("a", 2, Some(3)), note("b", 40, Some(19)), note("c", 1, None)];
        assert_eq!(
            get_blended_top_scored(&notes, Some("c"), &[], 2, now()),
            get_top_scored(&notes, Some("c"), 2, now()),
        );
    }

    #[test]
    fn strong_similarity_wins_the_blend() {
        let notes = vec![note("recent", 0, Some(20)), note("old", 5_000, None)];
        let similar = vec![SimilarNote {
            id: "old".into(),
            title: "old".into(),
            similarity: 1.0,
            updated_time: 0,
        }];
        let top = get_blended_top_scored(&notes, None, &similar, 2, now());
        assert_eq!(top[0].note.id, "old");
        assert_eq!(top[0].breakdown.similarity, Some(1.0));
        assert_eq!(top[1].breakdown.similarity, Some(0.0));
    }
}
