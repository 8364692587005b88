//! Coordination of the optional similarity signal.
//!
//! Similar notes are fetched per "current note" context. Each fetch is tagged with a
//! [`FetchTicket`] carrying the tracker's generation at the time it was issued; a
//! result is applied only if no newer fetch (or cancel) happened in between. A
//! failed or timed-out fetch yields an empty list, which makes the scorer fall back
//! to heuristic-only ranking.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;

use crate::types::SimilarNote;

pub trait SimilarityProvider: Send + Sync {
    /// Notes similar to `note_id`. May be empty.
    fn fetch_similar(&self, note_id: &str) -> impl Future<Output = Result<Vec<SimilarNote>>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    note_id: String,
}

impl FetchTicket {
    pub fn note_id(&self) -> &str {
        &self.note_id
    }
}

#[derive(Debug, Default)]
pub struct SimilarityTracker {
    generation: u64,
    context: Option<String>,
    results: Vec<SimilarNote>,
}

impl SimilarityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to a new current note. Results for the previous context are dropped
    /// immediately and any fetch still in flight for it becomes stale.
    pub fn begin(&mut self, note_id: &str) -> FetchTicket {
        self.generation += 1;
        self.context = Some(note_id.to_string());
        self.results.clear();
        FetchTicket {
            generation: self.generation,
            note_id: note_id.to_string(),
        }
    }

    /// Invalidate every outstanding ticket, e.g. when the surface closes.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.context = None;
        self.results.clear();
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Store the response for `ticket` if it is still current. Returns whether it was applied.
    pub fn apply(&mut self, ticket: &FetchTicket, results: Vec<SimilarNote>) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(
                "Dropping stale similarity response (generation {} < {})",
                ticket.generation,
                self.generation
            );
            return false;
        }
        self.results = results
            .into_iter()
            .filter(|s| s.id != ticket.note_id)
            .collect();
        true
    }

    pub fn results(&self) -> &[SimilarNote] {
        &self.results
    }
}

/// Run one fetch for `ticket`, bounded by `timeout`.
/// Errors and timeouts are logged and turned into an empty result.
pub async fn fetch_similar<P: SimilarityProvider>(
    provider: &P,
    ticket: FetchTicket,
    timeout: Duration,
) -> (FetchTicket, Vec<SimilarNote>) {
    let results = match tokio::time::timeout(timeout, provider.fetch_similar(&ticket.note_id)).await {
        Ok(Ok(results)) => results,
        Ok(Err(e)) => {
            tracing::warn!("Similarity fetch failed, using heuristic ranking: {e}");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!("Similarity fetch timed out after {timeout:?}, using heuristic ranking");
            Vec::new()
        }
    };
    (ticket, results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn similar(id: &str, similarity: f64) -> SimilarNote {
        SimilarNote {
            id: id.into(),
            title: id.into(),
            similarity,
            updated_time: 0,
        }
    }

    struct Fixed(Vec<SimilarNote>);

    impl SimilarityProvider for Fixed {
        async fn fetch_similar(&self, _note_id: &str) -> Result<Vec<SimilarNote>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl SimilarityProvider for Failing {
        async fn fetch_similar(&self, _note_id: &str) -> Result<Vec<SimilarNote>> {
            anyhow::bail!("service unavailable")
        }
    }

    struct Slow;

    impl SimilarityProvider for Slow {
        async fn fetch_similar(&self, _note_id: &str) -> Result<Vec<SimilarNote>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![similar("late", 1.0)])
        }
    }

    #[test]
    fn newer_context_wins() {
        let mut tracker = SimilarityTracker::new();
        let first = tracker.begin("a");
        let second = tracker.begin("b");

        assert!(!tracker.apply(&first, vec![similar("x", 0.9)]));
        assert!(tracker.results().is_empty());

        assert!(tracker.apply(&second, vec![similar("y", 0.8)]));
        assert_eq!(tracker.results()[0].id, "y");
        assert_eq!(tracker.context(), Some("b"));
    }

    #[test]
    fn cancel_invalidates_in_flight_fetch() {
        let mut tracker = SimilarityTracker::new();
        let ticket = tracker.begin("a");
        tracker.cancel();
        assert!(!tracker.apply(&ticket, vec![similar("x", 0.9)]));
        assert_eq!(tracker.context(), None);
    }

    #[test]
    fn current_note_is_never_its_own_neighbour() {
        let mut tracker = SimilarityTracker::new();
        let ticket = tracker.begin("a");
        tracker.apply(&ticket, vec![similar("a", 1.0), similar("b", 0.4)]);
        let ids: Vec<&str> = tracker.results().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["b"]);
    }

    #[tokio::test]
    async fn successful_fetch_returns_results() {
        let mut tracker = SimilarityTracker::new();
        let ticket = tracker.begin("a");
        let provider = Fixed(vec![similar("b", 0.7)]);
        let (ticket, results) = fetch_similar(&provider, ticket, Duration::from_secs(1)).await;
        assert!(tracker.apply(&ticket, results));
        assert_eq!(tracker.results().len(), 1);
    }

    #[tokio::test]
    async fn failure_degrades_to_empty() {
        let mut tracker = SimilarityTracker::new();
        let ticket = tracker.begin("a");
        let (_, results) = fetch_similar(&Failing, ticket, Duration::from_secs(1)).await;
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_degrades_to_empty() {
        let mut tracker = SimilarityTracker::new();
        let ticket = tracker.begin("a");
        let (ticket, results) = fetch_similar(&Slow, ticket, Duration::from_secs(2)).await;
        assert!(results.is_empty());
        assert_eq!(ticket.note_id(), "a");
    }
}
