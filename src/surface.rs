//! The two places notes are discovered from: the quick-open palette and the full
//! browse view. Both own their navigation state and debouncer; everything they
//! display is recomputed from the current collection snapshot.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::browse;
use crate::config::DiscoveryConfig;
use crate::db::AccessLog;
use crate::debounce::Debouncer;
use crate::navigation::{transition, NavEffect, NavEvent, NavigationState};
use crate::render::{decide, RenderStrategy};
use crate::scoring::RelevanceScorer;
use crate::similarity::{FetchTicket, SimilarityTracker};
use crate::types::{GroupedBucket, Note, ScoredNote, SimilarNote, SortCriterion, SortDirection};

/// Receives "note `id` was chosen". What happens next (opening it) is up to the sink.
pub trait SelectionSink: Send + Sync {
    fn select(&self, note_id: &str);
}

/// Records that a note was opened. Must not block.
pub trait AccessSink: Send + Sync {
    fn record_access(&self, note_id: &str);
}

/// Discards every event.
pub struct NoopSink;

impl SelectionSink for NoopSink {
    fn select(&self, _note_id: &str) {}
}

impl AccessSink for NoopSink {
    fn record_access(&self, _note_id: &str) {}
}

/// Opens the selected note in Joplin through its URL protocol handler.
pub struct UrlSelectionSink;

impl UrlSelectionSink {
    pub fn note_url(note_id: &str) -> Option<String> {
        is_valid_joplin_id(note_id)
            .then(|| format!("joplin://x-callback-url/openNote?id={note_id}"))
    }
}

impl SelectionSink for UrlSelectionSink {
    fn select(&self, note_id: &str) {
        let Some(url) = Self::note_url(note_id) else {
            tracing::warn!("Refusing to open invalid note id");
            return;
        };
        if let Err(e) = open::that_detached(url) {
            tracing::warn!("Failed to open note in Joplin: {e}");
        }
    }
}

/// Joplin ids are 32-character lowercase hex strings.
fn is_valid_joplin_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Queues accesses for a background task that writes them to the [`AccessLog`].
pub struct AccessLogSink {
    tx: mpsc::UnboundedSender<(String, i64)>,
}

impl AccessLogSink {
    /// The writer task ends once every sink clone is dropped.
    pub fn spawn(log: AccessLog) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, i64)>();
        let handle = tokio::spawn(async move {
            while let Some((note_id, at_ms)) = rx.recv().await {
                if let Err(e) = log.record(&note_id, at_ms) {
                    tracing::warn!("Failed to record note access: {e}");
                }
            }
        });
        (Self { tx }, handle)
    }
}

impl AccessSink for AccessLogSink {
    fn record_access(&self, note_id: &str) {
        let at_ms = Utc::now().timestamp_millis();
        if self.tx.send((note_id.to_string(), at_ms)).is_err() {
            tracing::debug!("Access log writer has stopped; dropping access event");
        }
    }
}

/// Quick-open palette: ranked suggestions when the query is empty, substring
/// matches otherwise.
pub struct QuickOpen {
    config: DiscoveryConfig,
    scorer: RelevanceScorer,
    notes: Arc<Vec<Note>>,
    nav: NavigationState,
    debounce: Debouncer,
    /// Query the visible list was computed from; lags `nav.query` while debouncing.
    applied_query: String,
    visible: Vec<Note>,
    current_note: Option<String>,
    similarity: SimilarityTracker,
    /// Fetch issued on reopen, waiting for the caller to pick it up.
    pending_fetch: Option<FetchTicket>,
    selection: Arc<dyn SelectionSink>,
    access: Arc<dyn AccessSink>,
}

impl QuickOpen {
    pub fn new(config: DiscoveryConfig, notes: Arc<Vec<Note>>) -> Self {
        let mut palette = Self {
            scorer: RelevanceScorer::new(config.weights.clone()),
            nav: NavigationState::new(config.initial_selection),
            debounce: Debouncer::new(config.debounce()),
            config,
            notes,
            applied_query: String::new(),
            visible: Vec::new(),
            current_note: None,
            similarity: SimilarityTracker::new(),
            pending_fetch: None,
            selection: Arc::new(NoopSink),
            access: Arc::new(NoopSink),
        };
        palette.recompute();
        palette
    }

    pub fn with_sinks(mut self, selection: Arc<dyn SelectionSink>, access: Arc<dyn AccessSink>) -> Self {
        self.selection = selection;
        self.access = access;
        self
    }

    pub fn state(&self) -> &NavigationState {
        &self.nav
    }

    pub fn visible(&self) -> &[Note] {
        &self.visible
    }

    pub fn active(&self) -> Option<&Note> {
        self.nav.active(&self.visible)
    }

    pub fn render_strategy(&self) -> RenderStrategy {
        decide(self.visible.len(), self.config.virtualization_threshold)
    }

    /// Next instant `tick` has work to do, for callers that sleep between frames.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// Swap in a new collection snapshot.
    pub fn set_notes(&mut self, notes: Arc<Vec<Note>>) {
        self.notes = notes;
        self.recompute();
        self.candidates_changed();
    }

    /// Change the note the user is looking at. Returns the ticket for the similarity
    /// fetch the caller should start, if any.
    pub fn set_current_note(&mut self, note_id: Option<&str>) -> Option<FetchTicket> {
        self.current_note = note_id.map(str::to_string);
        self.pending_fetch = None;
        let ticket = match note_id {
            Some(id) => Some(self.similarity.begin(id)),
            None => {
                self.similarity.cancel();
                None
            }
        };
        self.recompute();
        self.candidates_changed();
        ticket
    }

    /// Ticket for a similarity fetch the palette needs after reopening. Closing
    /// invalidates in-flight fetches, so the caller must fetch again.
    pub fn take_pending_fetch(&mut self) -> Option<FetchTicket> {
        self.pending_fetch.take()
    }

    /// Deliver a similarity response. Stale responses are dropped.
    pub fn apply_similar(&mut self, ticket: &FetchTicket, results: Vec<SimilarNote>) -> bool {
        if !self.similarity.apply(ticket, results) {
            return false;
        }
        if self.applied_query.trim().is_empty() {
            self.recompute();
            self.candidates_changed();
        }
        true
    }

    /// "For you" suggestions for the current context.
    pub fn suggestions(&self) -> Vec<ScoredNote> {
        self.scorer.blended_top_scored(
            &self.notes,
            self.current_note.as_deref(),
            self.similarity.results(),
            self.config.top_count,
            Utc::now(),
        )
    }

    /// Feed one keyboard event. The returned effect tells the caller to attach or
    /// detach its key listener; selection and access sinks are called here.
    pub fn handle(&mut self, event: NavEvent, now: Instant) -> Option<NavEffect> {
        let query_edit = matches!(event, NavEvent::QueryChanged(_));
        let (next, effect) = transition(&self.nav, event, &self.visible);
        self.nav = next;

        if query_edit && self.nav.is_open {
            self.debounce.touch(now);
        }

        match &effect {
            Some(NavEffect::Opened) => {
                self.applied_query.clear();
                self.refetch_if_stale();
                self.recompute();
            }
            Some(NavEffect::Closed) => self.close(),
            Some(NavEffect::Selected { id }) => {
                self.close();
                self.selection.select(id);
                self.access.record_access(id);
            }
            None => {}
        }
        effect
    }

    fn close(&mut self) {
        self.debounce.cancel();
        self.similarity.cancel();
        self.pending_fetch = None;
    }

    /// The tracker drops its context on close; start over for the note still in view.
    fn refetch_if_stale(&mut self) {
        let Some(note_id) = self.current_note.as_deref() else {
            return;
        };
        if self.similarity.context() != Some(note_id) {
            self.pending_fetch = Some(self.similarity.begin(note_id));
        }
    }

    /// Apply a settled query edit. Returns whether the visible list was rebuilt.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.debounce.poll(now) {
            return false;
        }
        self.applied_query = self.nav.query.clone();
        self.recompute();
        self.candidates_changed();
        true
    }

    fn candidates_changed(&mut self) {
        if self.nav.is_open {
            self.nav = transition(&self.nav, NavEvent::CandidatesChanged, &self.visible).0;
        }
    }

    fn recompute(&mut self) {
        let by_recency = browse::sort(&self.notes, SortCriterion::LastModified, SortDirection::Desc);
        if !self.applied_query.trim().is_empty() {
            self.visible = browse::filter(&by_recency, &self.applied_query);
            return;
        }

        // Suggestions first, then everything else, most recent first.
        let suggested: Vec<Note> = self.suggestions().into_iter().map(|s| s.note).collect();
        let rest = by_recency
            .into_iter()
            .filter(|n| !suggested.iter().any(|s| s.id == n.id));
        self.visible = suggested.iter().cloned().chain(rest).collect();
    }
}

/// What the browse view shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "items", rename_all = "lowercase")]
pub enum BrowseListing {
    /// A query is active: flat list of matches.
    Search(Vec<Note>),
    Grouped(Vec<GroupedBucket>),
}

impl BrowseListing {
    /// Rows in display order, across buckets.
    pub fn rows(&self) -> Vec<&Note> {
        match self {
            BrowseListing::Search(notes) => notes.iter().collect(),
            BrowseListing::Grouped(buckets) => buckets.iter().flat_map(|b| b.notes.iter()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BrowseListing::Search(notes) => notes.len(),
            BrowseListing::Grouped(buckets) => buckets.iter().map(|b| b.count).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Full browsing view: sorted and grouped by date, or filtered while searching.
pub struct BrowseView {
    config: DiscoveryConfig,
    notes: Arc<Vec<Note>>,
    criterion: SortCriterion,
    direction: SortDirection,
    nav: NavigationState,
    debounce: Debouncer,
    applied_query: String,
    listing: BrowseListing,
    selection: Arc<dyn SelectionSink>,
    access: Arc<dyn AccessSink>,
}

impl BrowseView {
    pub fn new(config: DiscoveryConfig, notes: Arc<Vec<Note>>) -> Self {
        let mut view = Self {
            nav: NavigationState::new(config.initial_selection),
            debounce: Debouncer::new(config.debounce()),
            config,
            notes,
            criterion: SortCriterion::default(),
            direction: SortDirection::default(),
            applied_query: String::new(),
            listing: BrowseListing::Grouped(Vec::new()),
            selection: Arc::new(NoopSink),
            access: Arc::new(NoopSink),
        };
        view.recompute_at(Local::now());
        view
    }

    pub fn with_sinks(mut self, selection: Arc<dyn SelectionSink>, access: Arc<dyn AccessSink>) -> Self {
        self.selection = selection;
        self.access = access;
        self
    }

    /// Mount the view: start listening for keys.
    pub fn mount(&mut self) -> Option<NavEffect> {
        if self.nav.is_open {
            return None;
        }
        self.clear_search();
        let rows = self.listing.rows();
        let (next, effect) = transition(&self.nav, NavEvent::Toggle, &rows);
        self.nav = next;
        effect
    }

    pub fn state(&self) -> &NavigationState {
        &self.nav
    }

    pub fn listing(&self) -> &BrowseListing {
        &self.listing
    }

    pub fn active(&self) -> Option<&Note> {
        let rows = self.listing.rows();
        self.nav.active(&rows).copied()
    }

    pub fn render_strategy(&self) -> RenderStrategy {
        decide(self.listing.len(), self.config.virtualization_threshold)
    }

    pub fn set_notes(&mut self, notes: Arc<Vec<Note>>) {
        self.notes = notes;
        self.refresh();
    }

    pub fn set_sort(&mut self, criterion: SortCriterion, direction: SortDirection) {
        self.criterion = criterion;
        self.direction = direction;
        self.refresh();
    }

    pub fn handle(&mut self, event: NavEvent, now: Instant) -> Option<NavEffect> {
        let query_edit = matches!(event, NavEvent::QueryChanged(_));
        let rows = self.listing.rows();
        let (next, effect) = transition(&self.nav, event, &rows);
        self.nav = next;

        if query_edit && self.nav.is_open {
            self.debounce.touch(now);
        }
        match &effect {
            Some(NavEffect::Closed) => {
                self.debounce.cancel();
                self.clear_search();
            }
            Some(NavEffect::Selected { id }) => {
                self.debounce.cancel();
                self.clear_search();
                self.selection.select(id);
                self.access.record_access(id);
            }
            Some(NavEffect::Opened) => self.clear_search(),
            None => {}
        }
        effect
    }

    /// Leave search mode so the listing matches the cleared query.
    fn clear_search(&mut self) {
        if self.applied_query.is_empty() {
            return;
        }
        self.applied_query.clear();
        self.refresh();
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.debounce.poll(now) {
            return false;
        }
        self.applied_query = self.nav.query.clone();
        self.refresh();
        true
    }

    fn refresh(&mut self) {
        self.recompute_at(Local::now());
        if self.nav.is_open {
            let rows = self.listing.rows();
            self.nav = transition(&self.nav, NavEvent::CandidatesChanged, &rows).0;
        }
    }

    /// Rebuild the listing with calendar buckets relative to `now`.
    pub fn recompute_at<Tz: TimeZone>(&mut self, now: DateTime<Tz>) {
        let sorted = browse::sort(&self.notes, self.criterion, self.direction);
        self.listing = if self.applied_query.trim().is_empty() {
            BrowseListing::Grouped(browse::group_by_calendar_bucket_at(&sorted, now))
        } else {
            BrowseListing::Search(browse::filter(&sorted, &self.applied_query))
        };
    }
}
