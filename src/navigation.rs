//! Keyboard navigation over the visible candidate list.
//!
//! The state is a plain value; [`transition`] takes the current state, an event and
//! the candidates as they are *now*, and returns the next state plus at most one
//! effect for the caller to perform. The candidate list may have changed since the
//! previous event (typing narrows results, similarity scores arrive late), so every
//! transition clamps the stored index against the list it is handed.

use serde::{Deserialize, Serialize};

use crate::config::InitialSelection;
use crate::types::Candidate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
    pub is_open: bool,
    pub query: String,
    /// `None` means no candidate is highlighted.
    pub active_index: Option<usize>,
    pub initial: InitialSelection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    /// The open/close shortcut (e.g. Ctrl+K).
    Toggle,
    Escape,
    QueryChanged(String),
    /// The visible list was replaced without a query edit.
    CandidatesChanged,
    ArrowDown,
    ArrowUp,
    Enter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEffect {
    /// Attach the global key listener.
    Opened,
    /// Detach the global key listener.
    Closed,
    /// The surface closed with a choice; the listener must be detached as well.
    Selected { id: String },
}

impl NavigationState {
    pub fn new(initial: InitialSelection) -> Self {
        Self {
            is_open: false,
            query: String::new(),
            active_index: None,
            initial,
        }
    }

    fn initial_index(&self) -> Option<usize> {
        match self.initial {
            InitialSelection::First => Some(0),
            InitialSelection::Nothing => None,
        }
    }

    /// Active index made valid for a list of `len` candidates.
    pub fn clamped_index(&self, len: usize) -> Option<usize> {
        match self.active_index {
            _ if len == 0 => self.initial_index(),
            Some(i) => Some(i.min(len - 1)),
            None => None,
        }
    }

    /// The highlighted candidate, if it still exists.
    pub fn active<'a, C: Candidate>(&self, candidates: &'a [C]) -> Option<&'a C> {
        self.clamped_index(candidates.len())
            .and_then(|i| candidates.get(i))
    }

    fn closed(&self) -> Self {
        Self::new(self.initial)
    }
}

impl Default for NavigationState {
    fn default() -> Self {
        Self::new(InitialSelection::default())
    }
}

pub fn transition<C: Candidate>(
    state: &NavigationState,
    event: NavEvent,
    candidates: &[C],
) -> (NavigationState, Option<NavEffect>) {
    let len = candidates.len();

    if !state.is_open {
        return match event {
            NavEvent::Toggle => {
                let mut next = state.closed();
                next.is_open = true;
                next.active_index = next.initial_index();
                (next, Some(NavEffect::Opened))
            }
            _ => (state.clone(), None),
        };
    }

    let mut next = state.clone();
    match event {
        NavEvent::Toggle | NavEvent::Escape => (state.closed(), Some(NavEffect::Closed)),
        NavEvent::QueryChanged(query) => {
            next.query = query;
            next.active_index = next.initial_index();
            (next, None)
        }
        NavEvent::CandidatesChanged => {
            next.active_index = next.initial_index();
            (next, None)
        }
        NavEvent::ArrowDown => {
            next.active_index = match state.clamped_index(len) {
                _ if len == 0 => state.initial_index(),
                Some(i) => Some((i + 1).min(len - 1)),
                None => Some(0),
            };
            (next, None)
        }
        NavEvent::ArrowUp => {
            next.active_index = match state.clamped_index(len) {
                _ if len == 0 => state.initial_index(),
                Some(i) => Some(i.saturating_sub(1)),
                None => Some(0),
            };
            (next, None)
        }
        NavEvent::Enter => match state.active(candidates) {
            Some(candidate) => {
                let id = candidate.candidate_id().to_string();
                (state.closed(), Some(NavEffect::Selected { id }))
            }
            None => {
                next.active_index = state.clamped_index(len);
                (next, None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimilarNote;

    fn candidates(n: usize) -> Vec<SimilarNote> {
        (0..n)
            .map(|i| SimilarNote {
                id: format!("note-{i}"),
                title: format!("Note {i}"),
                similarity: 0.5,
                updated_time: 0,
            })
            .collect()
    }

    fn open(list: &[SimilarNote]) -> NavigationState {
        let (state, effect) = transition(&NavigationState::default(), NavEvent::Toggle, list);
        assert_eq!(effect, Some(NavEffect::Opened));
        state
    }

    fn run(mut state: NavigationState, events: &[NavEvent], list: &[SimilarNote]) -> NavigationState {
        for event in events {
            state = transition(&state, event.clone(), list).0;
        }
        state
    }

    #[test]
    fn opening_resets_query_and_index() {
        let list = candidates(3);
        let mut state = NavigationState::default();
        state.query = "stale".into();
        state.active_index = Some(2);
        let (state, _) = transition(&state, NavEvent::Toggle, &list);
        assert!(state.is_open);
        assert_eq!(state.query, "");
        assert_eq!(state.active_index, Some(0));
    }

    #[test]
    fn arrow_up_stops_at_first() {
        let list = candidates(5);
        let state = run(open(&list), &vec![NavEvent::ArrowUp; 5], &list);
        assert_eq!(state.active_index, Some(0));
    }

    #[test]
    fn arrow_down_stops_at_last() {
        let list = candidates(5);
        let state = run(open(&list), &vec![NavEvent::ArrowDown; 10], &list);
        assert_eq!(state.active_index, Some(4));
    }

    #[test]
    fn shrinking_list_clamps_before_moving() {
        let list = candidates(5);
        let state = run(open(&list), &vec![NavEvent::ArrowDown; 3], &list);
        assert_eq!(state.active_index, Some(3));

        let shrunk = candidates(1);
        let (after_down, _) = transition(&state, NavEvent::ArrowDown, &shrunk);
        assert_eq!(after_down.active_index, Some(0));

        let (closed, effect) = transition(&state, NavEvent::Enter, &shrunk);
        assert!(!closed.is_open);
        assert_eq!(effect, Some(NavEffect::Selected { id: "note-0".into() }));
    }

    #[test]
    fn query_change_resets_index() {
        let list = candidates(5);
        let state = run(open(&list), &vec![NavEvent::ArrowDown; 2], &list);
        let (state, effect) = transition(&state, NavEvent::QueryChanged("abc".into()), &list);
        assert_eq!(effect, None);
        assert_eq!(state.query, "abc");
        assert_eq!(state.active_index, Some(0));
    }

    #[test]
    fn enter_selects_and_clears() {
        let list = candidates(3);
        let mut state = run(open(&list), &[NavEvent::ArrowDown], &list);
        state.query = "no".into();
        let (state, effect) = transition(&state, NavEvent::Enter, &list);
        assert_eq!(effect, Some(NavEffect::Selected { id: "note-1".into() }));
        assert!(!state.is_open);
        assert_eq!(state.query, "");
    }

    #[test]
    fn enter_on_empty_list_stays_open() {
        let empty: Vec<SimilarNote> = Vec::new();
        let state = open(&empty);
        let (state, effect) = transition(&state, NavEvent::Enter, &empty);
        assert_eq!(effect, None);
        assert!(state.is_open);
        assert_eq!(state.active_index, Some(0));
    }

    #[test]
    fn nothing_preselected_mode() {
        let list = candidates(3);
        let state = NavigationState::new(InitialSelection::Nothing);
        let (state, _) = transition(&state, NavEvent::Toggle, &list);
        assert_eq!(state.active_index, None);

        let (unchanged, effect) = transition(&state, NavEvent::Enter, &list);
        assert_eq!(effect, None);
        assert_eq!(unchanged.active_index, None);

        let (state, _) = transition(&state, NavEvent::ArrowDown, &list);
        assert_eq!(state.active_index, Some(0));

        let (state, _) = transition(&state, NavEvent::QueryChanged("x".into()), &list);
        assert_eq!(state.active_index, None);
    }

    #[test]
    fn escape_and_toggle_close() {
        let list = candidates(2);
        for event in [NavEvent::Escape, NavEvent::Toggle] {
            let (state, effect) = transition(&open(&list), event, &list);
            assert_eq!(effect, Some(NavEffect::Closed));
            assert_eq!(state, NavigationState::default());
        }
    }

    #[test]
    fn closed_surface_ignores_keys() {
        let list = candidates(2);
        let state = NavigationState::default();
        for event in [NavEvent::ArrowDown, NavEvent::Enter, NavEvent::Escape] {
            let (next, effect) = transition(&state, event, &list);
            assert_eq!(next, state);
            assert_eq!(effect, None);
        }
    }
}
