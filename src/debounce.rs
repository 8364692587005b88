use std::time::{Duration, Instant};

/// Coalesces bursts of edits into a single recomputation.
///
/// The caller owns the value, reports each edit with [`touch`](Self::touch) and asks
/// [`poll`](Self::poll) on its own schedule (a frame tick, a timer) whether the quiet
/// period has passed. Every edit restarts the window.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    pending_since: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending_since: None,
        }
    }

    /// Start (or restart) the quiet window.
    pub fn touch(&mut self, now: Instant) {
        self.pending_since = Some(now);
    }

    /// Drop any pending fire, e.g. when the surface closes.
    pub fn cancel(&mut self) {
        self.pending_since = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// When the pending fire is due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending_since.map(|since| since + self.quiet)
    }

    /// Returns `true` exactly once per burst, after the quiet period.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending_since {
            Some(since) if now.saturating_duration_since(since) >= self.quiet => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(300);

    #[test]
    fn fires_once_after_quiet_period() {
        let start = Instant::now();
        let mut d = Debouncer::new(QUIET);
        assert!(!d.poll(start));

        d.touch(start);
        assert!(!d.poll(start + Duration::from_millis(299)));
        assert!(d.poll(start + QUIET));
        assert!(!d.poll(start + Duration::from_secs(5)));
    }

    #[test]
    fn each_edit_restarts_the_window() {
        let start = Instant::now();
        let mut d = Debouncer::new(QUIET);
        d.touch(start);
        d.touch(start + Duration::from_millis(200));
        assert!(!d.poll(start + Duration::from_millis(400)));
        assert_eq!(d.deadline(), Some(start + Duration::from_millis(500)));
        assert!(d.poll(start + Duration::from_millis(500)));
    }

    #[test]
    fn cancel_discards_pending_fire() {
        let start = Instant::now();
        let mut d = Debouncer::new(QUIET);
        d.touch(start);
        d.cancel();
        assert!(!d.is_pending());
        assert!(!d.poll(start + QUIET));
    }
}
