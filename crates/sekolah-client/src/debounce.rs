//! Trailing-edge debouncing for interactive lookups.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Collapses bursts of calls so only the last one inside a quiet window
/// proceeds.
///
/// Each call to [`Debouncer::settle`] takes a ticket, waits for the window,
/// and reports whether it is still the most recent ticket.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    latest: Arc<AtomicU64>,
}

impl Debouncer {
    /// Debouncer with the given quiet window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Quiet window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Wait out the window; `true` when no later call arrived meanwhile.
    pub async fn settle(&self) -> bool {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.window.is_zero() {
            tokio::time::sleep(self.window).await;
        }
        self.latest.load(Ordering::SeqCst) == ticket
    }

    /// Supersede any call still waiting.
    pub fn cancel(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }
}
