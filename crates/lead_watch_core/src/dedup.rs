use std::collections::HashSet;
use std::time::{Duration, Instant};

use watch_logging::watch_debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationState {
    pub last_notification: Option<Instant>,
    pub recently_notified: HashSet<String>,
}

/// Time-windowed suppression of repeat notifications.
///
/// The window is coarse: once it has fully elapsed the whole identity set is
/// dropped, and while it is active a single already-announced identity
/// suppresses the entire batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deduplicator {
    window: Duration,
    state: NotificationState,
}

impl Deduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: NotificationState::default(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state(&self) -> &NotificationState {
        &self.state
    }

    pub fn should_notify(&mut self, identities: &[String], now: Instant) -> bool {
        let window_active = match self.state.last_notification {
            Some(last) if now.saturating_duration_since(last) >= self.window => {
                watch_debug!(
                    "dedup window elapsed, forgetting {} identities",
                    self.state.recently_notified.len()
                );
                self.state.recently_notified.clear();
                false
            }
            Some(_) => true,
            None => false,
        };

        if window_active
            && identities
                .iter()
                .any(|identity| self.state.recently_notified.contains(identity))
        {
            return false;
        }

        self.state.last_notification = Some(now);
        self.state
            .recently_notified
            .extend(identities.iter().cloned());
        true
    }

    pub fn reset(&mut self) {
        self.state = NotificationState::default();
    }
}
