use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::backoff::BackoffState;
use crate::dedup::Deduplicator;
use crate::normalize::Normalizer;
use crate::{NormalizedSnapshot, WatchSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Fetching,
    Delivering,
    Reauthenticating,
    Waiting,
    Stopped,
}

/// Counters surfaced for logging; failures never stop the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollerStats {
    pub cycles_completed: u64,
    pub fetch_failures: u64,
    pub auth_failures: u64,
    pub reauth_failures: u64,
    pub new_records_seen: u64,
    pub batches_below_minimum: u64,
    pub batches_suppressed: u64,
    pub notifications_delivered: u64,
    pub delivery_failures: u64,
}

/// Everything the poll cycle owns. Passed by value through [`crate::update`].
#[derive(Debug, Clone)]
pub struct PollerState {
    pub(crate) settings: WatchSettings,
    pub(crate) normalizer: Normalizer,
    pub(crate) phase: Phase,
    pub(crate) baseline: Option<NormalizedSnapshot>,
    pub(crate) backoff: BackoffState,
    pub(crate) dedup: Deduplicator,
    pub(crate) stats: PollerStats,
    pub(crate) rng: StdRng,
}

impl PollerState {
    pub fn new(settings: WatchSettings) -> Self {
        Self::with_rng(settings, StdRng::from_os_rng())
    }

    /// Deterministic jitter, for tests and replays.
    pub fn with_rng_seed(settings: WatchSettings, seed: u64) -> Self {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: WatchSettings, rng: StdRng) -> Self {
        Self {
            normalizer: Normalizer::new(settings.normalizer.clone()),
            dedup: Deduplicator::new(settings.deduplication_window),
            settings,
            phase: Phase::Idle,
            baseline: None,
            backoff: BackoffState::default(),
            stats: PollerStats::default(),
            rng,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    pub fn baseline(&self) -> Option<&NormalizedSnapshot> {
        self.baseline.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.backoff.consecutive_failures
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn stats(&self) -> PollerStats {
        self.stats
    }

    /// Drop per-run state: baseline, notification window and backoff.
    pub(crate) fn release(&mut self) {
        self.baseline = None;
        self.dedup.reset();
        self.backoff = BackoffState::default();
    }
}
