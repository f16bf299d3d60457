use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use lead_watch_core::{update, Effect, FetchFailure, Msg, PollerState, PollerStats, WatchSettings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use watch_logging::{watch_error, watch_info, watch_warn};

use crate::{AuthHook, Notifier, SnapshotProvider};

/// Drives the poll cycle: feeds [`Msg`]s into the pure state machine and
/// performs the [`Effect`]s it returns, one at a time.
pub struct Poller {
    state: PollerState,
    provider: Arc<dyn SnapshotProvider>,
    auth: Arc<dyn AuthHook>,
    notifier: Arc<dyn Notifier>,
    delivery_timeout: Duration,
}

impl Poller {
    pub fn new(
        settings: WatchSettings,
        provider: Arc<dyn SnapshotProvider>,
        auth: Arc<dyn AuthHook>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_state(PollerState::new(settings), provider, auth, notifier)
    }

    pub fn with_state(
        state: PollerState,
        provider: Arc<dyn SnapshotProvider>,
        auth: Arc<dyn AuthHook>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            state,
            provider,
            auth,
            notifier,
            delivery_timeout: Duration::from_secs(15),
        }
    }

    /// Upper bound for one webhook attempt; an expired attempt counts as failed.
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Poll until `cancel` fires. Returns the counters of the finished run.
    pub async fn run(self, cancel: CancellationToken) -> PollerStats {
        let (mut state, effects) = update(self.state.clone(), Msg::Start);
        let mut pending: VecDeque<Effect> = effects.into();
        watch_info!(
            "polling every {:?}",
            state.settings().polling_interval
        );

        while let Some(effect) = pending.pop_front() {
            let msg = self.perform(effect, &cancel).await;
            let (next, effects) = update(state, msg);
            state = next;
            pending.extend(effects);
        }

        let stats = state.stats();
        watch_info!(
            "poller stopped: {} cycles, {} fetch failures, {} notifications, {} failed deliveries",
            stats.cycles_completed,
            stats.fetch_failures,
            stats.notifications_delivered,
            stats.delivery_failures
        );
        stats
    }

    async fn perform(&self, effect: Effect, cancel: &CancellationToken) -> Msg {
        match effect {
            Effect::Fetch => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Msg::StopRequested,
                    result = self.provider.fetch_snapshot() => Msg::FetchCompleted {
                        result: result.map_err(FetchFailure::from),
                        at: tokio::time::Instant::now().into_std(),
                    },
                }
            }
            Effect::InvokeAuthHook => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Msg::StopRequested,
                    result = self.auth.on_auth_required() => {
                        Msg::AuthCompleted(result.map_err(|err| err.to_string()))
                    }
                }
            }
            Effect::Deliver { batch, method } => {
                let attempt = self.notifier.deliver(&batch, method);
                let delivered = match tokio::time::timeout(self.delivery_timeout, attempt).await {
                    Ok(Ok(receipt)) => {
                        watch_info!(
                            "notified {} new leads (status {})",
                            batch.len(),
                            receipt.status
                        );
                        true
                    }
                    Ok(Err(err)) => {
                        watch_warn!("delivery of {} leads failed: {}", batch.len(), err);
                        false
                    }
                    Err(_) => {
                        watch_warn!(
                            "delivery of {} leads timed out after {:?}",
                            batch.len(),
                            self.delivery_timeout
                        );
                        false
                    }
                };
                Msg::DeliveryCompleted { delivered }
            }
            Effect::ScheduleFetch { delay } => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Msg::StopRequested,
                    _ = tokio::time::sleep(delay) => Msg::TimerFired,
                }
            }
        }
    }
}

/// A poller running on the tokio runtime.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: JoinHandle<PollerStats>,
}

impl PollerHandle {
    pub fn spawn(poller: Poller) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poller.run(cancel.clone()));
        Self { cancel, task }
    }

    /// Request a stop and wait for the current step to wind down.
    pub async fn stop(self) -> PollerStats {
        self.cancel.cancel();
        match self.task.await {
            Ok(stats) => stats,
            Err(err) => {
                watch_error!("poller task ended abnormally: {}", err);
                PollerStats::default()
            }
        }
    }
}
