use std::time::{Duration, Instant};

use watch_logging::{watch_debug, watch_info, watch_warn};

use crate::diff::diff;
use crate::state::{Phase, PollerStats};
use crate::{Effect, FailureClass, FetchFailure, Msg, PollerState, RawSnapshot};

/// Pure update function: applies a message to the poller and returns the
/// effects the runtime must perform, in order.
///
/// Messages that do not fit the current phase (a late fetch result after a
/// stop, a second `Start` while running) are ignored.
pub fn update(mut state: PollerState, msg: Msg) -> (PollerState, Vec<Effect>) {
    let effects = match msg {
        Msg::Start => match state.phase {
            Phase::Idle => {
                state.phase = Phase::Fetching;
                vec![Effect::Fetch]
            }
            Phase::Stopped => {
                state.release();
                state.stats = PollerStats::default();
                state.phase = Phase::Fetching;
                vec![Effect::Fetch]
            }
            _ => Vec::new(),
        },
        Msg::FetchCompleted { result, at } if state.phase == Phase::Fetching => match result {
            Ok(raw) => apply_snapshot(&mut state, &raw, at),
            Err(failure) => apply_fetch_failure(&mut state, failure),
        },
        Msg::AuthCompleted(result) if state.phase == Phase::Reauthenticating => {
            apply_auth_result(&mut state, result)
        }
        Msg::DeliveryCompleted { delivered } if state.phase == Phase::Delivering => {
            if delivered {
                state.stats.notifications_delivered += 1;
            } else {
                state.stats.delivery_failures += 1;
                watch_warn!(
                    "notification not delivered ({} failed so far); baseline already advanced",
                    state.stats.delivery_failures
                );
            }
            let interval = state.settings.polling_interval;
            schedule(&mut state, interval)
        }
        Msg::TimerFired if state.phase == Phase::Waiting => {
            state.phase = Phase::Fetching;
            vec![Effect::Fetch]
        }
        Msg::StopRequested => {
            if state.phase != Phase::Stopped {
                watch_info!("poller stopping after {} cycles", state.stats.cycles_completed);
            }
            state.release();
            state.phase = Phase::Stopped;
            Vec::new()
        }
        Msg::FetchCompleted { .. }
        | Msg::AuthCompleted(_)
        | Msg::DeliveryCompleted { .. }
        | Msg::TimerFired => Vec::new(),
    };

    (state, effects)
}

fn apply_snapshot(state: &mut PollerState, raw: &RawSnapshot, at: Instant) -> Vec<Effect> {
    let current = state.normalizer.normalize(raw);
    let outcome = diff(
        state.baseline.as_ref(),
        &current,
        &state.settings.ignore_fields,
    );
    let record_count = current.len();

    // The baseline advances whatever happens to the notification.
    state.baseline = Some(current);
    state.backoff.record_success();
    state.stats.cycles_completed += 1;
    let interval = state.settings.polling_interval;

    if outcome.first_observation {
        watch_info!("baseline established with {} records", record_count);
        return schedule(state, interval);
    }

    let batch = outcome.batch;
    if batch.is_empty() {
        watch_debug!("no new records among {}", record_count);
        return schedule(state, interval);
    }

    state.stats.new_records_seen += batch.len() as u64;
    watch_info!("{} new records detected", batch.len());

    if batch.len() < state.settings.min_new_leads_to_notify {
        state.stats.batches_below_minimum += 1;
        watch_info!(
            "batch of {} below minimum {}, not notifying",
            batch.len(),
            state.settings.min_new_leads_to_notify
        );
        return schedule(state, interval);
    }

    if !state.dedup.should_notify(&batch.identities(), at) {
        state.stats.batches_suppressed += 1;
        watch_info!("batch of {} suppressed inside dedup window", batch.len());
        return schedule(state, interval);
    }

    state.phase = Phase::Delivering;
    vec![Effect::Deliver {
        batch,
        method: state.settings.notify_method,
    }]
}

fn apply_fetch_failure(state: &mut PollerState, failure: FetchFailure) -> Vec<Effect> {
    let failures = state.backoff.record_failure();
    state.stats.fetch_failures += 1;

    match failure.class {
        FailureClass::Auth => {
            state.stats.auth_failures += 1;
            watch_warn!(
                "fetch needs re-authentication ({}), failure #{}",
                failure.message,
                failures
            );
            state.phase = Phase::Reauthenticating;
            vec![Effect::InvokeAuthHook]
        }
        FailureClass::Transport => {
            let delay = backoff_delay(state);
            watch_warn!(
                "fetch failed ({}), failure #{}, retrying in {:?}",
                failure.message,
                failures,
                delay
            );
            schedule(state, delay)
        }
    }
}

/// A successful re-login retries immediately, unless the previous attempt
/// already failed after one, in which case the normal backoff applies.
fn apply_auth_result(state: &mut PollerState, result: Result<(), String>) -> Vec<Effect> {
    match result {
        Ok(()) if state.backoff.consecutive_failures <= 1 => {
            watch_info!("re-authenticated, retrying fetch now");
            schedule(state, Duration::ZERO)
        }
        Ok(()) => {
            let delay = backoff_delay(state);
            watch_info!("re-authenticated, retrying fetch in {:?}", delay);
            schedule(state, delay)
        }
        Err(message) => {
            state.stats.reauth_failures += 1;
            let delay = backoff_delay(state);
            watch_warn!("re-authentication failed ({}), retrying in {:?}", message, delay);
            schedule(state, delay)
        }
    }
}

fn backoff_delay(state: &mut PollerState) -> Duration {
    let failures = state.backoff.consecutive_failures;
    state
        .settings
        .backoff
        .jittered_delay(failures, &mut state.rng)
}

fn schedule(state: &mut PollerState, delay: Duration) -> Vec<Effect> {
    state.phase = Phase::Waiting;
    vec![Effect::schedule(delay)]
}
