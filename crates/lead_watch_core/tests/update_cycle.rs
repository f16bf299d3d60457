use std::sync::Once;
use std::time::{Duration, Instant};

use lead_watch_core::{
    update, BackoffPolicy, Effect, FetchFailure, Msg, NotifyMethod, Phase, PollerState,
    RawSnapshot, WatchSettings,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(watch_logging::initialize_for_tests);
}

fn settings() -> WatchSettings {
    WatchSettings {
        polling_interval: Duration::from_secs(30),
        backoff: BackoffPolicy {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(8000),
            max_jitter: Duration::from_millis(1000),
        },
        deduplication_window: Duration::from_secs(60),
        ..WatchSettings::default()
    }
}

fn started(settings: WatchSettings) -> PollerState {
    let (state, effects) = update(PollerState::with_rng_seed(settings, 11), Msg::Start);
    assert_eq!(effects, vec![Effect::Fetch]);
    state
}

fn fetched(state: PollerState, payload: &str, at: Instant) -> (PollerState, Vec<Effect>) {
    update(
        state,
        Msg::FetchCompleted {
            result: Ok(RawSnapshot::new(payload)),
            at,
        },
    )
}

fn failed(state: PollerState, failure: FetchFailure) -> (PollerState, Vec<Effect>) {
    update(
        state,
        Msg::FetchCompleted {
            result: Err(failure),
            at: Instant::now(),
        },
    )
}

/// Wait out the scheduled delay and land back in `Fetching`.
fn next_cycle(state: PollerState) -> PollerState {
    assert_eq!(state.phase(), Phase::Waiting);
    let (state, effects) = update(state, Msg::TimerFired);
    assert_eq!(effects, vec![Effect::Fetch]);
    state
}

fn scheduled_delay(effects: &[Effect]) -> Duration {
    match effects {
        [Effect::ScheduleFetch { delay }] => *delay,
        other => panic!("expected a single ScheduleFetch, got {other:?}"),
    }
}

#[test]
fn first_fetch_only_stores_baseline() {
    init_logging();
    let state = started(settings());
    let (state, effects) = fetched(state, r#"[{"id": "L1"}]"#, Instant::now());

    assert_eq!(scheduled_delay(&effects), Duration::from_secs(30));
    assert_eq!(state.baseline().map(|b| b.len()), Some(1));
    assert_eq!(state.stats().cycles_completed, 1);
}

#[test]
fn new_record_is_delivered_then_next_poll_scheduled() {
    init_logging();
    let t0 = Instant::now();
    let state = started(settings());
    let (state, _) = fetched(state, r#"[{"id": "L1"}]"#, t0);
    let state = next_cycle(state);

    let (state, effects) = fetched(state, r#"[{"id": "L1"}, {"id": "L2"}]"#, t0);
    match effects.as_slice() {
        [Effect::Deliver { batch, method }] => {
            assert_eq!(batch.identities(), vec!["L2".to_string()]);
            assert_eq!(*method, NotifyMethod::Polling);
        }
        other => panic!("expected delivery, got {other:?}"),
    }
    assert_eq!(state.phase(), Phase::Delivering);
    assert_eq!(state.baseline().map(|b| b.len()), Some(2));

    let (state, effects) = update(state, Msg::DeliveryCompleted { delivered: true });
    assert_eq!(scheduled_delay(&effects), Duration::from_secs(30));
    assert_eq!(state.stats().notifications_delivered, 1);
}

#[test]
fn ignored_field_change_produces_no_delivery() {
    init_logging();
    let t0 = Instant::now();
    let state = started(settings());
    let (state, _) = fetched(state, r#"[{"name": "Bob", "location": "X"}]"#, t0);
    let state = next_cycle(state);

    let (state, effects) = fetched(
        state,
        r#"[{"name": "Bob", "location": "X", "timestamp": "later"}]"#,
        t0,
    );
    assert_eq!(scheduled_delay(&effects), Duration::from_secs(30));
    assert_eq!(state.stats().new_records_seen, 0);
}

#[test]
fn batch_below_minimum_is_not_delivered_but_baseline_advances() {
    init_logging();
    let t0 = Instant::now();
    let state = started(WatchSettings {
        min_new_leads_to_notify: 2,
        ..settings()
    });
    let (state, _) = fetched(state, r#"[{"id": "L1"}]"#, t0);
    let state = next_cycle(state);

    let (state, effects) = fetched(state, r#"[{"id": "L1"}, {"id": "L2"}]"#, t0);
    assert_eq!(scheduled_delay(&effects), Duration::from_secs(30));
    assert_eq!(state.stats().batches_below_minimum, 1);
    assert_eq!(state.baseline().map(|b| b.len()), Some(2));

    // L2 is now part of the baseline, so it is never reported again.
    let state = next_cycle(state);
    let (state, effects) = fetched(state, r#"[{"id": "L1"}, {"id": "L2"}, {"id": "L3"}]"#, t0);
    assert!(matches!(effects.as_slice(), [Effect::ScheduleFetch { .. }]));
    assert_eq!(state.stats().batches_below_minimum, 2);
}

#[test]
fn failed_delivery_still_advances_baseline() {
    init_logging();
    let t0 = Instant::now();
    let state = started(settings());
    let (state, _) = fetched(state, r#"[{"id": "L1"}]"#, t0);
    let state = next_cycle(state);
    let (state, _) = fetched(state, r#"[{"id": "L1"}, {"id": "L2"}]"#, t0);

    let (state, effects) = update(state, Msg::DeliveryCompleted { delivered: false });
    assert_eq!(scheduled_delay(&effects), Duration::from_secs(30));
    assert_eq!(state.stats().delivery_failures, 1);

    // Same payload again: nothing new, no re-notification storm.
    let state = next_cycle(state);
    let (_state, effects) = fetched(state, r#"[{"id": "L1"}, {"id": "L2"}]"#, t0);
    assert!(matches!(effects.as_slice(), [Effect::ScheduleFetch { .. }]));
}

#[test]
fn interstitial_page_does_not_reannounce_known_leads() {
    init_logging();
    let t0 = Instant::now();
    let listing = r#"[{"id": "L1"}, {"id": "L2"}, {"id": "L3"}]"#;
    let state = started(settings());
    let (state, _) = fetched(state, listing, t0);

    let state = next_cycle(state);
    let (state, effects) = fetched(state, "<html>Service temporarily unavailable</html>", t0);
    assert_eq!(scheduled_delay(&effects), Duration::from_secs(30));

    let state = next_cycle(state);
    let (state, effects) = fetched(state, listing, t0);
    assert_eq!(scheduled_delay(&effects), Duration::from_secs(30));
    assert_eq!(state.stats().new_records_seen, 0);
    assert_eq!(state.baseline().map(|b| b.len()), Some(3));
}

#[test]
fn echoed_record_inside_dedup_window_is_suppressed() {
    init_logging();
    let t0 = Instant::now();
    let state = started(settings());
    let (state, _) = fetched(state, r#"[{"id": "L1"}]"#, t0);
    let state = next_cycle(state);
    let (state, _) = fetched(state, r#"[{"id": "L1"}, {"id": "L2"}]"#, t0);
    let (state, _) = update(state, Msg::DeliveryCompleted { delivered: true });

    // Upstream briefly drops L2 and echoes it back with a newcomer.
    let state = next_cycle(state);
    let (state, _) = fetched(state, r#"[{"id": "L1"}]"#, t0 + Duration::from_secs(30));
    let state = next_cycle(state);
    let (state, effects) = fetched(
        state,
        r#"[{"id": "L1"}, {"id": "L2"}, {"id": "L3"}]"#,
        t0 + Duration::from_secs(60) - Duration::from_millis(1),
    );

    assert!(matches!(effects.as_slice(), [Effect::ScheduleFetch { .. }]));
    assert_eq!(state.stats().batches_suppressed, 1);
}

#[test]
fn transport_failure_backs_off_and_success_resets() {
    init_logging();
    let policy = settings().backoff;
    let state = started(settings());

    let (state, effects) = failed(state, FetchFailure::transport("connection refused"));
    let delay = scheduled_delay(&effects);
    assert_eq!(state.consecutive_failures(), 1);
    assert!(delay >= policy.delay(1) && delay <= policy.delay(1) + policy.max_jitter);

    let state = next_cycle(state);
    let (state, effects) = failed(state, FetchFailure::transport("timeout"));
    let delay = scheduled_delay(&effects);
    assert_eq!(state.consecutive_failures(), 2);
    assert!(delay >= policy.delay(2) && delay <= policy.delay(2) + policy.max_jitter);

    let state = next_cycle(state);
    let (state, _) = fetched(state, "[]", Instant::now());
    assert_eq!(state.consecutive_failures(), 0);
    assert_eq!(state.stats().fetch_failures, 2);
}

#[test]
fn backoff_is_capped() {
    init_logging();
    let policy = settings().backoff;
    let mut state = started(settings());
    for _ in 0..10 {
        let (next, effects) = failed(state, FetchFailure::transport("down"));
        let delay = scheduled_delay(&effects);
        assert!(delay <= policy.max + policy.max_jitter);
        state = next_cycle(next);
    }
    assert_eq!(state.consecutive_failures(), 10);
}

#[test]
fn auth_failure_invokes_hook_once_before_next_fetch() {
    init_logging();
    let state = started(settings());

    let (state, effects) = failed(state, FetchFailure::auth("http status 401"));
    assert_eq!(effects, vec![Effect::InvokeAuthHook]);
    assert_eq!(state.phase(), Phase::Reauthenticating);
    assert_eq!(state.consecutive_failures(), 1);
    assert_eq!(state.stats().auth_failures, 1);

    let (state, effects) = update(state, Msg::AuthCompleted(Ok(())));
    assert_eq!(scheduled_delay(&effects), Duration::ZERO);

    let (state, effects) = update(state, Msg::TimerFired);
    assert_eq!(effects, vec![Effect::Fetch]);
    assert_eq!(state.consecutive_failures(), 1);
}

#[test]
fn repeated_auth_failure_waits_for_backoff() {
    init_logging();
    let policy = settings().backoff;
    let state = started(settings());

    let (state, _) = failed(state, FetchFailure::auth("401"));
    let (state, _) = update(state, Msg::AuthCompleted(Ok(())));
    let state = next_cycle(state);
    let (state, effects) = failed(state, FetchFailure::auth("401"));
    assert_eq!(effects, vec![Effect::InvokeAuthHook]);

    let (_state, effects) = update(state, Msg::AuthCompleted(Ok(())));
    assert!(scheduled_delay(&effects) >= policy.delay(2));
}

#[test]
fn failed_reauth_waits_for_backoff() {
    init_logging();
    let policy = settings().backoff;
    let state = started(settings());

    let (state, _) = failed(state, FetchFailure::auth("403"));
    let (state, effects) = update(state, Msg::AuthCompleted(Err("login form changed".into())));
    assert!(scheduled_delay(&effects) >= policy.delay(1));
    assert_eq!(state.stats().reauth_failures, 1);
}

#[test]
fn stop_releases_state_and_ignores_late_results() {
    init_logging();
    let state = started(settings());
    let (state, _) = fetched(state, r#"[{"id": "L1"}]"#, Instant::now());

    let (state, effects) = update(state, Msg::StopRequested);
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Stopped);
    assert!(state.baseline().is_none());
    assert!(state.deduplicator().state().recently_notified.is_empty());

    let (state, effects) = update(state, Msg::TimerFired);
    assert!(effects.is_empty());
    let (state, effects) = fetched(state, r#"[{"id": "L2"}]"#, Instant::now());
    assert!(effects.is_empty());
    assert!(state.baseline().is_none());
}

#[test]
fn restart_after_stop_begins_fresh() {
    init_logging();
    let state = started(settings());
    let (state, _) = failed(state, FetchFailure::transport("down"));
    let (state, _) = update(state, Msg::StopRequested);

    let (state, effects) = update(state, Msg::Start);
    assert_eq!(effects, vec![Effect::Fetch]);
    assert_eq!(state.consecutive_failures(), 0);
    assert_eq!(state.stats().fetch_failures, 0);

    // The first snapshot after a restart is a baseline again.
    let (state, effects) = fetched(state, r#"[{"id": "L1"}]"#, Instant::now());
    assert!(matches!(effects.as_slice(), [Effect::ScheduleFetch { .. }]));
    assert_eq!(state.stats().new_records_seen, 0);
}

#[test]
fn start_while_running_is_ignored() {
    init_logging();
    let state = started(settings());
    let (state, effects) = update(state, Msg::Start);
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Fetching);
}
