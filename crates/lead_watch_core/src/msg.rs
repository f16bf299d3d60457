use std::time::Instant;

use crate::RawSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network error, timeout or unexpected status. Retried after backoff.
    Transport,
    /// 401/403 or a redirect to the login page. Re-authenticate, then retry.
    Auth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub class: FailureClass,
    pub message: String,
}

impl FetchFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transport,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Auth,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Begin polling (or restart after a stop).
    Start,
    /// The snapshot provider returned.
    FetchCompleted {
        result: Result<RawSnapshot, FetchFailure>,
        at: Instant,
    },
    /// The re-authentication hook returned.
    AuthCompleted(Result<(), String>),
    /// The webhook delivery attempt finished (or timed out).
    DeliveryCompleted { delivered: bool },
    /// The wait before the next fetch elapsed.
    TimerFired,
    /// Shut down; no further cycles.
    StopRequested,
}
