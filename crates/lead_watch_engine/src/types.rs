use std::fmt;
use std::time::Duration;

use lead_watch_core::FetchFailure;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 401/403 or a redirect to the login page.
    pub fn is_auth(&self) -> bool {
        match self.kind {
            FailureKind::HttpStatus(code) => code == 401 || code == 403,
            FailureKind::LoginRedirect { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

impl From<FetchError> for FetchFailure {
    fn from(err: FetchError) -> Self {
        if err.is_auth() {
            FetchFailure::auth(err.to_string())
        } else {
            FetchFailure::transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    InvalidHeader { name: String },
    HttpStatus(u16),
    LoginRedirect { location: String },
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::InvalidHeader { name } => write!(f, "invalid header {name}"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::LoginRedirect { location } => {
                write!(f, "redirected to login page {location}")
            }
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no re-authentication hook configured")]
    NotConfigured,
    #[error("failed to start re-authentication command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("re-authentication command exited with {code:?}")]
    CommandFailed { code: Option<i32> },
    #[error("re-authentication did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid webhook header {name}")]
    InvalidHeader { name: String },
    #[error("invalid webhook url: {0}")]
    InvalidUrl(String),
    #[error("webhook transport error: {0}")]
    Transport(String),
    #[error("webhook timed out")]
    Timeout,
    #[error("webhook answered with status {0}")]
    Status(u16),
}

/// What a successful webhook call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub status: u16,
    pub bytes_sent: usize,
}
