use std::time::Duration;

use tokio::process::Command;
use watch_logging::{watch_info, watch_warn};

use crate::AuthError;

/// Called when a fetch reports an expired or missing session. The poller
/// waits for it before the next fetch.
#[async_trait::async_trait]
pub trait AuthHook: Send + Sync {
    async fn on_auth_required(&self) -> Result<(), AuthError>;
}

/// For deployments without an automated re-login; auth failures then simply
/// back off until the session is refreshed externally.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuthHook;

#[async_trait::async_trait]
impl AuthHook for NoopAuthHook {
    async fn on_auth_required(&self) -> Result<(), AuthError> {
        watch_warn!("authentication required but no re-login hook is configured");
        Err(AuthError::NotConfigured)
    }
}

/// Runs an external re-login command (for example a headless-browser script
/// that refreshes the session cookie) and waits for it to exit.
#[derive(Debug, Clone)]
pub struct CommandAuthHook {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAuthHook {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl AuthHook for CommandAuthHook {
    async fn on_auth_required(&self) -> Result<(), AuthError> {
        watch_info!("running re-login command {}", self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .spawn()?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => return Err(AuthError::Timeout(self.timeout)),
        };

        if status.success() {
            Ok(())
        } else {
            Err(AuthError::CommandFailed {
                code: status.code(),
            })
        }
    }
}
