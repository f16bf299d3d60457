//! Lead watch engine: snapshot fetching, re-login hook, webhook delivery and
//! the async loop that executes the core's poll-cycle effects.
mod auth;
mod notify;
mod poller;
mod provider;
mod types;

pub use auth::{AuthHook, CommandAuthHook, NoopAuthHook};
pub use notify::{NotificationPayload, Notifier, WebhookNotifier, WebhookSettings, NEW_LEADS_EVENT};
pub use poller::{Poller, PollerHandle};
pub use provider::{FetchSettings, HttpSnapshotProvider, SnapshotProvider};
pub use types::{AuthError, DeliveryError, DeliveryReceipt, FailureKind, FetchError};
