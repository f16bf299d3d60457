use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::normalize::NormalizerSettings;

/// How new records were noticed, reported in the notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyMethod {
    #[default]
    Polling,
    DomMutation,
}

impl NotifyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyMethod::Polling => "polling",
            NotifyMethod::DomMutation => "dom_mutation",
        }
    }
}

impl fmt::Display for NotifyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub polling_interval: Duration,
    pub backoff: BackoffPolicy,
    pub deduplication_window: Duration,
    /// Batches smaller than this are not announced (the baseline still advances).
    pub min_new_leads_to_notify: usize,
    /// Fields excluded from equality when comparing derived-identity records.
    pub ignore_fields: HashSet<String>,
    pub notify_method: NotifyMethod,
    pub normalizer: NormalizerSettings,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            deduplication_window: Duration::from_secs(60),
            min_new_leads_to_notify: 1,
            ignore_fields: HashSet::from(["timestamp".to_string()]),
            notify_method: NotifyMethod::Polling,
            normalizer: NormalizerSettings::default(),
        }
    }
}
