//! RON configuration file for the `lead_watch` binary.
//!
//! Durations are plain milliseconds. Everything except the two endpoint URLs
//! has a default; see `lead_watch.example.ron` at the repository root.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use lead_watch_core::{
    BackoffPolicy, ExtractionRule, NormalizerSettings, NotifyMethod, WatchSettings,
};
use lead_watch_engine::{FetchSettings, WebhookSettings};
use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "./lead_watch.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
    source: SourceSection,
    webhook: WebhookSection,
    auth: Option<AuthSection>,
    polling_interval: u64,
    base_backoff_delay: u64,
    max_backoff_delay: u64,
    max_jitter: u64,
    deduplication_window: u64,
    min_new_leads_to_notify: usize,
    ignore_fields: Vec<String>,
    notification_method: MethodSection,
    extraction: ExtractionSection,
    id_fields: Vec<String>,
    identity_fields: Vec<String>,
    delivery_timeout: u64,
    log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
struct SourceSection {
    url: String,
    headers: BTreeMap<String, String>,
    login_markers: Vec<String>,
    request_timeout: u64,
    max_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
struct WebhookSection {
    url: String,
    headers: BTreeMap<String, String>,
    timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AuthSection {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default = "default_auth_timeout")]
    timeout: u64,
}

fn default_auth_timeout() -> u64 {
    120_000
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum MethodSection {
    #[default]
    Polling,
    DomMutation,
}

#[derive(Debug, Clone, Copy, Deserialize)]
enum ExtractionSection {
    DirectArray,
    NestedSearch { depth: usize },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogSection {
    file: Option<PathBuf>,
    level: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let watch = WatchSettings::default();
        let normalizer = NormalizerSettings::default();
        Self {
            source: SourceSection::default(),
            webhook: WebhookSection::default(),
            auth: None,
            polling_interval: millis(watch.polling_interval),
            base_backoff_delay: millis(watch.backoff.base),
            max_backoff_delay: millis(watch.backoff.max),
            max_jitter: millis(watch.backoff.max_jitter),
            deduplication_window: millis(watch.deduplication_window),
            min_new_leads_to_notify: watch.min_new_leads_to_notify,
            ignore_fields: watch.ignore_fields.into_iter().collect(),
            notification_method: MethodSection::Polling,
            extraction: ExtractionSection::from(normalizer.extraction),
            id_fields: normalizer.id_fields,
            identity_fields: normalizer.identity_fields,
            delivery_timeout: 15_000,
            log: LogSection::default(),
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        Self {
            url: String::new(),
            headers: BTreeMap::new(),
            login_markers: fetch.login_markers,
            request_timeout: millis(fetch.request_timeout),
            max_bytes: fetch.max_bytes,
        }
    }
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: BTreeMap::new(),
            timeout: 10_000,
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".to_string(),
        }
    }
}

impl From<ExtractionRule> for ExtractionSection {
    fn from(rule: ExtractionRule) -> Self {
        match rule {
            ExtractionRule::DirectArray => ExtractionSection::DirectArray,
            ExtractionRule::NestedSearch { depth } => ExtractionSection::NestedSearch { depth },
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone)]
pub struct AuthCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

/// Validated configuration, ready to build the engine from.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub watch: WatchSettings,
    pub source_url: String,
    pub fetch: FetchSettings,
    pub webhook: WebhookSettings,
    pub auth: Option<AuthCommand>,
    pub delivery_timeout: Duration,
    pub log_file: Option<PathBuf>,
    pub log_level: LevelFilter,
}

pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig, ConfigError> {
    let file: ConfigFile = ron::from_str(content)?;
    validate(file)
}

fn validate(file: ConfigFile) -> Result<AppConfig, ConfigError> {
    check_url("source.url", &file.source.url)?;
    check_url("webhook.url", &file.webhook.url)?;

    if file.polling_interval == 0 {
        return Err(invalid("pollingInterval must be greater than zero"));
    }
    if file.base_backoff_delay == 0 {
        return Err(invalid("baseBackoffDelay must be greater than zero"));
    }
    if file.base_backoff_delay > file.max_backoff_delay {
        return Err(invalid("baseBackoffDelay must not exceed maxBackoffDelay"));
    }
    if file.min_new_leads_to_notify < 1 {
        return Err(invalid("minNewLeadsToNotify must be at least 1"));
    }
    if file.delivery_timeout == 0 || file.webhook.timeout == 0 {
        return Err(invalid("delivery timeouts must be greater than zero"));
    }
    if let Some(auth) = &file.auth {
        if auth.command.trim().is_empty() {
            return Err(invalid("auth.command must not be empty"));
        }
    }
    let log_level = LevelFilter::from_str(&file.log.level)
        .map_err(|_| invalid(format!("unknown log level {:?}", file.log.level)))?;

    let normalizer = NormalizerSettings {
        extraction: match file.extraction {
            ExtractionSection::DirectArray => ExtractionRule::DirectArray,
            ExtractionSection::NestedSearch { depth } => ExtractionRule::NestedSearch { depth },
        },
        id_fields: file.id_fields,
        identity_fields: file.identity_fields,
        ..NormalizerSettings::default()
    };

    let watch = WatchSettings {
        polling_interval: Duration::from_millis(file.polling_interval),
        backoff: BackoffPolicy {
            base: Duration::from_millis(file.base_backoff_delay),
            max: Duration::from_millis(file.max_backoff_delay),
            max_jitter: Duration::from_millis(file.max_jitter),
        },
        deduplication_window: Duration::from_millis(file.deduplication_window),
        min_new_leads_to_notify: file.min_new_leads_to_notify,
        ignore_fields: file.ignore_fields.into_iter().collect(),
        notify_method: match file.notification_method {
            MethodSection::Polling => NotifyMethod::Polling,
            MethodSection::DomMutation => NotifyMethod::DomMutation,
        },
        normalizer,
    };

    let fetch = FetchSettings {
        headers: file.source.headers.into_iter().collect(),
        request_timeout: Duration::from_millis(file.source.request_timeout),
        max_bytes: file.source.max_bytes,
        login_markers: file.source.login_markers,
        ..FetchSettings::default()
    };

    let webhook = WebhookSettings {
        headers: file.webhook.headers.into_iter().collect(),
        timeout: Duration::from_millis(file.webhook.timeout),
        ..WebhookSettings::new(file.webhook.url)
    };

    Ok(AppConfig {
        watch,
        source_url: file.source.url,
        fetch,
        webhook,
        auth: file.auth.map(|auth| AuthCommand {
            program: auth.command,
            args: auth.args,
            timeout: Duration::from_millis(auth.timeout),
        }),
        delivery_timeout: Duration::from_millis(file.delivery_timeout),
        log_file: file.log.file,
        log_level,
    })
}

fn check_url(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{name} is required")));
    }
    let parsed = url::Url::parse(value).map_err(|err| invalid(format!("{name}: {err}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("{name}: unsupported scheme {other}"))),
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
