use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lead_watch_core::{NewRecordBatch, NotifyMethod, Record};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{Map, Value};
use watch_logging::watch_debug;

use crate::provider::header_map;
use crate::{DeliveryError, DeliveryReceipt};

pub const NEW_LEADS_EVENT: &str = "new_leads_detected";

/// Anything that can announce a batch of new records. One attempt per call;
/// retry policy belongs to the poller.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(
        &self,
        batch: &NewRecordBatch,
        method: NotifyMethod,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Wire body of a webhook notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub event: &'static str,
    pub method: &'static str,
    pub leads: Vec<Map<String, Value>>,
    pub timestamp: String,
}

impl NotificationPayload {
    pub fn new(batch: &NewRecordBatch, method: NotifyMethod, timestamp: String) -> Self {
        Self {
            event: NEW_LEADS_EVENT,
            method: method.as_str(),
            leads: batch.records.iter().map(lead_object).collect(),
            timestamp,
        }
    }
}

/// `{"id": identity, ...fields}`; the identity wins over an `id` field.
fn lead_object(record: &Record) -> Map<String, Value> {
    let mut lead: Map<String, Value> = record
        .fields
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();
    lead.insert("id".to_string(), Value::String(record.identity.clone()));
    lead
}

#[derive(Clone)]
pub struct WebhookSettings {
    pub url: String,
    /// Caller headers; `Content-Length` is always computed.
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    /// RFC 3339 timestamp for the payload.
    pub timestamp: Arc<dyn Fn() -> String + Send + Sync>,
}

impl WebhookSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout: Duration::from_secs(10),
            timestamp: Arc::new(|| chrono::Utc::now().to_rfc3339()),
        }
    }
}

impl fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("url", &self.url)
            .field("headers", &self.headers.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: reqwest::Url,
    headers: HeaderMap,
    settings: WebhookSettings,
}

impl WebhookNotifier {
    pub fn new(settings: WebhookSettings) -> Result<Self, DeliveryError> {
        let url = reqwest::Url::parse(&settings.url)
            .map_err(|err| DeliveryError::InvalidUrl(err.to_string()))?;
        let mut headers = header_map(&settings.headers).map_err(|err| match err.kind {
            crate::FailureKind::InvalidHeader { name } => DeliveryError::InvalidHeader { name },
            _ => DeliveryError::InvalidHeader {
                name: err.message,
            },
        })?;
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            url,
            headers,
            settings,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(
        &self,
        batch: &NewRecordBatch,
        method: NotifyMethod,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let payload = NotificationPayload::new(batch, method, (self.settings.timestamp)());
        let body = serde_json::to_vec(&payload)?;
        let bytes_sent = body.len();

        let mut headers = self.headers.clone();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes_sent));

        watch_debug!(
            "posting {} leads ({} bytes) to webhook",
            payload.leads.len(),
            bytes_sent
        );

        let response = self
            .client
            .post(self.url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(DeliveryReceipt {
            status: status.as_u16(),
            bytes_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lead_watch_core::IdentitySource;

    #[test]
    fn lead_object_puts_identity_under_id() {
        let record = Record {
            identity: "Bob|Oslo".to_string(),
            identity_source: IdentitySource::Derived,
            fields: vec![
                ("name".to_string(), "Bob".to_string()),
                ("location".to_string(), "Oslo".to_string()),
            ],
            raw_excerpt: String::new(),
        };
        let lead = lead_object(&record);
        assert_eq!(lead["id"], "Bob|Oslo");
        assert_eq!(lead["name"], "Bob");
        assert_eq!(lead["location"], "Oslo");
    }
}
