use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, SystemTime};

use futures_util::StreamExt;
use lead_watch_core::RawSnapshot;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use watch_logging::watch_debug;

use crate::{FailureKind, FetchError};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Extra request headers, typically the session cookie.
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    /// A redirect whose target path contains one of these is an auth failure.
    pub login_markers: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            login_markers: vec![
                "/login".to_string(),
                "/signin".to_string(),
                "/sign_in".to_string(),
                "/oauth".to_string(),
            ],
        }
    }
}

/// Source of raw snapshots. Errors must let the poller tell auth failures
/// from transport failures, see [`FetchError::is_auth`].
#[async_trait::async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<RawSnapshot, FetchError>;
}

/// Plain HTTP GET of an already-authenticated endpoint.
#[derive(Debug, Clone)]
pub struct HttpSnapshotProvider {
    url: reqwest::Url,
    headers: HeaderMap,
    settings: FetchSettings,
}

impl HttpSnapshotProvider {
    pub fn new(url: &str, settings: FetchSettings) -> Result<Self, FetchError> {
        let url = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let headers = header_map(&settings.headers)?;
        Ok(Self {
            url,
            headers,
            settings,
        })
    }

    fn build_client(
        &self,
        redirect_counter: Arc<AtomicUsize>,
        login_redirect: Arc<Mutex<Option<String>>>,
    ) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let markers = self.settings.login_markers.clone();
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let count = attempt.previous().len();
            redirect_counter.store(count, Ordering::Relaxed);
            if is_login_url(attempt.url(), &markers) {
                if let Ok(mut location) = login_redirect.lock() {
                    *location = Some(attempt.url().to_string());
                }
                attempt.stop()
            } else if count >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(policy)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
    }
}

#[async_trait::async_trait]
impl SnapshotProvider for HttpSnapshotProvider {
    async fn fetch_snapshot(&self) -> Result<RawSnapshot, FetchError> {
        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let login_redirect = Arc::new(Mutex::new(None));
        let client = self.build_client(redirect_counter.clone(), login_redirect.clone())?;

        let response = client
            .get(self.url.clone())
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let login_location = login_redirect.lock().ok().and_then(|mut slot| slot.take());
        if let Some(location) = login_location {
            return Err(FetchError::new(
                FailureKind::LoginRedirect { location },
                "session expired",
            ));
        }

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        watch_debug!(
            "fetched {} bytes after {} redirects",
            bytes.len(),
            redirect_counter.load(Ordering::Relaxed)
        );

        Ok(RawSnapshot {
            bytes,
            content_type,
            captured_at: SystemTime::now(),
        })
    }
}

fn is_login_url(url: &reqwest::Url, markers: &[String]) -> bool {
    let path = url.path().to_ascii_lowercase();
    markers
        .iter()
        .any(|marker| path.contains(&marker.to_ascii_lowercase()))
}

pub(crate) fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, FetchError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let invalid = || {
            FetchError::new(
                FailureKind::InvalidHeader { name: name.clone() },
                "header name or value is not valid",
            )
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
