//! Remote data client.
//!
//! Typed GET requests against the two remote endpoints with token
//! resolution, envelope unwrapping, bounded retry and an in-memory TTL
//! cache. Every failure stops at this boundary: callers see `None` and can
//! inspect [`RemoteClient::last_error`] for diagnostics.

pub mod api;
pub mod cache;
pub mod envelope;
pub mod token;
pub mod transport;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub use api::MatchApi;
pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use token::{EnvTokenSource, SessionTokenSource, StaticToken};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

/// Errors that can occur during fetching.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Envelope rejected: {0}")]
    Envelope(String),
}

impl FetchError {
    /// Permanent failures abort the retry loop immediately.
    pub fn is_permanent(&self) -> bool {
        match self {
            FetchError::Http(_) | FetchError::Transport(_) => false,
            FetchError::HttpStatus { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            FetchError::InvalidUrl(_) | FetchError::Json(_) | FetchError::Envelope(_) => true,
        }
    }
}

/// Which remote base a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// Session-authenticated web API
    Web,
    /// Service-key authenticated open data API
    Open,
}

/// How the bearer token for a request is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Endpoint default, then the host session token
    #[default]
    Auto,
    /// Explicit token
    Bearer(String),
    /// Never send a token
    Anonymous,
}

/// Everything that identifies a request. Two equal descriptors are the
/// same request as far as the cache is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub path: String,
    pub endpoint: Endpoint,
    pub query: Vec<(String, String)>,
    pub auth: AuthMode,
    pub unwrap: bool,
}

impl RequestDescriptor {
    pub fn new(endpoint: Endpoint, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            endpoint,
            query: Vec::new(),
            auth: AuthMode::Auto,
            unwrap: false,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    pub fn unwrapped(mut self) -> Self {
        self.unwrap = true;
        self
    }

    /// Hash of the serialized descriptor.
    pub fn cache_key(&self) -> String {
        let serialized = serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self));
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

/// Retry policy for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        }
    }
}

/// Configuration for the remote client.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub web_base_url: String,
    pub open_base_url: String,

    /// Default token for the web endpoint (normally empty; the session
    /// token is used instead)
    pub web_token: Option<String>,

    /// Fixed service key for the open endpoint
    pub open_api_key: Option<String>,

    /// How long successful results are reused
    pub cache_ttl: Duration,

    /// How long a failed request is remembered before it may be retried.
    /// Zero disables negative caching.
    pub negative_ttl: Duration,

    pub timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            web_base_url: "https://api.faceit.com".to_string(),
            open_base_url: "https://open.faceit.com/data/v4".to_string(),
            web_token: None,
            open_api_key: None,
            cache_ttl: Duration::from_secs(60 * 60), // 60 minutes
            negative_ttl: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            user_agent: format!("matchroom-lens/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryPolicy::default(),
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Option<Value>>>;

/// Issues requests. Kept separate from the cache so in-flight futures do not
/// hold a reference back to the cache that stores them.
struct Requester {
    config: FetcherConfig,
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn SessionTokenSource>,
    last_error: Mutex<Option<String>>,
}

impl Requester {
    async fn execute(&self, descriptor: &RequestDescriptor) -> Option<Value> {
        match self.execute_with_retry(descriptor).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %descriptor.path, error = %e, "Remote fetch failed");
                *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(e.to_string());
                None
            }
        }
    }

    async fn execute_with_retry(&self, descriptor: &RequestDescriptor) -> Result<Value, FetchError> {
        let url = self.build_url(descriptor)?;
        let token = self.resolve_token(descriptor);
        let policy = &self.config.retry;
        let mut delay = policy.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.attempt(&url, token.as_deref(), descriptor.unwrap).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_permanent() || attempt >= policy.max_attempts.max(1) => {
                    return Err(e)
                }
                Err(e) => {
                    debug!(
                        "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                        attempt, policy.max_attempts, url, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(policy.backoff_multiplier);
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        token: Option<&str>,
        unwrap: bool,
    ) -> Result<Value, FetchError> {
        let response = self.transport.get(url, token).await?;

        if !response.is_success() {
            return Err(FetchError::HttpStatus {
                status: response.status,
                message: reqwest::StatusCode::from_u16(response.status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown")
                    .to_string(),
            });
        }

        let body: Value = serde_json::from_slice(&response.body)?;
        if unwrap {
            envelope::unwrap_envelope(body)
        } else {
            Ok(body)
        }
    }

    fn build_url(&self, descriptor: &RequestDescriptor) -> Result<Url, FetchError> {
        let base = match descriptor.endpoint {
            Endpoint::Web => &self.config.web_base_url,
            Endpoint::Open => &self.config.open_base_url,
        };
        let url_str = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            descriptor.path.trim_start_matches('/')
        );
        let mut url = Url::parse(&url_str)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url_str, e)))?;

        if !descriptor.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &descriptor.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Explicit token, then the endpoint default, then the session token.
    /// With none of those the request goes out unauthenticated.
    fn resolve_token(&self, descriptor: &RequestDescriptor) -> Option<String> {
        match &descriptor.auth {
            AuthMode::Anonymous => None,
            AuthMode::Bearer(token) => Some(token.clone()),
            AuthMode::Auto => {
                let endpoint_default = match descriptor.endpoint {
                    Endpoint::Web => self.config.web_token.clone(),
                    Endpoint::Open => self.config.open_api_key.clone(),
                };
                endpoint_default
                    .filter(|t| !t.is_empty())
                    .or_else(|| self.tokens.session_token())
            }
        }
    }
}

struct ClientInner {
    requester: Arc<Requester>,
    clock: Arc<dyn Clock>,
    cache: Mutex<TtlCache<SharedFetch>>,
}

/// Cached remote client. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<ClientInner>,
}

impl RemoteClient {
    pub fn new(
        config: FetcherConfig,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn SessionTokenSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                requester: Arc::new(Requester {
                    config,
                    transport,
                    tokens,
                    last_error: Mutex::new(None),
                }),
                clock,
                cache: Mutex::new(TtlCache::new()),
            }),
        }
    }

    /// Client backed by `reqwest` and the system clock.
    pub fn with_reqwest(
        config: FetcherConfig,
        tokens: Arc<dyn SessionTokenSource>,
    ) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(config.timeout, &config.user_agent)?;
        Ok(Self::new(
            config,
            Arc::new(transport),
            tokens,
            Arc::new(SystemClock),
        ))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Most recent failure seen by this client.
    pub fn last_error(&self) -> Option<String> {
        self.inner
            .requester
            .last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Fetch and decode. Never fails; any error yields `None`.
    pub async fn fetch<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> Option<T> {
        let value = self.fetch_value(descriptor).await?;
        match serde_json::from_value::<T>(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(path = %descriptor.path, error = %e, "Unexpected response shape");
                *self
                    .inner
                    .requester
                    .last_error
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(format!("Decode error: {}", e));
                None
            }
        }
    }

    /// Fetch the raw decoded body (or envelope payload).
    ///
    /// Identical descriptors share one network call while the entry is live,
    /// including calls that arrive while the first is still in flight.
    pub async fn fetch_value(&self, descriptor: &RequestDescriptor) -> Option<Value> {
        let key = descriptor.cache_key();
        let config = &self.inner.requester.config;

        let (shared, stamp) = {
            let now = self.inner.clock.now();
            let mut cache = self.inner.cache.lock().unwrap_or_else(|e| e.into_inner());

            match cache.get(&key, now) {
                Some(hit) => {
                    debug!("Cache hit for {}", descriptor.path);
                    hit
                }
                None => {
                    cache.purge_expired(now);
                    let requester = Arc::clone(&self.inner.requester);
                    let owned = descriptor.clone();
                    let future: SharedFetch =
                        async move { requester.execute(&owned).await }.boxed().shared();
                    let expires_at = now + to_chrono(config.cache_ttl);
                    let stamp = cache.insert(key.clone(), future.clone(), expires_at);
                    (future, stamp)
                }
            }
        };

        let result = shared.await;

        if result.is_none() {
            let now = self.inner.clock.now();
            let mut cache = self.inner.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.expire_at(&key, stamp, now + to_chrono(config.negative_ttl));
        }

        result
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        let mut cache = self.inner.cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = TtlCache::new();
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero())
}
