//! LZT HTTP Client - Rate-limited REST API Client
//!
//! Wraps reqwest with rate limiting, retries, and bearer authentication
//! for all LZT market REST API interactions.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Proxy, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::BearerAuth;
use crate::error::ApiError;

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.lzt.market/";

/// Configuration for the LZT HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  /// Base URL for the market API.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Optional proxy, e.g. `http://user:pass@ip:port` or `socks5://ip:port`.
  pub proxy_url: Option<String>,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Maximum retries on transient errors.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
  /// Outgoing request budget.
  pub requests_per_minute: u32,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_string(),
      timeout: Duration::from_secs(30),
      proxy_url: None,
      max_concurrent: 10,
      max_retries: 3,
      retry_base_delay: Duration::from_millis(200),
      requests_per_minute: 120,
    }
  }
}

/// Rate-limited HTTP client for the LZT market API.
pub struct LztClient {
  /// Underlying HTTP client.
  http: Client,
  /// Bearer credentials.
  auth: Arc<BearerAuth>,
  /// Parsed API root, always ending in `/`.
  base_url: Url,
  /// Client configuration.
  config: ClientConfig,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
  /// Request pacing.
  limiter: DefaultDirectRateLimiter,
}

impl LztClient {
  /// Create a new client. Fails on a malformed base or proxy URL.
  pub fn new(auth: Arc<BearerAuth>, config: ClientConfig) -> Result<Self, ApiError> {
    let mut builder = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .pool_idle_timeout(Duration::from_secs(90));

    if let Some(proxy_url) = config.proxy_url.as_deref().filter(|p| !p.is_empty()) {
      let proxy = Proxy::all(proxy_url)
        .map_err(|e| ApiError::InvalidConfig(format!("failed to parse proxy URL: {e}")))?;
      builder = builder.proxy(proxy);
    }

    let http = builder
      .build()
      .map_err(|e| ApiError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

    let mut root = config.base_url.trim().to_string();
    if !root.ends_with('/') {
      root.push('/');
    }
    let base_url = Url::parse(&root)
      .map_err(|e| ApiError::InvalidConfig(format!("invalid base URL {root:?}: {e}")))?;

    let per_minute = NonZeroU32::new(config.requests_per_minute).ok_or_else(|| {
      ApiError::InvalidConfig("requests_per_minute must be positive".to_string())
    })?;

    Ok(Self {
      http,
      auth,
      base_url,
      semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
      limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
      config,
    })
  }

  /// API root this client talks to.
  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Execute an authenticated GET and decode the JSON body.
  pub async fn get_json<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    query: &[(&str, String)],
  ) -> Result<T, ApiError> {
    let url = self
      .base_url
      .join(endpoint)
      .map_err(|e| ApiError::InvalidConfig(format!("invalid endpoint {endpoint:?}: {e}")))?;
    let request = self.http.get(url).query(query);
    let body = self.execute_with_retry(request, endpoint).await?;
    Ok(serde_json::from_str(&body)?)
  }

  /// Execute request with authentication, rate limiting, and retries.
  ///
  /// Transport errors, 429 and 5xx are retried; any other non-2xx
  /// status fails immediately with the response body.
  async fn execute_with_retry(
    &self,
    request: RequestBuilder,
    endpoint: &str,
  ) -> Result<String, ApiError> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .map_err(|_| ApiError::InvalidConfig("request semaphore closed".to_string()))?;

    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self
          .config
          .retry_base_delay
          .saturating_mul(2u32.saturating_pow(attempt - 1));
        debug!(attempt, endpoint, delay_ms = delay.as_millis(), "Retrying request");
        sleep(delay).await;
      }

      self.limiter.until_ready().await;

      let req = request
        .try_clone()
        .ok_or_else(|| ApiError::InvalidConfig("request is not cloneable".to_string()))?
        .header(AUTHORIZATION, self.auth.header_value());

      match req.send().await {
        Ok(response) => {
          let status = response.status();
          if status.is_success() {
            return Ok(response.text().await?);
          }

          let body = response.text().await.unwrap_or_default();
          if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            warn!(status = %status, attempt, endpoint, "Transient API error, backing off");
            last_error = Some(ApiError::Status {
              status: status.as_u16(),
              body,
            });
            continue;
          }

          return Err(ApiError::Status {
            status: status.as_u16(),
            body,
          });
        }
        Err(e) => {
          warn!(error = %e, attempt, endpoint, "Request failed");
          last_error = Some(e.into());
        }
      }
    }

    match last_error {
      Some(e) if self.config.max_retries == 0 => Err(e),
      last => Err(ApiError::RetriesExhausted {
        attempts: self.config.max_retries + 1,
        last: last.map_or_else(|| "no response".to_string(), |e| e.to_string()),
      }),
    }
  }
}
