//! Thin HTTP layer over the hosted REST and auth endpoints.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Per-request timeout used when the configuration does not name one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Extra attempts made for a failed idempotent read.
pub const DEFAULT_READ_RETRIES: u32 = 2;
/// First retry delay; doubled on every further attempt.
const BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Longest single retry delay.
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Delay before retry number `attempt + 1`.
fn backoff(attempt: u32) -> Duration {
  BACKOFF_BASE
    .saturating_mul(2u32.saturating_pow(attempt))
    .min(BACKOFF_MAX)
}

/// Connection settings for a hosted project.
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
  /// Project URL, e.g. `https://abc.supabase.co`.
  pub url:          String,
  /// The project's anon/service key, sent as `apikey` and bearer token.
  pub api_key:      String,
  pub timeout:      Duration,
  pub read_retries: u32,
}

impl PostgrestConfig {
  pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
    Self {
      url:          url.into(),
      api_key:      api_key.into(),
      timeout:      DEFAULT_TIMEOUT,
      read_retries: DEFAULT_READ_RETRIES,
    }
  }
}

/// Shared `reqwest` client plus the project's base URL and key.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub(crate) struct RestClient {
  http:         Client,
  base_url:     String,
  api_key:      String,
  read_retries: u32,
}

impl RestClient {
  pub fn new(config: &PostgrestConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(Error::Transport)?;
    Ok(Self {
      http,
      base_url: config.url.trim_end_matches('/').to_owned(),
      api_key: config.api_key.clone(),
      read_retries: config.read_retries,
    })
  }

  pub fn table_url(&self, table: &str) -> String {
    format!("{}/rest/v1/{table}", self.base_url)
  }

  pub fn auth_url(&self, path: &str) -> String {
    format!("{}/auth/v1{path}", self.base_url)
  }

  /// A request carrying the project key. `bearer` overrides the key in the
  /// `Authorization` header (used for user session tokens).
  pub fn request(&self, method: Method, url: &str, bearer: Option<&str>) -> RequestBuilder {
    self
      .http
      .request(method, url)
      .header("apikey", &self.api_key)
      .bearer_auth(bearer.unwrap_or(&self.api_key))
  }

  /// Send `req` and decode a successful JSON body.
  pub async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(Error::Status { status, body });
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  /// Run an idempotent read, retrying transient failures with backoff.
  ///
  /// `build` is called once per attempt since a sent request is consumed.
  pub async fn read<T, F>(&self, what: &str, build: F) -> Result<T>
  where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
  {
    let mut attempt = 0;
    loop {
      match Self::send_json(build()).await {
        Err(e) if e.is_transient() && attempt < self.read_retries => {
          let delay = backoff(attempt);
          attempt += 1;
          tracing::warn!(what, attempt, ?delay, error = %e, "hosted read failed, retrying");
          tokio::time::sleep(delay).await;
        }
        other => return other,
      }
    }
  }
}
