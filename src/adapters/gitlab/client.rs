//! GitLab REST transport.
//!
//! Features:
//! - Connection pooling via a shared `reqwest::Client`
//! - Per-instance rate limiting with `governor`
//! - Exponential backoff retry for 429, 5xx and network errors (429 only
//!   for `POST`)
//! - `x-next-page` pagination

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client as ReqwestClient, Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::models::GitLabConfig;

use super::errors::GitLabError;

/// Header carrying the next page number; empty on the last page.
pub const NEXT_PAGE_HEADER: &str = "x-next-page";

const PAGE_SIZE: &str = "100";

/// A page of a paginated listing.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<String>,
}

/// HTTP client for one GitLab instance.
#[derive(Clone)]
pub struct GitLabClient {
    http: ReqwestClient,
    endpoint: String,
    api_base: Url,
    token: String,
    limiter: Arc<DefaultDirectRateLimiter>,
    config: GitLabConfig,
}

impl std::fmt::Debug for GitLabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl GitLabClient {
    /// Build a client for `endpoint` (the instance root, e.g.
    /// `https://gitlab.example.com`).
    pub fn new(endpoint: &str, token: &str, config: &GitLabConfig) -> Result<Self, GitLabError> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let api_base = Url::parse(&format!("{endpoint}/api/v4"))
            .map_err(|e| GitLabError::InvalidUrl(format!("{endpoint}: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(GitLabError::InvalidUrl(endpoint));
        }

        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .pool_max_idle_per_host(10)
            .build()?;

        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            http,
            endpoint,
            api_base,
            token: token.to_string(),
            limiter,
            config: config.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// API URL from path segments. Each segment is percent-encoded on its
    /// own, so a project path like `group/repo` becomes `group%2Frepo`.
    pub fn url(&self, segments: &[&str]) -> Result<Url, GitLabError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| GitLabError::InvalidUrl(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// One attempt: wait for the limiter, send, classify the status.
    async fn attempt(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, GitLabError> {
        self.limiter.until_ready().await;

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header("PRIVATE-TOKEN", &self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        Err(GitLabError::from_status(
            status,
            format!("{method} {}: {text}", url.path()),
            retry_after,
        ))
    }

    /// Send a request, retrying transient failures with exponential backoff.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<Response, GitLabError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();

        let attempts = AtomicU32::new(0);
        let (client, method, url, body, attempts) = (self, &method, &url, body.as_ref(), &attempts);
        let max_retries = self.config.max_retries;

        backoff::future::retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            match client.attempt(method, url, body).await {
                Ok(response) => Ok(response),
                Err(err) if is_retryable(method, &err) && attempt < max_retries => {
                    warn!(
                        method = %method,
                        path = url.path(),
                        attempt = attempt + 1,
                        error = %err,
                        "Transient GitLab error, retrying"
                    );
                    Err(match err.retry_after() {
                        Some(delay) => backoff::Error::retry_after(err, delay),
                        None => backoff::Error::transient(err),
                    })
                }
                Err(err) => Err(backoff::Error::permanent(err)),
            }
        })
        .await
    }

    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, GitLabError> {
        let response = self.send(Method::GET, url, None).await?;
        decode(response).await
    }

    /// `GET` where 404 means absent.
    pub async fn get_optional<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, GitLabError> {
        match self.get(url).await {
            Ok(value) => Ok(Some(value)),
            Err(GitLabError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Fetch one page of a listing. `page` is the value of a previous
    /// `x-next-page` header; `None` requests the first page.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        mut url: Url,
        page: Option<&str>,
    ) -> Result<Page<T>, GitLabError> {
        url.query_pairs_mut()
            .append_pair("per_page", PAGE_SIZE)
            .append_pair("page", page.unwrap_or("1"));

        let response = self.send(Method::GET, url, None).await?;
        let next_page = response
            .headers()
            .get(NEXT_PAGE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let items = decode(response).await?;
        Ok(Page { items, next_page })
    }

    /// Every item of a paginated listing.
    pub async fn get_all<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, GitLabError> {
        let mut items = Vec::new();
        let mut page: Option<String> = None;
        loop {
            let next = self.get_page::<T>(url.clone(), page.as_deref()).await?;
            items.extend(next.items);
            match next.next_page {
                Some(p) if page.as_deref() != Some(p.as_str()) => page = Some(p),
                _ => break,
            }
        }
        debug!(path = url.path(), count = items.len(), "Fetched listing");
        Ok(items)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, url: Url, body: &B) -> Result<T, GitLabError> {
        let body = to_json(body)?;
        let response = self.send(Method::POST, url, Some(body)).await?;
        decode(response).await
    }

    /// `POST` whose response body is ignored.
    pub async fn post_empty<B: Serialize>(&self, url: Url, body: Option<&B>) -> Result<(), GitLabError> {
        let body = body.map(to_json).transpose()?;
        self.send(Method::POST, url, body).await?;
        Ok(())
    }

    pub async fn put<B: Serialize>(&self, url: Url, body: &B) -> Result<(), GitLabError> {
        let body = to_json(body)?;
        self.send(Method::PUT, url, Some(body)).await?;
        Ok(())
    }

    pub async fn delete(&self, url: Url) -> Result<(), GitLabError> {
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }
}

/// A `POST` may have been applied even when the response is a 5xx or never
/// arrives, so only a 429 is retried for it.
fn is_retryable(method: &Method, err: &GitLabError) -> bool {
    if *method == Method::POST {
        matches!(err, GitLabError::RateLimited { .. })
    } else {
        err.is_transient()
    }
}

fn to_json<B: Serialize>(body: &B) -> Result<serde_json::Value, GitLabError> {
    serde_json::to_value(body).map_err(|e| GitLabError::Decode(e.to_string()))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GitLabError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| GitLabError::Decode(e.to_string()))
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
