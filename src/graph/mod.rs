pub mod auth;
pub mod devices;
pub mod directory;

use crate::config::ConfigManager;
use crate::error::{EntractlError, Result};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const JITTER_FACTOR: f64 = 0.3; // +/- 30% jitter

/// Retry settings for reads: 429, 5xx and connection errors
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30000),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for `attempt` with jitter, floored at 100ms for non-zero bases
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_backoff.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let capped = base_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_backoff.as_millis() as u64);

        let jitter_range = (capped as f64 * JITTER_FACTOR) as u64;
        let jitter = if jitter_range > 0 {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            std::time::SystemTime::now().hash(&mut hasher);
            (hasher.finish() % (jitter_range * 2)) as i64 - jitter_range as i64
        } else {
            0
        };

        Duration::from_millis((capped as i64 + jitter).max(100) as u64)
    }
}

/// Graph API client with retry support
pub struct GraphClient {
    client: Client,
    access_token: String,
    base_url: String,
    retry: RetryPolicy,
}

impl GraphClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, GRAPH_API_BASE)
    }

    /// Point the client at another Graph root (national clouds, test servers)
    pub fn with_base_url(access_token: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load the cached token for `tenant_name`; fails if the tenant is not logged in
    pub async fn from_config(config: &ConfigManager, tenant_name: &str) -> Result<Self> {
        let graph_auth = auth::GraphAuth::new(config.clone());
        let access_token = graph_auth.get_access_token(tenant_name).await?;
        Ok(Self::new(access_token))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs (nextLink) pass through unchanged
    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let resp = self.send(Method::GET, endpoint, None, &[]).await?;
        Ok(resp.json::<T>().await?)
    }

    /// GET with `ConsistencyLevel: eventual`, required by advanced directory queries
    pub async fn get_advanced<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let resp = self
            .send(Method::GET, endpoint, None, &[("ConsistencyLevel", "eventual")])
            .await?;
        Ok(resp.json::<T>().await?)
    }

    /// POST where Graph answers 204 No Content (actions, `$ref` links)
    pub async fn post_no_content<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<()> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, endpoint, Some(&body), &[]).await?;
        Ok(())
    }

    pub async fn delete(&self, endpoint: &str) -> Result<()> {
        self.send(Method::DELETE, endpoint, None, &[]).await?;
        Ok(())
    }

    /// Send a request. GETs retry on 429 (honoring Retry-After), 5xx and
    /// connection errors; POST and DELETE are sent exactly once, since Graph
    /// may have applied a link or action before answering with an error.
    ///
    /// Non-success statuses become `ResourceNotFound` (404) or `GraphApiError`.
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
        headers: &[(&'static str, &str)],
    ) -> Result<Response> {
        let url = self.url(endpoint);
        let attempts = if method == Method::GET {
            self.retry.max_attempts.max(1)
        } else {
            1
        };

        for attempt in 0..attempts {
            let is_last = attempt + 1 == attempts;
            debug!(%method, %url, attempt = attempt + 1, "graph request");

            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.access_token);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let resp = match request.send().await {
                Ok(resp) => resp,
                Err(e) if !is_last => {
                    let wait = self.retry.backoff(attempt);
                    warn!(error = %e, ?wait, attempt = attempt + 1, "connection error, retrying");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS && !is_last {
                let wait = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| self.retry.backoff(attempt));
                warn!(?wait, attempt = attempt + 1, "rate limited (429), retrying");
                tokio::time::sleep(wait).await;
                continue;
            }

            if status.is_server_error() && !is_last {
                let wait = self.retry.backoff(attempt);
                warn!(%status, ?wait, attempt = attempt + 1, "server error, retrying");
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let error_text = resp.text().await.unwrap_or_default();
                let enhanced = crate::error::enhance_graph_error(&error_text);
                if status == StatusCode::NOT_FOUND {
                    return Err(EntractlError::ResourceNotFound(enhanced));
                }
                return Err(EntractlError::GraphApiError(format!(
                    "HTTP {}: {}",
                    status, enhanced
                )));
            }

            return Ok(resp);
        }

        Err(EntractlError::GraphApiError(format!(
            "{} {} failed after {} attempts",
            method, url, attempts
        )))
    }
}

/// Generic paginated response from Graph API
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

impl GraphClient {
    /// Fetch all pages of a collection, following `@odata.nextLink`
    pub async fn get_all_pages<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let mut next = Some(endpoint.to_string());

        while let Some(current) = next.take() {
            let page: PaginatedResponse<T> = self.get(&current).await?;
            all_items.extend(page.value);
            next = page.next_link;
        }

        Ok(all_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped_and_floored() {
        let policy = RetryPolicy::default();
        for attempt in 0..10 {
            let wait = policy.backoff(attempt);
            assert!(wait >= Duration::from_millis(100));
            assert!(wait <= Duration::from_millis(39000));
        }
    }

    #[test]
    fn test_zero_backoff_policy() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        };
        assert_eq!(policy.backoff(2), Duration::ZERO);
    }

    #[test]
    fn test_url_joining() {
        let client = GraphClient::with_base_url("t".into(), "http://localhost:1234/");
        assert_eq!(client.url("/users"), "http://localhost:1234/users");
        assert_eq!(client.url("groups/1"), "http://localhost:1234/groups/1");
        assert_eq!(
            client.url("https://graph.microsoft.com/v1.0/users?$skiptoken=x"),
            "https://graph.microsoft.com/v1.0/users?$skiptoken=x"
        );
    }
}
