//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the collector, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests for listing and detail pages
//! - Retry with exponential backoff for transient failures
//! - Politeness delay between requests to the same source
//! - Error classification (transient vs permanent)

use crate::config::{CollectorConfig, UserAgentConfig};
use crate::state::HostThrottle;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A failed fetch, after retries where applicable
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// Timeout, connection failure, 5xx or 429; worth retrying
    #[error("transient failure for {url}: {reason}")]
    Transient {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// Client errors (4xx) and anything else retrying cannot fix
    #[error("permanent failure for {url}: {reason}")]
    Permanent {
        url: String,
        status: Option<u16>,
        reason: String,
    },
}

impl NetworkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Transient { url, .. } | Self::Permanent { url, .. } => url,
        }
    }

    /// HTTP status when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Permanent { status, .. } => *status,
        }
    }
}

/// How many times and how patiently transient failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry; doubled for each further retry
    pub initial_backoff: Duration,
    /// Cap for a single backoff
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Backoff before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub requested_url: Url,
    /// Final URL after redirects; relative links resolve against it
    pub final_url: Url,
    /// HTTP status code
    pub status: u16,
    /// Page body content
    pub body: String,
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use civic_collector::config::{CollectorConfig, UserAgentConfig};
/// use civic_collector::crawler::build_http_client;
///
/// let ua = UserAgentConfig {
///     crawler_name: "CivicCollector".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&ua, &CollectorConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    collector: &CollectorConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(collector.request_timeout_secs))
        .connect_timeout(Duration::from_secs(collector.connect_timeout_secs))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Serial, polite fetcher bound to one source
///
/// `fetch` takes `&mut self`, so a source can never have two requests in
/// flight at once.
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    throttle: HostThrottle,
    source_id: String,
}

impl Fetcher {
    pub fn new(client: Client, policy: RetryPolicy, throttle: HostThrottle, source_id: &str) -> Self {
        Self {
            client,
            policy,
            throttle,
            source_id: source_id.to_string(),
        }
    }

    pub fn throttle_mut(&mut self) -> &mut HostThrottle {
        &mut self.throttle
    }

    pub fn request_count(&self) -> u32 {
        self.throttle.request_count()
    }

    /// Fetches a URL, retrying transient failures per the retry policy
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Success |
    /// | Timeout / connect / reset | Retry with backoff |
    /// | HTTP 5xx, 429, 408 | Retry with backoff |
    /// | Other HTTP 4xx | Immediate permanent failure |
    /// | Redirect loop / limit | Immediate permanent failure |
    ///
    /// The politeness delay is enforced before every attempt.
    pub async fn fetch(&mut self, url: &Url) -> Result<FetchedPage, NetworkError> {
        let mut retry = 0;

        loop {
            self.throttle.wait_turn().await;
            tracing::info!(
                "[{}] Fetch start: {} (attempt {})",
                self.source_id,
                url,
                retry + 1
            );

            match self.fetch_once(url).await {
                Ok(page) => {
                    tracing::info!(
                        "[{}] Fetched page: {} status={} bytes={}",
                        self.source_id,
                        url,
                        page.status,
                        page.body.len()
                    );
                    return Ok(page);
                }
                Err(err) if err.is_transient() && retry < self.policy.max_retries => {
                    retry += 1;
                    let backoff = self.policy.backoff_for(retry);
                    tracing::warn!(
                        "[{}] Retry {}/{} for {} in {:?}: {}",
                        self.source_id,
                        retry,
                        self.policy.max_retries,
                        url,
                        backoff,
                        err
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    tracing::warn!("[{}] Page fetch failed: {}", self.source_id, err);
                    return Err(err);
                }
            }
        }
    }

    /// Issues a plain GET without retrying, honoring the politeness delay
    ///
    /// Used for auxiliary requests such as robots.txt.
    pub async fn fetch_without_retry(&mut self, url: &Url) -> Result<FetchedPage, NetworkError> {
        self.throttle.wait_turn().await;
        self.fetch_once(url).await
    }

    async fn fetch_once(&self, url: &Url) -> Result<FetchedPage, NetworkError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(url, status));
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| NetworkError::Transient {
            url: url.to_string(),
            status: Some(status.as_u16()),
            reason: format!("failed to read body: {}", e),
        })?;

        Ok(FetchedPage {
            requested_url: url.clone(),
            final_url,
            status: status.as_u16(),
            body,
        })
    }
}

/// Maps a non-success HTTP status to a network error
pub fn classify_status(url: &Url, status: StatusCode) -> NetworkError {
    let code = status.as_u16();
    let reason = format!("HTTP {}", code);

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        NetworkError::Transient {
            url: url.to_string(),
            status: Some(code),
            reason,
        }
    } else {
        NetworkError::Permanent {
            url: url.to_string(),
            status: Some(code),
            reason,
        }
    }
}

fn classify_reqwest_error(url: &Url, error: &reqwest::Error) -> NetworkError {
    let status = error.status().map(|s| s.as_u16());

    if error.is_redirect() || error.is_builder() {
        return NetworkError::Permanent {
            url: url.to_string(),
            status,
            reason: error.to_string(),
        };
    }

    let reason = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        error.to_string()
    };

    NetworkError::Transient {
        url: url.to_string(),
        status,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_user_agent() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCollector".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn fast_fetcher() -> Fetcher {
        let client = build_http_client(&create_test_user_agent(), &CollectorConfig::default())
            .unwrap();
        let policy = RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        };
        Fetcher::new(
            client,
            policy,
            HostThrottle::new(Duration::from_millis(1)),
            "test",
        )
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&create_test_user_agent(), &CollectorConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_classify_status() {
        let url = Url::parse("https://example.com/").unwrap();
        assert!(classify_status(&url, StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(classify_status(&url, StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!classify_status(&url, StatusCode::NOT_FOUND).is_transient());
        assert!(!classify_status(&url, StatusCode::FORBIDDEN).is_transient());
        assert_eq!(classify_status(&url, StatusCode::GONE).status(), Some(410));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .expect(1)
            .mount(&server)
            .await;

        let mut fetcher = fast_fetcher();
        let url = Url::parse(&format!("{}/list", server.uri())).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(fetcher.request_count(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let mut fetcher = fast_fetcher();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_retries_exhaust() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let mut fetcher = fast_fetcher();
        let url = Url::parse(&format!("{}/down", server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(err.status(), Some(500));
    }
}
