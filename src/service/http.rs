//! HTTP fetching with a hard per-request deadline and a uniform retry policy.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, redirect, Client};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{AnalysisOptions, CrawlOptions, ExtractionOptions};
use crate::domain::models::is_html_content_type;
use crate::error::{AppError, Result};

const MAX_REDIRECTS: usize = 10;
/// HTML beyond this many bytes is dropped unread
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Fixed-delay retry policy applied to every fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, retry_delay_ms: u64) -> Self {
        Self {
            retry_count,
            retry_delay: Duration::from_millis(retry_delay_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_count + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 1000)
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub follow_redirects: bool,
    pub user_agent: String,
    pub max_body_bytes: usize,
}

impl FetcherConfig {
    pub fn for_crawl(options: &CrawlOptions) -> Self {
        Self {
            timeout: options.timeout(),
            retry: RetryPolicy::new(options.retry_count, options.retry_delay),
            follow_redirects: true,
            user_agent: options.user_agent.clone(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Link checking must see 3xx answers, so redirects are not followed.
    pub fn for_link_check(options: &AnalysisOptions) -> Self {
        Self {
            timeout: Duration::from_millis(options.timeout),
            retry: RetryPolicy::new(options.retry_count, options.retry_delay),
            follow_redirects: false,
            user_agent: options.user_agent.clone(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn for_extraction(options: &ExtractionOptions) -> Self {
        Self {
            timeout: Duration::from_millis(options.timeout),
            retry: RetryPolicy::new(options.retry_count, options.retry_delay),
            follow_redirects: true,
            user_agent: options.user_agent.clone(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// A completed HTTP exchange. Any status code is a response, not an error.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status_code: u16,
    pub final_url: Url,
    /// Empty for non-HTML content, which is fetched but never parsed
    pub body: String,
    pub content_type: Option<String>,
    /// `Location` header of an unfollowed redirect, resolved to absolute
    pub location: Option<String>,
    pub duration: Duration,
    pub attempts: u32,
}

impl FetchResponse {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(is_html_content_type)
            .unwrap_or(true)
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// `AppError::HttpStatus` for a 4xx/5xx answer.
    pub fn status_error(&self) -> Option<AppError> {
        self.is_error().then(|| AppError::HttpStatus {
            url: self.final_url.to_string(),
            status: self.status_code,
        })
    }

    /// Treat 4xx/5xx answers as errors, like `reqwest::Response::error_for_status`.
    pub fn error_for_status(self) -> Result<Self> {
        match self.status_error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Seam between the scheduler and the network.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one URL, retrying transient failures per the configured policy.
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    config: FetcherConfig,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// A fetcher whose retry waits end early once `cancel` fires.
    pub fn with_cancellation(config: FetcherConfig, cancel: CancellationToken) -> Result<Self> {
        let policy = if config.follow_redirects {
            redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(policy)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::Other(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            cancel,
        })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    async fn fetch_once(&self, url: &Url) -> Result<FetchResponse> {
        let started = Instant::now();
        let timeout_ms = self.config.timeout.as_millis() as u64;

        let exchange = async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| map_reqwest_error(url.as_str(), e, timeout_ms))?;

            let status_code = response.status().as_u16();
            let final_url = response.url().clone();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| final_url.join(loc).ok())
                .map(|u| u.to_string());

            let is_html = content_type
                .as_deref()
                .map(is_html_content_type)
                .unwrap_or(true);

            let body = if is_html && status_code < 300 {
                let bytes = read_capped(response, self.config.max_body_bytes)
                    .await
                    .map_err(|e| map_reqwest_error(url.as_str(), e, timeout_ms))?;
                decode_body(&bytes, content_type.as_deref())
            } else {
                String::new()
            };

            Ok::<_, AppError>(FetchResponse {
                status_code,
                final_url,
                body,
                content_type,
                location,
                duration: Duration::ZERO,
                attempts: 1,
            })
        };

        // hard deadline over connect, headers and body
        let mut response = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| AppError::timeout(url.as_str(), timeout_ms))??;
        response.duration = started.elapsed();
        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for Fetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let parsed = Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{}: {}", url, e)))?;
        let max_attempts = self.config.retry.max_attempts();
        let mut attempt = 1;

        loop {
            let outcome = self.fetch_once(&parsed).await;

            let retryable = match &outcome {
                Ok(response) => response.status_error().is_some_and(|err| err.is_transient()),
                Err(err) => err.is_transient(),
            };

            if !retryable || attempt >= max_attempts {
                if retryable {
                    tracing::warn!("[FETCH] Giving up on {} after {} attempts", url, attempt);
                }
                return outcome.map(|mut response| {
                    response.attempts = attempt;
                    response
                });
            }

            match &outcome {
                Ok(response) => tracing::debug!(
                    "[FETCH] HTTP {} from {} (attempt {}/{}), retrying in {:?}",
                    response.status_code,
                    url,
                    attempt,
                    max_attempts,
                    self.config.retry.retry_delay
                ),
                Err(err) => tracing::debug!(
                    "[FETCH] {} (attempt {}/{}), retrying in {:?}",
                    err,
                    attempt,
                    max_attempts,
                    self.config.retry.retry_delay
                ),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("[FETCH] Retry of {} abandoned, crawl cancelled", url);
                    return outcome;
                }
                _ = tokio::time::sleep(self.config.retry.retry_delay) => {}
            }
            attempt += 1;
        }
    }
}

/// Read at most `limit` body bytes, then stop pulling from the connection.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> reqwest::Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            if chunk.len() > room {
                tracing::debug!("[FETCH] Body of {} cut at {} bytes", response.url(), limit);
            }
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn map_reqwest_error(url: &str, error: reqwest::Error, timeout_ms: u64) -> AppError {
    if error.is_timeout() {
        AppError::timeout(url, timeout_ms)
    } else if error.is_redirect() {
        AppError::fetch(url, "too many redirects")
    } else if error.is_connect() {
        AppError::connection(url, format!("connection failed: {}", error))
    } else if error.is_request() {
        // dropped before a response arrived, e.g. connection reset
        AppError::connection(url, error.to_string())
    } else {
        AppError::fetch(url, error.to_string())
    }
}

/// Decode a body using the charset from Content-Type, defaulting to UTF-8.
fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(|ct| {
            ct.split(';')
                .map(str::trim)
                .find_map(|param| param.strip_prefix("charset="))
        })
        .and_then(|label| encoding_rs::Encoding::for_label(label.trim_matches('"').as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::trace!("[FETCH] Body contained invalid {} sequences", encoding.name());
    }
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(retry_count: u32) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_millis(2000),
            retry: RetryPolicy::new(retry_count, 10),
            follow_redirects: true,
            user_agent: "crawlscope-test".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    #[test]
    fn test_decode_body_uses_charset() {
        let latin1 = [0x63, 0x61, 0x66, 0xE9]; // "café" in ISO-8859-1
        assert_eq!(decode_body(&latin1, Some("text/html; charset=ISO-8859-1")), "café");
        assert_eq!(decode_body("café".as_bytes(), Some("text/html")), "café");
        assert_eq!(decode_body("plain".as_bytes(), None), "plain");
    }

    #[tokio::test]
    async fn test_fetch_html_page() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<html><title>Home</title></html>")
            .create_async()
            .await;

        let fetcher = Fetcher::new(fast_config(0)).unwrap();
        let response = fetcher.fetch(&server.url()).await.unwrap();

        assert_eq!(response.status_code, 200);
        assert!(response.is_html());
        assert!(response.body.contains("Home"));
        assert_eq!(response.attempts, 1);
    }

    #[tokio::test]
    async fn test_non_html_body_is_not_read() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/logo.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(vec![0u8, 1, 2, 3])
            .create_async()
            .await;

        let fetcher = Fetcher::new(fast_config(0)).unwrap();
        let response = fetcher
            .fetch(&format!("{}/logo.png", server.url()))
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert!(!response.is_html());
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_exactly_retry_count_times() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let fetcher = Fetcher::new(fast_config(2)).unwrap();
        let response = fetcher
            .fetch(&format!("{}/flaky", server.url()))
            .await
            .unwrap();

        assert_eq!(response.status_code, 503);
        assert_eq!(response.attempts, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gone")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let fetcher = Fetcher::new(fast_config(3)).unwrap();
        let response = fetcher
            .fetch(&format!("{}/gone", server.url()))
            .await
            .unwrap();

        assert_eq!(response.status_code, 404);
        assert!(response.is_error());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unfollowed_redirect_reports_location() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/old")
            .with_status(301)
            .with_header("location", "/new")
            .create_async()
            .await;

        let config = FetcherConfig {
            follow_redirects: false,
            ..fast_config(0)
        };
        let fetcher = Fetcher::new(config).unwrap();
        let response = fetcher
            .fetch(&format!("{}/old", server.url()))
            .await
            .unwrap();

        assert_eq!(response.status_code, 301);
        assert!(response.is_redirect());
        assert_eq!(response.location, Some(format!("{}/new", server.url())));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_terminal_error() {
        // port 9 (discard) on localhost is closed in test environments
        let fetcher = Fetcher::new(fast_config(1)).unwrap();
        let err = fetcher.fetch("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, AppError::Fetch { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_without_request() {
        let fetcher = Fetcher::new(fast_config(1)).unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_redirect_loop_fails_without_retry() {
        let mut server = mockito::Server::new_async().await;
        // one attempt follows at most MAX_REDIRECTS hops; a retry would double that
        let mock = server
            .mock("GET", "/loop")
            .with_status(302)
            .with_header("location", "/loop")
            .expect_at_least(1)
            .expect_at_most(MAX_REDIRECTS + 1)
            .create_async()
            .await;

        let fetcher = Fetcher::new(fast_config(2)).unwrap();
        let err = fetcher
            .fetch(&format!("{}/loop", server.url()))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("too many redirects"));
        assert!(!err.is_transient());
        mock.assert_async().await;
    }

    #[test]
    fn test_error_status_maps_to_http_status_error() {
        let response = FetchResponse {
            status_code: 503,
            final_url: Url::parse("https://example.com/down").unwrap(),
            body: String::new(),
            content_type: None,
            location: None,
            duration: Duration::ZERO,
            attempts: 1,
        };
        let err = response.clone().error_for_status().unwrap_err();
        assert_eq!(err.status_code(), Some(503));
        assert!(err.is_transient());

        let ok = FetchResponse {
            status_code: 301,
            ..response
        };
        assert!(ok.status_error().is_none());
        assert!(ok.error_for_status().is_ok());
    }

    #[tokio::test]
    async fn test_oversized_body_is_truncated() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/huge")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("x".repeat(4096))
            .create_async()
            .await;

        let config = FetcherConfig {
            max_body_bytes: 100,
            ..fast_config(0)
        };
        let fetcher = Fetcher::new(config).unwrap();
        let response = fetcher
            .fetch(&format!("{}/huge", server.url()))
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body.len(), 100);
    }
}
