//! Crawl orchestration: frontier, scheduler and the session handle callers
//! hold while a crawl runs.

pub mod frontier;
pub mod scheduler;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::CrawlOptions;
use crate::domain::models::{CrawlResult, CrawlState};
use crate::domain::scope::CrawlTarget;
use crate::error::{AppError, Result};
use crate::service::canceler::CrawlCanceler;
use crate::service::http::{Fetcher, FetcherConfig};
use crate::service::progress::ProgressReporter;

pub use frontier::{Frontier, VisitedSet};
pub use scheduler::Crawler;

/// A running crawl. Owned by the caller; independent of any other session.
pub struct CrawlSession {
    id: Uuid,
    target: CrawlTarget,
    canceler: CrawlCanceler,
    state: Arc<AtomicU8>,
    handle: JoinHandle<CrawlResult>,
}

impl CrawlSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &CrawlTarget {
        &self.target
    }

    /// Stop dequeuing new URLs. In-flight fetches finish, then `wait()`
    /// yields the partial result. No effect once the crawl has finished.
    pub fn cancel(&self) {
        if self.canceler.cancel() {
            tracing::info!("[CRAWL] Session {} cancelled", self.id);
        }
    }

    pub fn state(&self) -> CrawlState {
        CrawlState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Handle that can cancel this session from elsewhere (signal handlers,
    /// other tasks).
    pub fn canceler(&self) -> CrawlCanceler {
        self.canceler.clone()
    }

    pub async fn wait(self) -> Result<CrawlResult> {
        self.handle
            .await
            .map_err(|e| AppError::Other(anyhow::anyhow!("crawl task aborted: {}", e)))
    }
}

/// Validate the target and options, then start crawling in the background.
///
/// Only an unparseable target or invalid options are errors; everything
/// that goes wrong after this point is reported inside the `CrawlResult`.
pub fn start_crawl<R>(target: &str, options: CrawlOptions, reporter: R) -> Result<CrawlSession>
where
    R: ProgressReporter + 'static,
{
    let target = CrawlTarget::parse(target)?;
    options.validate()?;

    let canceler = CrawlCanceler::new();
    let fetcher = Fetcher::with_cancellation(FetcherConfig::for_crawl(&options), canceler.token())?;
    let crawler = Crawler::new(target.clone(), options, Arc::new(fetcher)).with_canceler(canceler.clone());
    let state = crawler.state_handle();
    state.store(CrawlState::Starting.as_u8(), Ordering::Release);

    let id = Uuid::new_v4();
    tracing::debug!("[CRAWL] Session {} for {}", id, target.origin());

    let handle = tokio::spawn(async move { crawler.crawl(&reporter).await });

    Ok(CrawlSession {
        id,
        target,
        canceler,
        state,
        handle,
    })
}

/// Start a crawl and wait for it to finish.
pub async fn crawl_site<R>(target: &str, options: CrawlOptions, reporter: R) -> Result<CrawlResult>
where
    R: ProgressReporter + 'static,
{
    start_crawl(target, options, reporter)?.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::progress::NoopReporter;

    #[tokio::test]
    async fn test_invalid_target_is_an_error() {
        let err = start_crawl("ftp://example.com", CrawlOptions::default(), NoopReporter)
            .err()
            .unwrap();
        assert!(matches!(err, AppError::InvalidTarget { .. }));
    }

    #[tokio::test]
    async fn test_invalid_options_are_an_error() {
        let options = CrawlOptions {
            max_pages: 0,
            ..Default::default()
        };
        let err = start_crawl("example.com", options, NoopReporter).err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_session_runs_to_terminal_state() {
        let mut server = mockito::Server::new_async().await;
        let _home = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body><h1>Home</h1></body></html>")
            .create_async()
            .await;

        let session = start_crawl(&server.url(), CrawlOptions::default(), NoopReporter).unwrap();
        assert!(!session.state().is_terminal() || session.state() == CrawlState::Completed);

        let canceler = session.canceler();
        let result = session.wait().await.unwrap();

        assert!(result.is_complete());
        assert_eq!(result.urls.len(), 1);
        // cancelling after completion does nothing
        assert!(!canceler.cancel());
    }
}
