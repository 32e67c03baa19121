use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Cancellation handle shared by a crawl's scheduler, fetcher and caller.
///
/// Clones observe the same signal. Cancelling more than once, or after the
/// crawl finished, has no effect.
#[derive(Clone, Debug, Default)]
pub struct CrawlCanceler {
    token: CancellationToken,
    finished: Arc<AtomicBool>,
}

impl CrawlCanceler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` only for the call that actually
    /// flipped a running crawl into cancelling.
    pub fn cancel(&self) -> bool {
        if self.finished.load(Ordering::Acquire) || self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Token handed to the fetcher so retry waits stop early.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Mark the crawl as finished; later `cancel()` calls become no-ops.
    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }
}
