//! Progress reporting for crawls and analysis passes.

use tokio::sync::mpsc;

use crate::domain::models::CrawlProgress;

/// Receives crawl progress. Implementations must be cheap; the scheduler
/// calls this inline after every completed fetch.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: CrawlProgress);
}

impl<F> ProgressReporter for F
where
    F: Fn(CrawlProgress) + Send + Sync,
{
    fn report(&self, progress: CrawlProgress) {
        self(progress)
    }
}

pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _progress: CrawlProgress) {}
}

/// Forwards progress into an unbounded channel consumed by the caller.
pub struct ChannelReporter {
    sender: mpsc::UnboundedSender<CrawlProgress>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CrawlProgress>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, progress: CrawlProgress) {
        if self.sender.send(progress).is_err() {
            tracing::trace!("[CRAWL] Progress receiver dropped");
        }
    }
}

/// `(current, total)` callback used by the analysis passes.
pub trait StepProgress: Send + Sync {
    fn step(&self, current: usize, total: usize);
}

impl<F> StepProgress for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn step(&self, current: usize, total: usize) {
        self(current, total)
    }
}

/// No-op `(current, total)` callback.
pub fn no_steps(_current: usize, _total: usize) {}
