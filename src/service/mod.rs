pub mod analysis;
pub mod canceler;
pub mod crawler;
pub mod extraction;
pub mod http;
pub mod progress;

pub use canceler::CrawlCanceler;
pub use crawler::{crawl_site, start_crawl, CrawlSession, Crawler};
pub use extraction::SiteExtractor;
pub use http::{FetchResponse, Fetcher, FetcherConfig, PageFetcher, RetryPolicy};
pub use progress::{ChannelReporter, NoopReporter, ProgressReporter, StepProgress};
