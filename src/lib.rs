// src/lib.rs

pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod extractor;
pub mod lifecycle;
pub mod service;

pub use config::{AnalysisOptions, CrawlOptions, ExtractionOptions};
pub use domain::models::{CrawlOutcome, CrawlProgress, CrawlResult, CrawlState, PageRecord};
pub use domain::CrawlTarget;
pub use error::{AppError, Result};
pub use service::{crawl_site, start_crawl, CrawlSession};
