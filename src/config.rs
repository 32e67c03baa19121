//! Typed option sets for crawling, analysis and extraction.
//!
//! Option bags arrive as loose JSON from callers, so every struct here is
//! deserialized with `deny_unknown_fields`: a misspelled key is a
//! construction error instead of a silently ignored setting.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const DEFAULT_USER_AGENT: &str = concat!("crawlscope/", env!("CARGO_PKG_VERSION"));

/// Crawl configuration. All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct CrawlOptions {
    /// Hard cap on distinct in-scope URLs admitted to the crawl (seed included)
    pub max_pages: usize,
    /// BFS depth cap; the seed is depth 0
    pub max_depth: usize,
    /// Fetch off-origin links instead of only recording them
    pub follow_external_links: bool,
    /// Treat subdomains of the target host as in scope
    pub include_subdomains: bool,
    /// Number of fetches allowed in flight at once
    pub concurrent_requests: usize,
    /// Pause after each fetch, per worker
    pub request_delay: u64,
    pub retry_count: u32,
    pub retry_delay: u64,
    /// Per-request deadline
    pub timeout: u64,
    /// Follow `<link rel="stylesheet">` assets for discovery
    pub include_stylesheet: bool,
    /// Optional global wall-clock budget for the whole crawl
    pub max_duration: Option<u64>,
    pub user_agent: String,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 100,
            max_depth: 3,
            follow_external_links: false,
            include_subdomains: false,
            concurrent_requests: 5,
            request_delay: 0,
            retry_count: 2,
            retry_delay: 1000,
            timeout: 10_000,
            include_stylesheet: false,
            max_duration: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlOptions {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(raw)
            .map_err(|e| AppError::config(format!("invalid crawl options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            return Err(AppError::config("maxPages must be at least 1"));
        }
        if self.concurrent_requests == 0 {
            return Err(AppError::config("concurrentRequests must be at least 1"));
        }
        if self.timeout == 0 {
            return Err(AppError::config("timeout must be greater than 0"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration.map(Duration::from_millis)
    }
}

/// Tunables for the analysis suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    /// A page is unique when its best match elsewhere scores below this
    pub similarity_threshold: f64,
    /// Words per shingle
    pub shingle_size: usize,
    pub damping_factor: f64,
    pub max_iterations: usize,
    pub epsilon: f64,
    pub check_external_links: bool,
    pub concurrent_requests: usize,
    pub timeout: u64,
    pub retry_count: u32,
    pub retry_delay: u64,
    /// Above this many pages, uniqueness candidates come from MinHash/LSH
    pub exact_comparison_limit: usize,
    pub user_agent: String,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            shingle_size: 3,
            damping_factor: 0.85,
            max_iterations: 50,
            epsilon: 1e-6,
            check_external_links: true,
            concurrent_requests: 10,
            timeout: 10_000,
            retry_count: 1,
            retry_delay: 500,
            exact_comparison_limit: 300,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl AnalysisOptions {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(raw)
            .map_err(|e| AppError::config(format!("invalid analysis options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(AppError::config("similarityThreshold must be within 0..=1"));
        }
        if !(0.0..1.0).contains(&self.damping_factor) {
            return Err(AppError::config("dampingFactor must be within 0..1"));
        }
        if self.shingle_size == 0 {
            return Err(AppError::config("shingleSize must be at least 1"));
        }
        if self.concurrent_requests == 0 {
            return Err(AppError::config("concurrentRequests must be at least 1"));
        }
        Ok(())
    }
}

/// Settings for the content extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct ExtractionOptions {
    pub concurrent_requests: usize,
    pub timeout: u64,
    pub retry_count: u32,
    pub retry_delay: u64,
    pub user_agent: String,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            concurrent_requests: 3,
            timeout: 15_000,
            retry_count: 1,
            retry_delay: 500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
