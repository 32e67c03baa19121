//! Error types for the crawl and analysis engine.
//!
//! This module provides structured error handling with:
//! - `AppError`: Domain-specific errors for crawl, analysis and export operations
//! - `Result<T>`: Type alias for Results using AppError
//!
//! Only target-level failures ever leave `start_crawl` as an error. Per-URL
//! problems are folded into the crawl result as broken links or skipped pages.

use thiserror::Error;

// ============================================================================
// DOMAIN ERROR TYPE
// ============================================================================

/// Domain-specific errors for engine operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// The crawl target cannot be parsed or has no usable host
    #[error("Invalid crawl target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Invalid or malformed URL found on a page
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Network request failed. `transient` marks timeouts and dropped
    /// connections, the failures a retry can fix.
    #[error("Fetch failed for {url}: {reason}")]
    Fetch {
        url: String,
        reason: String,
        transient: bool,
    },

    /// Server answered with an error status
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Failed to parse HTML or XML content
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rejected configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to render or write an export
    #[error("Export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Create an invalid target error
    pub fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a final fetch error (bad redirect chain, undecodable body)
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.into(),
            transient: false,
        }
    }

    /// Create a retryable fetch error (refused or reset connection)
    pub fn connection(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.into(),
            transient: true,
        }
    }

    /// Create a fetch error caused by the per-request deadline
    pub fn timeout(url: impl Into<String>, after_ms: u64) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: format!("timed out after {}ms", after_ms),
            transient: true,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    /// Whether a retry has a chance of succeeding.
    ///
    /// Timeouts, connection failures and 5xx answers are transient; 4xx
    /// answers, redirect loops and everything else are final.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Fetch { transient, .. } => *transient,
            AppError::HttpStatus { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }

    /// Status code carried by the error, if the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AppError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;
