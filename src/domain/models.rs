//! Crawl and analysis entities.
//!
//! Everything here is a plain value: page records are built once by the worker
//! that fetched the page and never mutated afterwards, and every analysis
//! result is a read-only snapshot derived from a finished `CrawlResult`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ====== Enums ======

/// Scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlState {
    Idle,
    Starting,
    Crawling,
    Completed,
    Failed,
    Cancelled,
}

impl CrawlState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlState::Idle => "idle",
            CrawlState::Starting => "starting",
            CrawlState::Crawling => "crawling",
            CrawlState::Completed => "completed",
            CrawlState::Failed => "failed",
            CrawlState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CrawlState::Completed | CrawlState::Failed | CrawlState::Cancelled
        )
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CrawlState::Starting,
            2 => CrawlState::Crawling,
            3 => CrawlState::Completed,
            4 => CrawlState::Failed,
            5 => CrawlState::Cancelled,
            _ => CrawlState::Idle,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            CrawlState::Idle => 0,
            CrawlState::Starting => 1,
            CrawlState::Crawling => 2,
            CrawlState::Completed => 3,
            CrawlState::Failed => 4,
            CrawlState::Cancelled => 5,
        }
    }
}

/// How a crawl ended. Budget exhaustion is a normal completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CrawlOutcome {
    Completed,
    Cancelled,
    Failed { reason: String },
}

impl CrawlOutcome {
    pub fn state(&self) -> CrawlState {
        match self {
            CrawlOutcome::Completed => CrawlState::Completed,
            CrawlOutcome::Cancelled => CrawlState::Cancelled,
            CrawlOutcome::Failed { .. } => CrawlState::Failed,
        }
    }
}

/// Which budget stopped discovery early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BudgetKind {
    MaxPages,
    MaxDuration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    Found(String),
    Unauthorized(String),
    NotFound,
}

impl ResourceStatus {
    pub fn exists(&self) -> bool {
        matches!(
            self,
            ResourceStatus::Found(_) | ResourceStatus::Unauthorized(_)
        )
    }
}

// ====== Frontier ======

/// A discovered URL waiting to be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: usize,
    pub source_url: Option<String>,
    pub link_text: Option<String>,
}

impl FrontierEntry {
    pub fn seed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            source_url: None,
            link_text: None,
        }
    }
}

/// Progress snapshot handed to reporters after every fetch completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlProgress {
    pub scanned: usize,
    pub estimated_total: usize,
    pub current_url: String,
}

// ====== Page elements ======

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headings {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
}

impl Headings {
    pub fn is_empty(&self) -> bool {
        self.h1.is_empty() && self.h2.is_empty() && self.h3.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    pub internal: Vec<String>,
    pub external: Vec<String>,
}

/// One anchor as it appeared on a page, resolved to an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRef {
    pub href: String,
    pub text: Option<String>,
    pub is_internal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTags {
    pub title: Option<String>,
    pub description: Option<String>,
    pub canonical: Option<String>,
    pub robots: Option<String>,
}

// ====== Rich entity: PageRecord ======

/// Structured result of fetching and parsing one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub url: String,
    pub status_code: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub depth: usize,
    pub title: Option<String>,
    pub headings: Headings,
    pub links: PageLinks,
    /// Every anchor in document order, with its visible text
    pub anchors: Vec<LinkRef>,
    pub images: Vec<ImageRef>,
    pub meta: MetaTags,
    /// Visible body text, whitespace-collapsed
    pub text: String,
    pub word_count: usize,
    pub content_hash: String,
    pub content_length: usize,
    pub fetch_duration_ms: u64,
    pub extracted_at: DateTime<Utc>,
}

impl PageRecord {
    /// Whether the page was parsed as HTML (assets are recorded, not parsed).
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(is_html_content_type)
            .unwrap_or(true)
    }

    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    /// Helper for testing: a parsed HTML page with the given body text.
    #[cfg(test)]
    pub fn test_instance(url: &str, text: &str) -> Self {
        let text = crate::extractor::page_extractor::collapse_whitespace(text);
        Self {
            url: url.to_string(),
            status_code: 200,
            final_url: url.to_string(),
            content_type: Some("text/html".to_string()),
            depth: 0,
            title: None,
            headings: Headings::default(),
            links: PageLinks::default(),
            anchors: Vec::new(),
            images: Vec::new(),
            meta: MetaTags::default(),
            word_count: text.split_whitespace().count(),
            content_hash: crate::extractor::page_extractor::content_hash(&text),
            content_length: text.len(),
            text,
            fetch_duration_ms: 5,
            extracted_at: Utc::now(),
        }
    }
}

pub fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

// ====== Crawl result ======

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    pub url: String,
    /// 0 when the host never answered
    pub status_code: u16,
    pub from_page: Option<String>,
    pub link_text: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub url: String,
    pub redirects_to: String,
    pub status_code: u16,
    pub from_page: Option<String>,
}

/// Aggregate output of one crawl, produced exactly once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub domain: String,
    pub start_url: String,
    /// Canonical URLs that answered with a status below 400
    pub urls: Vec<String>,
    pub page_count: usize,
    pub page_records: Vec<PageRecord>,
    /// Off-scope links that were seen but not fetched
    pub external_urls: Vec<String>,
    pub broken_links: Vec<BrokenLink>,
    pub outcome: CrawlOutcome,
    pub budget_exhausted: Option<BudgetKind>,
    pub max_depth_reached: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CrawlResult {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, CrawlOutcome::Cancelled)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            CrawlOutcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    /// True when the crawl finished clean with full coverage of its budget.
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, CrawlOutcome::Completed)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn record(&self, url: &str) -> Option<&PageRecord> {
        self.page_records.iter().find(|p| p.url == url)
    }
}

// ====== Analysis results ======

/// Outcome of the broken-link and redirect pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReport {
    pub broken: Vec<BrokenLink>,
    pub redirects: Vec<Redirect>,
    pub checked: usize,
    pub from_cache: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatePage {
    pub title: Option<String>,
    pub content_length: usize,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaTagKind {
    Title,
    Description,
}

impl MetaTagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaTagKind::Title => "title",
            MetaTagKind::Description => "description",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMetaTag {
    pub tag: MetaTagKind,
    pub value: String,
    pub pages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub url: String,
    pub word_count: usize,
    pub content_hash: String,
    pub max_similarity: f64,
    pub most_similar_to: Option<String>,
    pub is_unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarPage {
    pub url: String,
    pub duplicate_of: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentAnalysisResult {
    /// 100 × unique / total, over the pages that had text
    pub overall_uniqueness: f64,
    pub unique_pages: usize,
    pub total_pages: usize,
    pub page_contents: Vec<PageContent>,
    pub duplicate_pages: Vec<SimilarPage>,
    pub skipped_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageNode {
    pub url: String,
    pub page_rank: f64,
    pub incoming_links: usize,
    pub outgoing_links: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStructure {
    pub nodes: Vec<PageNode>,
    pub links: Vec<LinkEdge>,
    pub iterations: usize,
    pub converged: bool,
    pub skipped_pages: usize,
}

impl SiteStructure {
    pub fn node(&self, url: &str) -> Option<&PageNode> {
        self.nodes.iter().find(|n| n.url == url)
    }
}

/// Site-level resource check results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteResources {
    pub robots_txt: ResourceStatus,
    pub sitemap_xml: ResourceStatus,
    pub sitemap_url_count: usize,
    /// Listed in the site's own sitemap but never reached by the crawl
    pub unreached_sitemap_urls: Vec<String>,
    pub ssl: bool,
}

// ====== Extraction ======

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPage {
    pub url: String,
    pub reason: String,
}

/// Aggregate document assembled by the content extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSite {
    pub domain: String,
    pub extracted_at: DateTime<Utc>,
    pub page_count: usize,
    pub pages: Vec<PageRecord>,
    pub skipped: Vec<SkippedPage>,
}
