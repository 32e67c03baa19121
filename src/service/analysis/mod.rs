//! Site analysis suite.
//!
//! Every pass works on a finished `CrawlResult` and reports `(current, total)`
//! progress. A page that failed to fetch or parse is left out of the pass
//! that needed it; no pass aborts because of a single page.

pub mod broken_links;
pub mod duplicates;
pub mod resources;
pub mod structure;
pub mod uniqueness;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisOptions;
use crate::domain::models::{
    ContentAnalysisResult, CrawlResult, DuplicateMetaTag, DuplicatePage, LinkReport,
    ResourceStatus, SiteResources, SiteStructure,
};
use crate::error::Result;
use crate::service::progress::StepProgress;

pub use broken_links::LinkChecker;
pub use duplicates::{find_duplicate_meta, find_duplicate_pages};
pub use resources::ResourceChecker;
pub use structure::analyze_structure;
pub use uniqueness::analyze_uniqueness;

/// Pass names reported to [`analyze_site`]'s progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Links,
    Duplicates,
    Uniqueness,
    Structure,
    Resources,
}

impl AnalysisStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStage::Links => "links",
            AnalysisStage::Duplicates => "duplicates",
            AnalysisStage::Uniqueness => "uniqueness",
            AnalysisStage::Structure => "structure",
            AnalysisStage::Resources => "resources",
        }
    }
}

/// Every analysis over one crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteReport {
    pub domain: String,
    pub links: LinkReport,
    pub duplicate_pages: Vec<DuplicatePage>,
    pub duplicate_meta: Vec<DuplicateMetaTag>,
    pub content: ContentAnalysisResult,
    pub structure: SiteStructure,
    pub resources: SiteResources,
}

impl SiteReport {
    /// Whether anything a site owner should fix was found.
    pub fn has_issues(&self) -> bool {
        !self.links.broken.is_empty()
            || !self.duplicate_pages.is_empty()
            || !self.duplicate_meta.is_empty()
    }
}

/// Run all passes in sequence. `progress` receives the stage with each
/// `(current, total)` step.
pub async fn analyze_site<F>(
    crawl: &CrawlResult,
    options: &AnalysisOptions,
    progress: F,
) -> Result<SiteReport>
where
    F: Fn(AnalysisStage, usize, usize) + Send + Sync,
{
    options.validate()?;
    let records = &crawl.page_records;
    let progress = &progress;
    let stage = |kind: AnalysisStage| {
        move |current: usize, total: usize| progress(kind, current, total)
    };

    tracing::info!("[ANALYSIS] Analysing {} pages of {}", records.len(), crawl.domain);

    let links = LinkChecker::new(options)?
        .check(crawl, &stage(AnalysisStage::Links))
        .await;
    let duplicate_pages = find_duplicate_pages(records, &stage(AnalysisStage::Duplicates));
    let duplicate_meta = find_duplicate_meta(records, &stage(AnalysisStage::Duplicates));
    let content = analyze_uniqueness(records, options, &stage(AnalysisStage::Uniqueness));
    let structure = analyze_structure(records, options, &stage(AnalysisStage::Structure));

    let resources_stage = stage(AnalysisStage::Resources);
    let resources = match url::Url::parse(&crawl.start_url) {
        Ok(base) => {
            let resources = ResourceChecker::new(options)?.check_site(&base, Some(crawl)).await;
            resources_stage.step(1, 1);
            resources
        }
        Err(e) => {
            tracing::warn!("[ANALYSIS] Skipping resource check, bad start URL: {}", e);
            SiteResources {
                robots_txt: ResourceStatus::NotFound,
                sitemap_xml: ResourceStatus::NotFound,
                sitemap_url_count: 0,
                unreached_sitemap_urls: Vec::new(),
                ssl: false,
            }
        }
    };

    Ok(SiteReport {
        domain: crawl.domain.clone(),
        links,
        duplicate_pages,
        duplicate_meta,
        content,
        structure,
        resources,
    })
}
