//! Content extraction pipeline: one structured record per URL, assembled
//! into an `ExtractedSite`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::config::ExtractionOptions;
use crate::domain::models::{CrawlResult, ExtractedSite, PageRecord, SkippedPage};
use crate::error::Result;
use crate::extractor::{PageExtract, PageExtractor};
use crate::service::http::{FetchResponse, Fetcher, FetcherConfig, PageFetcher};
use crate::service::progress::StepProgress;

/// Build the record for one fetched URL. `extract` is `None` for non-HTML
/// or empty bodies, which leaves the parsed fields empty.
pub(crate) fn page_record(
    url: &str,
    depth: usize,
    response: &FetchResponse,
    extract: Option<PageExtract>,
) -> PageRecord {
    let extract = extract.unwrap_or_default();
    PageRecord {
        url: url.to_string(),
        status_code: response.status_code,
        final_url: response.final_url.to_string(),
        content_type: response.content_type.clone(),
        depth,
        word_count: extract.word_count(),
        content_hash: extract.content_hash(),
        title: extract.title,
        headings: extract.headings,
        links: extract.links,
        anchors: extract.anchors,
        images: extract.images,
        meta: extract.meta,
        text: extract.text,
        content_length: response.body.len(),
        fetch_duration_ms: response.duration.as_millis() as u64,
        extracted_at: Utc::now(),
    }
}

pub struct SiteExtractor {
    fetcher: Arc<dyn PageFetcher>,
    concurrency: usize,
}

impl SiteExtractor {
    pub fn new(options: &ExtractionOptions) -> Result<Self> {
        let fetcher = Fetcher::new(FetcherConfig::for_extraction(options))?;
        Ok(Self::with_fetcher(Arc::new(fetcher), options.concurrent_requests))
    }

    pub fn with_fetcher(fetcher: Arc<dyn PageFetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Extract every URL, reusing page records from `cache` where the crawl
    /// already parsed them. Pages keep the order of `urls`; failures are
    /// logged and listed in `skipped`.
    pub async fn extract_site(
        &self,
        urls: &[String],
        domain: &str,
        cache: Option<&CrawlResult>,
        progress: &dyn StepProgress,
    ) -> ExtractedSite {
        let cached: HashMap<&str, &PageRecord> = cache
            .map(|result| {
                result
                    .page_records
                    .iter()
                    .filter(|record| record.is_html())
                    .map(|record| (record.url.as_str(), record))
                    .collect()
            })
            .unwrap_or_default();

        let total = urls.len();
        tracing::info!(
            "[EXTRACT] Extracting {} pages for {} ({} cached)",
            total,
            domain,
            urls.iter().filter(|u| cached.contains_key(u.as_str())).count()
        );

        let fetches = urls.iter().map(|url| {
            let hit = cached.get(url.as_str()).map(|record| (*record).clone());
            let fetcher = self.fetcher.clone();
            async move {
                match hit {
                    Some(record) => Ok(record),
                    None => Self::extract_page(fetcher.as_ref(), url).await,
                }
            }
        });

        let mut pages = Vec::with_capacity(total);
        let mut skipped = Vec::new();
        let mut done = 0;

        // `buffered` keeps input order while running `concurrency` at once
        let mut results = stream::iter(fetches).buffered(self.concurrency);
        while let Some(result) = results.next().await {
            done += 1;
            match result {
                Ok(record) => pages.push(record),
                Err(skip) => {
                    tracing::warn!("[EXTRACT] Skipping {}: {}", skip.url, skip.reason);
                    skipped.push(skip);
                }
            }
            progress.step(done, total);
        }

        tracing::info!(
            "[EXTRACT] Extracted {} pages, skipped {}",
            pages.len(),
            skipped.len()
        );

        ExtractedSite {
            domain: domain.to_string(),
            extracted_at: Utc::now(),
            page_count: pages.len(),
            pages,
            skipped,
        }
    }

    async fn extract_page(
        fetcher: &dyn PageFetcher,
        url: &str,
    ) -> std::result::Result<PageRecord, SkippedPage> {
        let skip = |reason: String| SkippedPage {
            url: url.to_string(),
            reason,
        };

        let response = fetcher
            .fetch(url)
            .await
            .and_then(FetchResponse::error_for_status)
            .map_err(|e| skip(e.to_string()))?;
        if !response.is_html() {
            return Err(skip(format!(
                "not HTML ({})",
                response.content_type.as_deref().unwrap_or("unknown")
            )));
        }

        let extract = PageExtractor::extract(&response.body, &response.final_url);
        tracing::debug!(
            "[EXTRACT] {} -> {} words, {} links",
            url,
            extract.word_count(),
            extract.anchors.len()
        );
        Ok(page_record(url, 0, &response, Some(extract)))
    }
}
