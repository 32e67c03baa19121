//! Broken-link and redirect detection over a finished crawl.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use url::Url;

use crate::config::AnalysisOptions;
use crate::domain::models::{BrokenLink, CrawlResult, LinkReport, Redirect};
use crate::domain::scope::{canonicalize, is_http};
use crate::error::Result;
use crate::service::http::{FetchResponse, Fetcher, FetcherConfig, PageFetcher};
use crate::service::progress::StepProgress;

/// First place a link target was seen.
#[derive(Debug, Clone)]
struct LinkSource {
    url: String,
    from_page: String,
    link_text: Option<String>,
}

/// Status already known from the crawl.
#[derive(Debug, Clone, Copy)]
enum Known {
    Ok,
    Failed(u16),
}

enum Verdict {
    Fine,
    Broken(BrokenLink),
    Redirect(Redirect),
}

pub struct LinkChecker {
    fetcher: Arc<dyn PageFetcher>,
    concurrency: usize,
    check_external: bool,
}

impl LinkChecker {
    /// Checker with a non-following client, so 3xx answers stay visible.
    pub fn new(options: &AnalysisOptions) -> Result<Self> {
        let fetcher = Fetcher::new(FetcherConfig::for_link_check(options))?;
        Ok(Self::with_fetcher(
            Arc::new(fetcher),
            options.concurrent_requests,
            options.check_external_links,
        ))
    }

    pub fn with_fetcher(
        fetcher: Arc<dyn PageFetcher>,
        concurrency: usize,
        check_external: bool,
    ) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
            check_external,
        }
    }

    /// Check every distinct link target found on the crawled pages.
    ///
    /// Targets the crawl already fetched without a redirect reuse that
    /// status; the rest are requested again. Unreachable hosts are reported
    /// as broken with status 0.
    pub async fn check(&self, crawl: &CrawlResult, progress: &dyn StepProgress) -> LinkReport {
        let sources = self.collect_sources(crawl);
        let known = known_statuses(crawl);
        let total = sources.len();

        tracing::info!("[ANALYSIS] Checking {} distinct links", total);

        let mut report = LinkReport::default();
        let mut to_fetch = Vec::new();

        for source in sources {
            match known.get(source.url.as_str()) {
                Some(Known::Ok) => {
                    report.from_cache += 1;
                }
                Some(Known::Failed(status)) => {
                    report.from_cache += 1;
                    report.broken.push(broken(&source, *status, None));
                }
                None => to_fetch.push(source),
            }
        }

        let mut done = report.from_cache;
        progress.step(done, total);

        let checks = to_fetch.into_iter().map(|source| {
            let fetcher = self.fetcher.clone();
            async move { classify(fetcher.as_ref(), source).await }
        });
        let mut verdicts = stream::iter(checks).buffer_unordered(self.concurrency);

        while let Some(verdict) = verdicts.next().await {
            done += 1;
            match verdict {
                Verdict::Fine => {}
                Verdict::Broken(link) => report.broken.push(link),
                Verdict::Redirect(redirect) => report.redirects.push(redirect),
            }
            progress.step(done, total);
        }

        report.checked = total;
        report.broken.sort_by(|a, b| a.url.cmp(&b.url));
        report.redirects.sort_by(|a, b| a.url.cmp(&b.url));

        tracing::info!(
            "[ANALYSIS] Link check done: {} broken, {} redirects ({} from cache)",
            report.broken.len(),
            report.redirects.len(),
            report.from_cache
        );
        report
    }

    fn collect_sources(&self, crawl: &CrawlResult) -> Vec<LinkSource> {
        let mut seen = HashSet::new();
        let mut sources = Vec::new();

        for record in &crawl.page_records {
            for anchor in &record.anchors {
                if !anchor.is_internal && !self.check_external {
                    continue;
                }
                if seen.insert(anchor.href.clone()) {
                    sources.push(LinkSource {
                        url: anchor.href.clone(),
                        from_page: record.url.clone(),
                        link_text: anchor.text.clone(),
                    });
                }
            }
        }
        sources
    }
}

fn known_statuses(crawl: &CrawlResult) -> HashMap<&str, Known> {
    let mut known = HashMap::new();
    for record in &crawl.page_records {
        // a followed redirect hides the 3xx, so only direct hits count
        let direct = Url::parse(&record.final_url)
            .map(|u| canonicalize(&u) == record.url)
            .unwrap_or(false);
        if direct {
            known.insert(record.url.as_str(), Known::Ok);
        }
    }
    for link in &crawl.broken_links {
        known.insert(link.url.as_str(), Known::Failed(link.status_code));
    }
    known
}

async fn classify(fetcher: &dyn PageFetcher, source: LinkSource) -> Verdict {
    match Url::parse(&source.url) {
        Ok(url) if is_http(&url) => {}
        Ok(url) => {
            tracing::trace!("[ANALYSIS] Not checking {} link {}", url.scheme(), source.url);
            return Verdict::Fine;
        }
        Err(e) => {
            return Verdict::Broken(broken(&source, 0, Some(format!("invalid URL: {}", e))));
        }
    }

    match fetcher
        .fetch(&source.url)
        .await
        .and_then(FetchResponse::error_for_status)
    {
        Ok(response) if response.is_redirect() => Verdict::Redirect(Redirect {
            url: source.url,
            redirects_to: response.location.unwrap_or_default(),
            status_code: response.status_code,
            from_page: Some(source.from_page),
        }),
        Ok(_) => Verdict::Fine,
        Err(e) => {
            tracing::debug!("[ANALYSIS] Broken link {}: {}", source.url, e);
            Verdict::Broken(broken(&source, e.status_code().unwrap_or(0), Some(e.to_string())))
        }
    }
}

fn broken(source: &LinkSource, status_code: u16, reason: Option<String>) -> BrokenLink {
    BrokenLink {
        url: source.url.clone(),
        status_code,
        from_page: Some(source.from_page.clone()),
        link_text: source.link_text.clone(),
        reason,
    }
}
