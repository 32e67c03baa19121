//! Breadth-first crawl scheduler.
//!
//! A single orchestrator loop owns the frontier, the visited set and the
//! result accumulator. Fetch workers run as tasks in a `JoinSet` bounded by
//! `concurrent_requests`; each worker fetches, parses and paces itself, then
//! hands its result back by value. Only the orchestrator admits URLs and
//! reports progress, so `scanned` never goes backwards.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::task::{Id, JoinSet};
use url::Url;

use super::frontier::{Frontier, VisitedSet};
use crate::config::CrawlOptions;
use crate::domain::models::{
    BrokenLink, BudgetKind, CrawlOutcome, CrawlProgress, CrawlResult, CrawlState, FrontierEntry,
    PageRecord,
};
use crate::domain::scope::{is_http, CrawlTarget};
use crate::extractor::{PageExtract, PageExtractor};
use crate::service::canceler::CrawlCanceler;
use crate::service::extraction::page_record;
use crate::service::http::{FetchResponse, PageFetcher};
use crate::service::progress::ProgressReporter;

/// Result of one worker task.
struct FetchedEntry {
    entry: FrontierEntry,
    outcome: crate::error::Result<FetchResponse>,
    extract: Option<PageExtract>,
}

pub struct Crawler {
    target: CrawlTarget,
    options: CrawlOptions,
    fetcher: Arc<dyn PageFetcher>,
    canceler: CrawlCanceler,
    state: Arc<AtomicU8>,
}

impl Crawler {
    pub fn new(target: CrawlTarget, options: CrawlOptions, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            target,
            options,
            fetcher,
            canceler: CrawlCanceler::new(),
            state: Arc::new(AtomicU8::new(CrawlState::Idle.as_u8())),
        }
    }

    /// Share an existing cancellation handle (e.g. the fetcher's).
    pub fn with_canceler(mut self, canceler: CrawlCanceler) -> Self {
        self.canceler = canceler;
        self
    }

    pub fn canceler(&self) -> CrawlCanceler {
        self.canceler.clone()
    }

    pub fn state(&self) -> CrawlState {
        CrawlState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn state_handle(&self) -> Arc<AtomicU8> {
        self.state.clone()
    }

    pub fn target(&self) -> &CrawlTarget {
        &self.target
    }

    fn set_state(&self, state: CrawlState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Run the crawl to a terminal state. Always returns a result; per-URL
    /// failures are recorded in it rather than propagated.
    pub async fn crawl(&self, reporter: &dyn ProgressReporter) -> CrawlResult {
        self.set_state(CrawlState::Starting);
        let started_at = Utc::now();
        let clock = Instant::now();
        let seed = self.target.canonical_start();

        tracing::info!(
            "[CRAWL] Starting crawl of {} (maxPages={}, maxDepth={}, workers={})",
            seed,
            self.options.max_pages,
            self.options.max_depth,
            self.options.concurrent_requests
        );

        let visited = VisitedSet::new();
        let mut frontier = Frontier::new();
        visited.insert(&seed);
        frontier.push(FrontierEntry::seed(seed.clone()));

        let mut acc = Accumulator::default();
        let mut in_flight: JoinSet<FetchedEntry> = JoinSet::new();
        let mut running: HashMap<Id, FrontierEntry> = HashMap::new();
        let mut scanned = 0usize;
        let mut halted = false;

        self.set_state(CrawlState::Crawling);

        loop {
            // top up workers
            while !halted && in_flight.len() < self.options.concurrent_requests {
                if self.canceler.is_cancelled() {
                    tracing::info!(
                        "[CRAWL] Cancellation requested, draining {} in-flight fetches",
                        in_flight.len()
                    );
                    acc.cancelled = true;
                    halted = true;
                    break;
                }
                if let Some(limit) = self.options.max_duration() {
                    if clock.elapsed() >= limit {
                        tracing::info!("[CRAWL] Time budget of {:?} reached", limit);
                        acc.budget_exhausted = Some(BudgetKind::MaxDuration);
                        halted = true;
                        break;
                    }
                }
                let Some(entry) = frontier.pop() else {
                    break;
                };
                let id = self.spawn_fetch(&mut in_flight, entry.clone());
                running.insert(id, entry);
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };

            scanned += 1;
            let current_url = match joined {
                Ok((id, fetched)) => {
                    running.remove(&id);
                    let url = fetched.entry.url.clone();
                    self.absorb(fetched, &visited, &mut frontier, &mut acc);
                    url
                }
                Err(e) => {
                    tracing::error!("[CRAWL] Fetch task failed: {}", e);
                    let Some(entry) = running.remove(&e.id()) else {
                        continue;
                    };
                    acc.broken(&entry, 0, format!("fetch task failed: {}", e));
                    entry.url
                }
            };

            // once nothing is left to fetch the total is exact
            let drained = in_flight.is_empty() && (halted || frontier.is_empty());
            let estimated_total = if drained {
                scanned
            } else {
                self.options.max_pages.max(visited.len())
            };
            reporter.report(CrawlProgress {
                scanned,
                estimated_total,
                current_url,
            });
        }

        let outcome = if acc.cancelled {
            CrawlOutcome::Cancelled
        } else if let Some(reason) = acc.seed_failure.take() {
            CrawlOutcome::Failed { reason }
        } else {
            CrawlOutcome::Completed
        };

        self.canceler.mark_finished();
        self.set_state(outcome.state());

        let result = CrawlResult {
            domain: self.target.host().to_string(),
            start_url: seed,
            page_count: acc.urls.len(),
            urls: acc.urls,
            page_records: acc.records,
            external_urls: acc.external_urls,
            broken_links: acc.broken_links,
            outcome,
            budget_exhausted: acc.budget_exhausted,
            max_depth_reached: acc.max_depth_reached,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            "[CRAWL] Crawl {} after {}ms: {} pages, {} broken, {} external",
            result.outcome.state().as_str(),
            result.duration_ms(),
            result.page_count,
            result.broken_links.len(),
            result.external_urls.len()
        );
        result
    }

    fn spawn_fetch(&self, in_flight: &mut JoinSet<FetchedEntry>, entry: FrontierEntry) -> Id {
        let fetcher = self.fetcher.clone();
        let canceler = self.canceler.clone();
        let target = self.target.clone();
        let include_subdomains = self.options.include_subdomains;
        let delay = self.options.request_delay();

        tracing::debug!("[CRAWL] Fetching {} (depth {})", entry.url, entry.depth);

        let handle = in_flight.spawn(async move {
            let outcome = fetcher.fetch(&entry.url).await;

            let extract = match &outcome {
                Ok(response)
                    if !response.is_error() && response.is_html() && !response.body.is_empty() =>
                {
                    Some(PageExtractor::extract_with_scope(
                        &response.body,
                        &response.final_url,
                        |url| target.is_internal(url, include_subdomains),
                    ))
                }
                _ => None,
            };

            // per-worker pacing, cut short by cancellation
            if !delay.is_zero() {
                tokio::select! {
                    _ = canceler.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            FetchedEntry {
                entry,
                outcome,
                extract,
            }
        });
        handle.id()
    }

    /// Fold one worker result into the crawl state and admit its links.
    fn absorb(
        &self,
        fetched: FetchedEntry,
        visited: &VisitedSet,
        frontier: &mut Frontier,
        acc: &mut Accumulator,
    ) {
        let FetchedEntry {
            entry,
            outcome,
            extract,
        } = fetched;
        let is_seed = entry.depth == 0 && entry.source_url.is_none();

        let response = match outcome.and_then(FetchResponse::error_for_status) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("[CRAWL] Failed to fetch {}: {}", entry.url, e);
                if is_seed {
                    acc.seed_failure = Some(format!("start URL failed: {}", e));
                }
                acc.broken(&entry, e.status_code().unwrap_or(0), e.to_string());
                return;
            }
        };

        acc.urls.push(entry.url.clone());
        acc.max_depth_reached = acc.max_depth_reached.max(entry.depth);

        let candidates = extract.as_ref().map(|page| self.candidates(page)).unwrap_or_default();
        let record = page_record(&entry.url, entry.depth, &response, extract);

        for external in &record.links.external {
            if acc.seen_external.insert(external.clone()) {
                acc.external_urls.push(external.clone());
            }
        }

        let next_depth = entry.depth + 1;
        if next_depth > self.options.max_depth {
            tracing::trace!("[CRAWL] Depth limit reached at {}", entry.url);
        } else {
            let mut admitted = 0;
            for (url, link_text) in candidates {
                if visited.contains(&url) {
                    continue;
                }
                if visited.len() >= self.options.max_pages {
                    if acc.budget_exhausted.is_none() {
                        tracing::info!("[CRAWL] Page budget of {} reached", self.options.max_pages);
                    }
                    acc.budget_exhausted.get_or_insert(BudgetKind::MaxPages);
                    break;
                }
                if visited.insert(&url) {
                    tracing::trace!("[CRAWL] Queued {} (depth {})", url, next_depth);
                    frontier.push(FrontierEntry {
                        url,
                        depth: next_depth,
                        source_url: Some(entry.url.clone()),
                        link_text,
                    });
                    admitted += 1;
                }
            }
            tracing::debug!(
                "[CRAWL] {} new links from {} (frontier {}, visited {})",
                admitted,
                entry.url,
                frontier.len(),
                visited.len()
            );
        }

        acc.records.push(record);
    }

    /// In-scope URLs on a page, in document order, with their anchor text.
    fn candidates(&self, page: &PageExtract) -> Vec<(String, Option<String>)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for anchor in &page.anchors {
            if self.admissible(&anchor.href) && seen.insert(anchor.href.clone()) {
                out.push((anchor.href.clone(), anchor.text.clone()));
            }
        }
        if self.options.include_stylesheet {
            for sheet in &page.stylesheets {
                if self.admissible(sheet) && seen.insert(sheet.clone()) {
                    out.push((sheet.clone(), None));
                }
            }
        }
        out
    }

    fn admissible(&self, href: &str) -> bool {
        match Url::parse(href) {
            Ok(url) => is_http(&url) && self.target.in_scope(&url, &self.options),
            Err(_) => false,
        }
    }
}

#[derive(Default)]
struct Accumulator {
    urls: Vec<String>,
    records: Vec<PageRecord>,
    external_urls: Vec<String>,
    seen_external: HashSet<String>,
    broken_links: Vec<BrokenLink>,
    budget_exhausted: Option<BudgetKind>,
    max_depth_reached: usize,
    seed_failure: Option<String>,
    cancelled: bool,
}

impl Accumulator {
    fn broken(&mut self, entry: &FrontierEntry, status_code: u16, reason: String) {
        self.broken_links.push(BrokenLink {
            url: entry.url.clone(),
            status_code,
            from_page: entry.source_url.clone(),
            link_text: entry.link_text.clone(),
            reason: Some(reason),
        });
    }
}
