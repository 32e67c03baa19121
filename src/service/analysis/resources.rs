//! Site resource checks: robots.txt, sitemap.xml and HTTPS.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use url::Url;

use crate::config::AnalysisOptions;
use crate::domain::models::{CrawlResult, ResourceStatus, SiteResources};
use crate::domain::scope::canonicalize;
use crate::error::{AppError, Result};
use crate::extractor::sitemap::{parse_sitemap, SitemapKind, SITE_MAP_PATH};

const ROBOTS_PATH: &str = "/robots.txt";
/// Child sitemaps read from a sitemap index
const MAX_CHILD_SITEMAPS: usize = 50;

pub struct ResourceChecker {
    client: Client,
}

impl ResourceChecker {
    pub fn new(options: &AnalysisOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(options.timeout))
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|e| AppError::Other(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Check robots.txt exists at the site root
    pub async fn check_robots_txt(&self, base_url: &Url) -> Result<ResourceStatus> {
        tracing::debug!("[RESOURCE] Checking robots.txt for {}", base_url);
        Ok(self.fetch_resource(base_url, ROBOTS_PATH).await?.0)
    }

    /// Check sitemap.xml exists at the site root
    pub async fn check_sitemap_xml(&self, base_url: &Url) -> Result<ResourceStatus> {
        tracing::debug!("[RESOURCE] Checking sitemap.xml for {}", base_url);
        Ok(self.fetch_resource(base_url, SITE_MAP_PATH).await?.0)
    }

    pub fn check_ssl_certificate(&self, url: &Url) -> bool {
        let has_ssl = url.scheme() == "https";
        tracing::debug!("[RESOURCE] SSL check for {}: {}", url, has_ssl);
        has_ssl
    }

    /// Run every resource check against the root of `base_url`'s site. When
    /// `crawl` is given, sitemap URLs the crawl never reached are listed.
    pub async fn check_site(&self, base_url: &Url, crawl: Option<&CrawlResult>) -> SiteResources {
        let (robots_txt, robots_body) = self
            .fetch_resource(base_url, ROBOTS_PATH)
            .await
            .unwrap_or_else(|e| (unreachable_resource(ROBOTS_PATH, e), None));

        // a Sitemap: directive in robots.txt wins over the default location
        let declared = robots_body.as_deref().and_then(sitemap_directive);
        let (sitemap_xml, sitemap_body) = match declared {
            Some(url) => {
                tracing::debug!("[RESOURCE] robots.txt declares sitemap {}", url);
                let body = self.fetch_text(&url).await;
                (ResourceStatus::Found(url), body)
            }
            None => self
                .fetch_resource(base_url, SITE_MAP_PATH)
                .await
                .unwrap_or_else(|e| (unreachable_resource(SITE_MAP_PATH, e), None)),
        };

        let listed = match (&sitemap_xml, sitemap_body) {
            (_, Some(body)) => self.listed_urls(&body).await,
            (ResourceStatus::Found(url), None) => {
                tracing::warn!("[RESOURCE] Could not read sitemap body from {}", url);
                Vec::new()
            }
            _ => Vec::new(),
        };

        let unreached_sitemap_urls = match crawl {
            Some(crawl) => {
                let reached: HashSet<&str> = crawl.urls.iter().map(String::as_str).collect();
                listed
                    .iter()
                    .filter(|url| !reached.contains(url.as_str()))
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        };

        let resources = SiteResources {
            robots_txt,
            sitemap_xml,
            sitemap_url_count: listed.len(),
            unreached_sitemap_urls,
            ssl: self.check_ssl_certificate(base_url),
        };
        tracing::info!(
            "[RESOURCE] robots.txt: {}, sitemap: {} ({} URLs, {} unreached), https: {}",
            resources.robots_txt.exists(),
            resources.sitemap_xml.exists(),
            resources.sitemap_url_count,
            resources.unreached_sitemap_urls.len(),
            resources.ssl
        );
        resources
    }

    /// Request `path` from the site root. The body comes back with a 200.
    async fn fetch_resource(
        &self,
        base_url: &Url,
        path: &str,
    ) -> Result<(ResourceStatus, Option<String>)> {
        // absolute path: always the origin, never relative to the start page
        let resource_url = base_url
            .join(path)
            .map_err(|e| AppError::InvalidUrl(format!("{}{}: {}", base_url, path, e)))?;
        tracing::trace!("[RESOURCE] Fetching: {}", resource_url);
        let response = self
            .client
            .get(resource_url.clone())
            .send()
            .await
            .map_err(|e| AppError::connection(resource_url.as_str(), e.to_string()))?;

        let fetched = match response.status() {
            StatusCode::OK => {
                tracing::debug!("[RESOURCE] Found: {}", resource_url);
                let body = response.text().await.ok();
                (ResourceStatus::Found(resource_url.to_string()), body)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!("[RESOURCE] Unauthorized: {}", resource_url);
                (ResourceStatus::Unauthorized(resource_url.to_string()), None)
            }
            StatusCode::NOT_FOUND => {
                tracing::debug!("[RESOURCE] Not found: {}", resource_url);
                (ResourceStatus::NotFound, None)
            }
            status => {
                tracing::debug!("[RESOURCE] Unexpected status {} for: {}", status, resource_url);
                (ResourceStatus::NotFound, None)
            }
        };

        Ok(fetched)
    }

    async fn fetch_text(&self, url: &str) -> Option<String> {
        let response = self.client.get(url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }

    /// Canonical page URLs listed by a sitemap body, deduplicated in listed
    /// order. A sitemap index is followed one level down.
    async fn listed_urls(&self, body: &str) -> Vec<String> {
        let listing = parse_sitemap(body);
        let pages = match listing.kind {
            SitemapKind::Index => {
                tracing::debug!(
                    "[RESOURCE] Sitemap index of {} sitemaps",
                    listing.locations.len()
                );
                let mut pages = Vec::new();
                for child in listing.locations.iter().take(MAX_CHILD_SITEMAPS) {
                    match self.fetch_text(child).await {
                        Some(body) => pages.extend(parse_sitemap(&body).locations),
                        None => tracing::warn!("[RESOURCE] Could not read child sitemap {}", child),
                    }
                }
                pages
            }
            SitemapKind::UrlSet | SitemapKind::PlainText => listing.locations,
        };

        let mut seen = HashSet::new();
        pages
            .into_iter()
            .filter_map(|raw| Url::parse(&raw).ok())
            .map(|url| canonicalize(&url))
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}

fn unreachable_resource(path: &str, error: AppError) -> ResourceStatus {
    tracing::warn!("[RESOURCE] Could not check {}: {}", path, error);
    ResourceStatus::NotFound
}

/// First `Sitemap:` directive in a robots.txt body.
fn sitemap_directive(robots: &str) -> Option<String> {
    robots.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if !key.trim().eq_ignore_ascii_case("sitemap") {
            return None;
        }
        let value = value.trim();
        Url::parse(value).ok().map(|_| value.to_string())
    })
}
