//! URL normalization and crawl scope.
//!
//! Canonical strings are what the crawler deduplicates on, so every URL that
//! enters the frontier goes through [`canonicalize`] first.

use url::Url;

use crate::config::CrawlOptions;
use crate::error::{AppError, Result};

const DEFAULT_SCHEME: &str = "https";

/// The origin and start path of one crawl. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    start_url: Url,
    host: String,
}

impl CrawlTarget {
    /// Parse a user-supplied target such as `example.com` or
    /// `http://localhost:8080/docs`. A missing scheme defaults to https.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::invalid_target(raw, "empty target"));
        }

        let with_scheme = if has_scheme(trimmed) {
            trimmed.to_string()
        } else {
            format!("{}://{}", DEFAULT_SCHEME, trimmed.trim_start_matches("//"))
        };

        let mut start_url =
            Url::parse(&with_scheme).map_err(|e| AppError::invalid_target(raw, e.to_string()))?;

        if !is_http(&start_url) {
            return Err(AppError::invalid_target(
                raw,
                format!("unsupported scheme '{}'", start_url.scheme()),
            ));
        }

        let host = start_url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AppError::invalid_target(raw, "no host"))?
            .to_string();

        start_url.set_fragment(None);

        Ok(Self { start_url, host })
    }

    pub fn start_url(&self) -> &Url {
        &self.start_url
    }

    /// Canonical form of the start URL, the seed of the frontier.
    pub fn canonical_start(&self) -> String {
        canonicalize(&self.start_url)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.start_url.port()
    }

    /// `scheme://host[:port]`
    pub fn origin(&self) -> String {
        self.start_url.origin().ascii_serialization()
    }

    /// Host with a leading `www.` removed, used for subdomain matching.
    fn bare_host(&self) -> &str {
        self.host.strip_prefix("www.").unwrap_or(&self.host)
    }

    /// Whether `url` belongs to the target site (host and port match,
    /// optionally allowing subdomains).
    pub fn is_internal(&self, url: &Url, include_subdomains: bool) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if url.port() != self.port() {
            return false;
        }
        if host == self.host {
            return true;
        }
        if include_subdomains {
            let bare = self.bare_host();
            return host == bare || host.ends_with(&format!(".{}", bare));
        }
        false
    }

    /// Whether the crawler may fetch `url` under the given options.
    pub fn in_scope(&self, url: &Url, options: &CrawlOptions) -> bool {
        if !is_http(url) {
            return false;
        }
        options.follow_external_links || self.is_internal(url, options.include_subdomains)
    }
}

/// Canonical string for an absolute URL: fragment removed and a trailing
/// slash dropped when there is no query. Host case and default ports are
/// already normalized by the parser.
pub fn canonicalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    let mut canonical = url.to_string();
    if url.query().is_none() && canonical.ends_with('/') {
        canonical.pop();
    }
    canonical
}

/// Normalize a raw URL against the crawl target.
///
/// Bare hosts (`example.com/about`) get the default scheme; relative
/// references are resolved against the target's start URL.
pub fn normalize(raw: &str, base: &CrawlTarget) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidUrl(raw.to_string()));
    }

    let url = if has_scheme(trimmed) {
        Url::parse(trimmed).map_err(|e| AppError::InvalidUrl(format!("{}: {}", raw, e)))?
    } else if looks_like_host(trimmed) {
        Url::parse(&format!("{}://{}", DEFAULT_SCHEME, trimmed))
            .map_err(|e| AppError::InvalidUrl(format!("{}: {}", raw, e)))?
    } else {
        base.start_url()
            .join(trimmed)
            .map_err(|e| AppError::InvalidUrl(format!("{}: {}", raw, e)))?
    };

    Ok(canonicalize(&url))
}

/// Resolve an href found on `page_url` into an absolute URL with the
/// fragment removed.
pub fn normalize_against(raw: &str, page_url: &Url) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Err(AppError::InvalidUrl(raw.to_string()));
    }

    let mut url = page_url
        .join(trimmed)
        .map_err(|e| AppError::InvalidUrl(format!("{}: {}", raw, e)))?;
    url.set_fragment(None);
    Ok(url)
}

pub fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn has_scheme(raw: &str) -> bool {
    if raw.contains("://") {
        return true;
    }
    let lower = raw.to_ascii_lowercase();
    ["mailto:", "tel:", "javascript:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// `example.com`, `example.com/path`, `sub.example.com:8080` but not
/// `/path`, `./page` or `page.html`.
fn looks_like_host(raw: &str) -> bool {
    if raw.starts_with('/') || raw.starts_with('.') || raw.starts_with('?') {
        return false;
    }
    let first = raw.split(['/', '?']).next().unwrap_or_default();
    let host = first.split(':').next().unwrap_or_default();
    if host == "localhost" {
        return true;
    }
    let Some((_, tld)) = host.rsplit_once('.') else {
        return false;
    };
    // `index.html` is a relative file, not a host
    !tld.is_empty()
        && tld.chars().all(|c| c.is_ascii_alphabetic())
        && !matches!(tld, "html" | "htm" | "php" | "asp" | "aspx" | "jsp" | "xml")
}
