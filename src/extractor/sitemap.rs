//! Reader for a site's own sitemap: `<urlset>`, `<sitemapindex>` or a plain
//! list of URLs.

use quick_xml::events::Event;
use quick_xml::Reader;

/// Conventional location, relative to the site root
pub const SITE_MAP_PATH: &str = "/sitemap.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    UrlSet,
    /// Locations are child sitemaps, not pages
    Index,
    PlainText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapListing {
    pub kind: SitemapKind,
    pub locations: Vec<String>,
}

/// Parse a sitemap body. Text without any `<loc>` element is read as
/// whitespace-separated absolute http(s) URLs.
pub fn parse_sitemap(text: &str) -> SitemapListing {
    let (root, locations) = read_locations(text);

    let listing = match root.as_deref() {
        _ if locations.is_empty() => SitemapListing {
            kind: SitemapKind::PlainText,
            locations: plain_urls(text),
        },
        Some("sitemapindex") => SitemapListing {
            kind: SitemapKind::Index,
            locations,
        },
        _ => SitemapListing {
            kind: SitemapKind::UrlSet,
            locations,
        },
    };
    tracing::debug!(
        "[SITEMAP] {:?} listing with {} locations",
        listing.kind,
        listing.locations.len()
    );
    listing
}

/// Root element name and every non-empty `<loc>` value, entities resolved.
fn read_locations(text: &str) -> (Option<String>, Vec<String>) {
    let mut reader = Reader::from_str(text);
    let mut root = None;
    let mut locations = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if root.is_none() {
                    root = Some(String::from_utf8_lossy(name.as_ref()).to_ascii_lowercase());
                }
                if name.as_ref() == b"loc" {
                    current = Some(String::new());
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(loc), Ok(txt)) = (current.as_mut(), e.decode()) {
                    loc.push_str(&txt);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(loc) = current.as_mut() {
                    loc.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                let name = e.decode().ok();
                if let (Some(loc), Some(resolved)) =
                    (current.as_mut(), name.as_deref().and_then(entity))
                {
                    loc.push_str(resolved);
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"loc" => {
                if let Some(loc) = current.take() {
                    let loc = loc.trim();
                    if !loc.is_empty() {
                        locations.push(loc.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::warn!(
                    "[SITEMAP] Stopped at byte {} of malformed sitemap: {}",
                    reader.error_position(),
                    err
                );
                break;
            }
            _ => {}
        }
    }
    (root, locations)
}

fn entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        _ => return None,
    })
}

fn plain_urls(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|token| url::Url::parse(token).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlset() {
        let listing = parse_sitemap(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/</loc><priority>1.0</priority></url>
  <url><loc> https://example.com/about </loc></url>
</urlset>"#,
        );
        assert_eq!(listing.kind, SitemapKind::UrlSet);
        assert_eq!(
            listing.locations,
            vec!["https://example.com/", "https://example.com/about"]
        );
    }

    #[test]
    fn test_sitemap_index() {
        let listing = parse_sitemap(
            r#"
<sitemapindex>
<sitemap>
<loc>https://www.google.com/gmail/sitemap.xml</loc>
</sitemap>
<sitemap>
<loc>https://www.google.com/forms/sitemaps.xml</loc>
</sitemap>
</sitemapindex>"#,
        );
        assert_eq!(listing.kind, SitemapKind::Index);
        assert_eq!(listing.locations.len(), 2);
        assert_eq!(listing.locations[1], "https://www.google.com/forms/sitemaps.xml");
    }

    #[test]
    fn test_plain_text_list() {
        let listing = parse_sitemap(
            "https://www.google.com/intl/am/gmail/about/\n\
             https://www.google.com/intl/am/gmail/about/for-work/\n\
             ftp://files.example.com/x\n\
             not-a-url",
        );
        assert_eq!(listing.kind, SitemapKind::PlainText);
        assert_eq!(listing.locations.len(), 2);
        assert_eq!(listing.locations[0], "https://www.google.com/intl/am/gmail/about/");
    }

    #[test]
    fn test_escaped_query_and_cdata() {
        let listing = parse_sitemap(
            "<urlset><url><loc>https://example.com/search?q=a&amp;page=2</loc></url>\
             <url><loc><![CDATA[https://example.com/b?x=1&y=2]]></loc></url></urlset>",
        );
        assert_eq!(
            listing.locations,
            vec![
                "https://example.com/search?q=a&page=2",
                "https://example.com/b?x=1&y=2"
            ]
        );
    }

    #[test]
    fn test_stray_loc_in_text_wins_over_bare_urls() {
        let listing = parse_sitemap(
            "Some text https://example.com more text\n<loc>https://test.com</loc> invalid stuff",
        );
        assert_eq!(listing.kind, SitemapKind::UrlSet);
        assert_eq!(listing.locations, vec!["https://test.com"]);
    }

    #[test]
    fn test_empty_input() {
        let listing = parse_sitemap("");
        assert_eq!(listing.kind, SitemapKind::PlainText);
        assert!(listing.locations.is_empty());
    }
}
