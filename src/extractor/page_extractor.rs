use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

use crate::domain::models::{Headings, ImageRef, LinkRef, MetaTags, PageLinks};
use crate::domain::scope::{canonicalize, is_http, normalize_against};

/// Everything pulled out of one HTML document.
///
/// html5ever recovers from any markup, so extraction never fails; fields the
/// page does not provide are simply left empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageExtract {
    pub title: Option<String>,
    pub meta: MetaTags,
    pub headings: Headings,
    pub links: PageLinks,
    pub anchors: Vec<LinkRef>,
    pub images: Vec<ImageRef>,
    /// `<link rel="stylesheet">` targets, followed only when asked to
    pub stylesheets: Vec<String>,
    pub text: String,
}

impl PageExtract {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.text)
    }
}

pub struct PageExtractor;

impl PageExtractor {
    /// Extract a page, treating links on the page's own host and port as internal.
    pub fn extract(html: &str, page_url: &Url) -> PageExtract {
        let host = page_url.host_str().map(str::to_string);
        let port = page_url.port();
        Self::extract_with_scope(html, page_url, |link| {
            link.host_str().map(str::to_string) == host && link.port() == port
        })
    }

    /// Extract a page, splitting links with a caller-supplied scope test.
    pub fn extract_with_scope(
        html: &str,
        page_url: &Url,
        is_internal: impl Fn(&Url) -> bool,
    ) -> PageExtract {
        let document = Html::parse_document(html);

        let (links, anchors) = Self::extract_links(&document, page_url, &is_internal);

        PageExtract {
            title: Self::extract_title(&document),
            meta: Self::extract_meta(&document, page_url),
            headings: Self::extract_headings(&document),
            links,
            anchors,
            images: Self::extract_images(&document, page_url),
            stylesheets: Self::extract_stylesheets(&document, page_url),
            text: Self::extract_text(&document),
        }
    }

    pub fn extract_title(html: &Html) -> Option<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("title").unwrap());
        html.select(selector)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|s| !s.is_empty())
    }

    fn extract_meta(html: &Html, page_url: &Url) -> MetaTags {
        static DESCRIPTION: OnceLock<Selector> = OnceLock::new();
        static ROBOTS: OnceLock<Selector> = OnceLock::new();
        static CANONICAL: OnceLock<Selector> = OnceLock::new();
        let description =
            DESCRIPTION.get_or_init(|| Selector::parse("meta[name='description']").unwrap());
        let robots = ROBOTS.get_or_init(|| Selector::parse("meta[name='robots']").unwrap());
        let canonical =
            CANONICAL.get_or_init(|| Selector::parse("link[rel='canonical']").unwrap());

        let attr_of = |selector: &Selector, attr: &str| {
            html.select(selector)
                .next()
                .and_then(|el| el.value().attr(attr))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        MetaTags {
            title: Self::extract_title(html),
            description: attr_of(description, "content"),
            canonical: attr_of(canonical, "href").map(|href| {
                normalize_against(&href, page_url)
                    .map(|u| canonicalize(&u))
                    .unwrap_or(href)
            }),
            robots: attr_of(robots, "content"),
        }
    }

    pub fn extract_headings(html: &Html) -> Headings {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("h1, h2, h3").unwrap());

        let mut headings = Headings::default();
        for element in html.select(selector) {
            let text = collapse_whitespace(&element.text().collect::<String>());
            if text.is_empty() {
                continue;
            }
            match element.value().name() {
                "h1" => headings.h1.push(text),
                "h2" => headings.h2.push(text),
                "h3" => headings.h3.push(text),
                _ => {}
            }
        }
        headings
    }

    pub fn extract_images(html: &Html, page_url: &Url) -> Vec<ImageRef> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("img[src]").unwrap());

        html.select(selector)
            .filter_map(|element| {
                let src = element.value().attr("src")?.trim();
                if src.is_empty() {
                    return None;
                }
                let resolved = page_url
                    .join(src)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| src.to_string());
                let alt = element.value().attr("alt").map(|s| s.trim().to_string());

                Some(ImageRef { src: resolved, alt })
            })
            .collect()
    }

    fn extract_stylesheets(html: &Html, page_url: &Url) -> Vec<String> {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector =
            SELECTOR.get_or_init(|| Selector::parse("link[rel='stylesheet'][href]").unwrap());

        html.select(selector)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| normalize_against(href, page_url).ok())
            .filter(is_http)
            .map(|u| canonicalize(&u))
            .collect()
    }

    fn extract_links(
        html: &Html,
        page_url: &Url,
        is_internal: &impl Fn(&Url) -> bool,
    ) -> (PageLinks, Vec<LinkRef>) {
        static SELECTOR: OnceLock<Selector> = OnceLock::new();
        let selector = SELECTOR.get_or_init(|| Selector::parse("a[href]").unwrap());

        let mut links = PageLinks::default();
        let mut anchors = Vec::new();

        for element in html.select(selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if is_skippable_href(href) {
                continue;
            }

            let text = Self::anchor_text(&element);

            let (resolved, internal) = match normalize_against(href, page_url) {
                Ok(url) if is_http(&url) => {
                    let internal = is_internal(&url);
                    (canonicalize(&url), internal)
                }
                Ok(url) => (url.to_string(), false),
                Err(_) => {
                    // unparseable hrefs are kept as external so the link
                    // checker can report them
                    tracing::trace!("[EXTRACT] Unresolvable href '{}' on {}", href, page_url);
                    (href.to_string(), false)
                }
            };

            if internal {
                links.internal.push(resolved.clone());
            } else {
                links.external.push(resolved.clone());
            }
            anchors.push(LinkRef {
                href: resolved,
                text,
                is_internal: internal,
            });
        }

        (links, anchors)
    }

    /// Visible text for an anchor, falling back to aria-label, title and
    /// nested image alt text.
    fn anchor_text(element: &ElementRef<'_>) -> Option<String> {
        static IMG_SELECTOR: OnceLock<Selector> = OnceLock::new();
        let img_selector = IMG_SELECTOR.get_or_init(|| Selector::parse("img").unwrap());

        let text = collapse_whitespace(&element.text().collect::<String>());
        if !text.is_empty() {
            return Some(text);
        }
        if let Some(attr) = element
            .value()
            .attr("aria-label")
            .or_else(|| element.value().attr("title"))
        {
            let attr = attr.trim();
            if !attr.is_empty() {
                return Some(attr.to_string());
            }
        }
        element
            .select(img_selector)
            .filter_map(|img| img.value().attr("alt"))
            .map(str::trim)
            .find(|alt| !alt.is_empty())
            .map(str::to_string)
    }

    /// Body text without script, style and template content.
    pub fn extract_text(html: &Html) -> String {
        static BODY: OnceLock<Selector> = OnceLock::new();
        let body = BODY.get_or_init(|| Selector::parse("body").unwrap());

        let root = html
            .select(body)
            .next()
            .unwrap_or_else(|| html.root_element());

        let mut raw = String::new();
        for node in root.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node.ancestors().any(|ancestor| {
                ancestor.value().as_element().is_some_and(|el| {
                    matches!(el.name(), "script" | "style" | "noscript" | "template")
                })
            });
            if !hidden {
                raw.push_str(text);
                raw.push(' ');
            }
        }
        collapse_whitespace(&raw)
    }
}

fn is_skippable_href(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace- and case-insensitive fingerprint of page text.
pub fn content_hash(text: &str) -> String {
    let normalized = collapse_whitespace(text).to_lowercase();
    format!("{:x}", md5::compute(normalized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://example.com/blog/").unwrap()
    }

    #[test]
    fn test_extract_full_page() {
        let html = r##"
            <html>
                <head>
                    <title>  Test   Page </title>
                    <meta name="description" content="A test page description.">
                    <link rel="canonical" href="/blog/">
                    <link rel="stylesheet" href="/assets/site.css">
                </head>
                <body>
                    <h1>Hello</h1>
                    <h2>Section A</h2><h2>Section B</h2>
                    <h3>Detail</h3>
                    <h4>Ignored level</h4>
                    <img src="hero.jpg" alt="hero">
                    <img src="/missing.jpg">
                    <a href="/about">About us</a>
                    <a href="post-1#comments">First post</a>
                    <a href="https://external.com/x">External</a>
                    <a href="#top">Top</a>
                    <a href="mailto:hi@example.com">Mail</a>
                    <script>var hidden = "script text";</script>
                </body>
            </html>
        "##;

        let extract = PageExtractor::extract(html, &page());

        assert_eq!(extract.title.as_deref(), Some("Test Page"));
        assert_eq!(extract.meta.title.as_deref(), Some("Test Page"));
        assert_eq!(extract.meta.description.as_deref(), Some("A test page description."));
        assert_eq!(extract.meta.canonical.as_deref(), Some("https://example.com/blog"));
        assert_eq!(extract.headings.h1, vec!["Hello"]);
        assert_eq!(extract.headings.h2.len(), 2);
        assert_eq!(extract.headings.h3, vec!["Detail"]);

        assert_eq!(
            extract.links.internal,
            vec!["https://example.com/about", "https://example.com/blog/post-1"]
        );
        assert_eq!(extract.links.external, vec!["https://external.com/x"]);
        assert_eq!(extract.anchors[0].text.as_deref(), Some("About us"));

        assert_eq!(extract.images.len(), 2);
        assert_eq!(extract.images[0].src, "https://example.com/blog/hero.jpg");
        assert_eq!(extract.images[1].alt, None);

        assert_eq!(extract.stylesheets, vec!["https://example.com/assets/site.css"]);
        assert!(extract.text.contains("Hello"));
        assert!(!extract.text.contains("script text"));
    }

    #[test]
    fn test_malformed_html_still_extracts() {
        let html = "<body><h1>Unclosed <a href='/x'>link <div><p>text <table><td>cell";
        let extract = PageExtractor::extract(html, &page());

        assert_eq!(extract.links.internal, vec!["https://example.com/x"]);
        assert!(extract.meta.description.is_none());
    }

    #[test]
    fn test_empty_document() {
        let extract = PageExtractor::extract("", &page());
        assert_eq!(extract, PageExtract::default());
    }

    #[test]
    fn test_anchor_text_fallbacks() {
        let html = r#"
            <a href="/a" aria-label="Label text"></a>
            <a href="/b"><img src="x.png" alt="Image alt"></a>
            <a href="/c"></a>
        "#;
        let extract = PageExtractor::extract(html, &page());
        let texts: Vec<_> = extract.anchors.iter().map(|a| a.text.clone()).collect();
        assert_eq!(
            texts,
            vec![Some("Label text".to_string()), Some("Image alt".to_string()), None]
        );
    }

    #[test]
    fn test_custom_scope() {
        let html = r#"<a href="https://blog.example.com/">Blog</a>"#;
        let extract = PageExtractor::extract_with_scope(html, &page(), |u| {
            u.host_str().is_some_and(|h| h.ends_with("example.com"))
        });
        assert_eq!(extract.links.internal, vec!["https://blog.example.com"]);
    }

    #[test]
    fn test_content_hash_ignores_whitespace_and_case() {
        assert_eq!(content_hash("Hello   World\n"), content_hash("hello world"));
        assert_ne!(content_hash("hello world"), content_hash("hello there"));
    }
}
