//! Exporters for an `ExtractedSite`. Each one is a pure function of the site.

use std::io::Write as _;

use flate2::write::GzEncoder;
use flate2::Compression;
use quick_xml::escape::escape;

use crate::domain::models::{ExtractedSite, PageRecord};
use crate::error::{AppError, Result};
use crate::export::sitemap;

pub fn to_json(site: &ExtractedSite) -> Result<String> {
    Ok(serde_json::to_string_pretty(site)?)
}

/// Single static HTML document with a table of contents linking each page
/// section.
pub fn to_html(site: &ExtractedSite) -> String {
    let domain = escape(site.domain.as_str());
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{} content export</title>\n", domain));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{}</h1>\n", domain));
    html.push_str(&format!(
        "<p>{} pages extracted {}</p>\n",
        site.page_count,
        site.extracted_at.format("%Y-%m-%d %H:%M UTC")
    ));

    html.push_str("<nav>\n<ol>\n");
    for (i, page) in site.pages.iter().enumerate() {
        html.push_str(&format!(
            "  <li><a href=\"#page-{}\">{}</a></li>\n",
            i + 1,
            escape(display_title(page))
        ));
    }
    html.push_str("</ol>\n</nav>\n");

    for (i, page) in site.pages.iter().enumerate() {
        let url = escape(page.url.as_str());
        html.push_str(&format!("<section id=\"page-{}\">\n", i + 1));
        html.push_str(&format!("<h2>{}</h2>\n", escape(display_title(page))));
        html.push_str(&format!("<p><a href=\"{}\">{}</a></p>\n", url, url));
        if let Some(description) = &page.meta.description {
            html.push_str(&format!("<p><em>{}</em></p>\n", escape(description.as_str())));
        }

        let headings: Vec<_> = page
            .headings
            .h1
            .iter()
            .map(|h| ("h1", h))
            .chain(page.headings.h2.iter().map(|h| ("h2", h)))
            .chain(page.headings.h3.iter().map(|h| ("h3", h)))
            .collect();
        if !headings.is_empty() {
            html.push_str("<ul class=\"headings\">\n");
            for (level, text) in headings {
                html.push_str(&format!("  <li>{}: {}</li>\n", level, escape(text.as_str())));
            }
            html.push_str("</ul>\n");
        }

        html.push_str(&format!(
            "<p>{} words, {} internal links, {} external links, {} images</p>\n",
            page.word_count,
            page.links.internal.len(),
            page.links.external.len(),
            page.images.len()
        ));
        html.push_str("</section>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// Markdown outline of every page. Page text is escaped so titles and
/// headings cannot open emphasis, links or raw HTML.
pub fn to_markdown(site: &ExtractedSite) -> String {
    let mut md = String::new();
    md.push_str(&format!("# {}\n\n", escape_markdown(&site.domain)));
    md.push_str(&format!(
        "{} pages extracted {}\n\n",
        site.page_count,
        site.extracted_at.format("%Y-%m-%d %H:%M UTC")
    ));

    for page in &site.pages {
        md.push_str(&format!("## {}\n\n", escape_markdown(display_title(page))));
        md.push_str(&format!("<{}>\n\n", page.url));
        if let Some(description) = &page.meta.description {
            md.push_str(&format!("> {}\n\n", escape_markdown(description)));
        }
        for h in &page.headings.h1 {
            md.push_str(&format!("- **{}**\n", escape_markdown(h)));
        }
        for h in &page.headings.h2 {
            md.push_str(&format!("  - {}\n", escape_markdown(h)));
        }
        for h in &page.headings.h3 {
            md.push_str(&format!("    - {}\n", escape_markdown(h)));
        }
        if !page.headings.is_empty() {
            md.push('\n');
        }
        md.push_str(&format!(
            "{} words · {} internal links · {} external links · {} images\n\n",
            page.word_count,
            page.links.internal.len(),
            page.links.external.len(),
            page.images.len()
        ));
    }

    if !site.skipped.is_empty() {
        md.push_str("## Skipped\n\n");
        for skipped in &site.skipped {
            md.push_str(&format!("- {}: {}\n", skipped.url, escape_markdown(&skipped.reason)));
        }
    }
    md
}

pub fn to_sitemap_xml(site: &ExtractedSite) -> Result<String> {
    sitemap::render_xml_at(&page_urls(site), site.extracted_at.date_naive(), &Default::default())
}

/// gzip-compressed tar holding every other export plus a CSV sitemap.
pub fn to_archive(site: &ExtractedSite) -> Result<Vec<u8>> {
    let urls = page_urls(site);
    let entries: [(&str, String); 5] = [
        ("site.json", to_json(site)?),
        ("site.html", to_html(site)),
        ("site.md", to_markdown(site)),
        ("sitemap.xml", to_sitemap_xml(site)?),
        ("sitemap.csv", sitemap::render_csv(&urls)?),
    ];

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = tar::Builder::new(encoder);
    let mtime = site.extracted_at.timestamp().max(0) as u64;

    for (name, body) in &entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_cksum();
        archive
            .append_data(&mut header, name, body.as_bytes())
            .map_err(|e| AppError::export(format!("failed to add {}: {}", name, e)))?;
    }

    let mut encoder = archive
        .into_inner()
        .map_err(|e| AppError::export(format!("failed to finish archive: {}", e)))?;
    encoder.flush()?;
    let bytes = encoder.finish()?;

    tracing::debug!("[EXTRACT] Archive of {} pages: {} bytes", site.page_count, bytes.len());
    Ok(bytes)
}

fn page_urls(site: &ExtractedSite) -> Vec<String> {
    site.pages.iter().map(|p| p.url.clone()).collect()
}

fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '`' | '*' | '_' | '[' | ']' | '#' | '<' | '>' | '|') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn display_title(page: &PageRecord) -> &str {
    page.title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(page.url.as_str())
}
