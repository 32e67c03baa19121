//! Sitemap emitters: XML (sitemaps.org protocol), HTML and CSV.
//!
//! All renderers are pure functions of their input; the same URLs in the
//! same order always give the same bytes, apart from the XML `lastmod`
//! date when [`render_xml`] picks today's date.

use std::collections::HashMap;
use std::io::Cursor;

use chrono::{NaiveDate, Utc};
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use url::Url;

use crate::error::{AppError, Result};

pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
pub const DEFAULT_CHANGEFREQ: &str = "weekly";
pub const DEFAULT_PRIORITY: f64 = 0.5;

/// Per-URL values replacing the sitemap defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlOverride {
    pub lastmod: Option<NaiveDate>,
    pub changefreq: Option<String>,
    pub priority: Option<f64>,
}

/// XML sitemap dated today, with default changefreq and priority.
pub fn render_xml(urls: &[String]) -> Result<String> {
    render_xml_at(urls, Utc::now().date_naive(), &HashMap::new())
}

/// XML sitemap with an explicit render date and optional per-URL overrides.
pub fn render_xml_at(
    urls: &[String],
    lastmod: NaiveDate,
    overrides: &HashMap<String, UrlOverride>,
) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    let lastmod = lastmod.format("%Y-%m-%d").to_string();

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("urlset").with_attributes([("xmlns", SITEMAP_NS)]),
        ))
        .map_err(xml_error)?;

    for url in urls {
        let custom = overrides.get(url);
        let url_lastmod = custom
            .and_then(|o| o.lastmod)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| lastmod.clone());
        let changefreq = custom
            .and_then(|o| o.changefreq.as_deref())
            .unwrap_or(DEFAULT_CHANGEFREQ);
        let priority = custom.and_then(|o| o.priority).unwrap_or(DEFAULT_PRIORITY);

        writer
            .write_event(Event::Start(BytesStart::new("url")))
            .map_err(xml_error)?;
        write_element(&mut writer, "loc", url)?;
        write_element(&mut writer, "lastmod", &url_lastmod)?;
        write_element(&mut writer, "changefreq", changefreq)?;
        write_element(&mut writer, "priority", &format!("{:.1}", priority))?;
        writer
            .write_event(Event::End(BytesEnd::new("url")))
            .map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("urlset")))
        .map_err(xml_error)?;

    let bytes = writer.into_inner().into_inner();
    let mut xml = String::from_utf8(bytes).map_err(|e| AppError::export(e.to_string()))?;
    xml.push('\n');
    tracing::debug!("[SITEMAP] Rendered XML sitemap with {} URLs", urls.len());
    Ok(xml)
}

fn write_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)?;
    Ok(())
}

fn xml_error(error: impl std::fmt::Display) -> AppError {
    AppError::export(format!("XML write failed: {}", error))
}

/// Top-level path segment a URL is grouped under; `/` for the root.
fn section_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("/{}", segment))
        .unwrap_or_else(|| "/".to_string())
}

/// Static HTML page listing every URL, grouped by top-level path segment
/// in order of first appearance.
pub fn render_html(domain: &str, urls: &[String]) -> String {
    let mut sections: Vec<(String, Vec<&String>)> = Vec::new();
    for url in urls {
        let section = section_of(url);
        match sections.iter_mut().find(|(name, _)| *name == section) {
            Some((_, members)) => members.push(url),
            None => sections.push((section, vec![url])),
        }
    }

    let domain = escape(domain);
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>Sitemap of {}</title>\n", domain));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>Sitemap of {}</h1>\n", domain));
    html.push_str(&format!("<p>{} pages</p>\n", urls.len()));

    for (section, members) in &sections {
        html.push_str(&format!("<h2>{}</h2>\n<ul>\n", escape(section.as_str())));
        for url in members {
            let url = escape(url.as_str());
            html.push_str(&format!("  <li><a href=\"{}\">{}</a></li>\n", url, url));
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// CSV with a `url` header row and one URL per line.
pub fn render_csv(urls: &[String]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["url"])
        .map_err(|e| AppError::export(e.to_string()))?;
    for url in urls {
        writer
            .write_record([url])
            .map_err(|e| AppError::export(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AppError::export(e.to_string()))
}
