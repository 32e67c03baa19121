// tests/analysis_e2e.rs
//
// Crawl a small mock site, then run the analysis and export passes over the
// result.

use std::sync::Mutex;

use crawlscope::config::{AnalysisOptions, ExtractionOptions};
use crawlscope::domain::models::{MetaTagKind, ResourceStatus};
use crawlscope::export::site;
use crawlscope::service::analysis::{analyze_site, AnalysisStage};
use crawlscope::service::progress::{no_steps, NoopReporter};
use crawlscope::service::{crawl_site, SiteExtractor};
use crawlscope::{CrawlOptions, CrawlResult};
use mockito::{Server, ServerGuard};
use tokio_test::assert_ok;

const SHARED: &str = "Our shipping policy covers every order placed through the store. \
    Parcels leave the warehouse within two working days and tracking numbers are sent by email.";

async fn page(server: &mut ServerGuard, path: &str, title: &str, body: &str) -> mockito::Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            title, body
        ))
        .create_async()
        .await
}

struct MockSite {
    server: ServerGuard,
    _mocks: Vec<mockito::Mock>,
}

async fn mock_site() -> MockSite {
    let mut server = Server::new_async().await;
    let base = server.url();
    let back = r#"<a href="/">home</a>"#;
    let copy = format!("<p>{}</p>{}", SHARED, back);

    let mocks = vec![
        page(
            &mut server,
            "/",
            "Garden Supplies",
            r#"<h1>Garden supplies</h1>
               <p>Seeds bulbs and compost for allotments, balconies and greenhouses alike.</p>
               <a href="/a">a</a><a href="/b">b</a><a href="/c">c</a>
               <a href="/d">d</a><a href="/gone">gone</a>"#,
        )
        .await,
        page(&mut server, "/a", "Shipping", &copy).await,
        page(&mut server, "/b", "Shipping", &copy).await,
        page(&mut server, "/c", "Shipping", &copy).await,
        page(
            &mut server,
            "/d",
            "Pruning roses",
            &format!(
                "<p>Cut back roses in late winter just above an outward facing bud, \
                 removing dead wood first.</p>{}",
                back
            ),
        )
        .await,
        server.mock("GET", "/gone").with_status(404).create_async().await,
        server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body(format!("User-agent: *\nDisallow:\nSitemap: {}/sitemap.xml\n", base))
            .create_async()
            .await,
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body(format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/a</loc></url>
  <url><loc>{base}/orphan</loc></url>
</urlset>"#
            ))
            .create_async()
            .await,
    ];

    MockSite {
        server,
        _mocks: mocks,
    }
}

async fn crawl(site: &MockSite) -> CrawlResult {
    let options = CrawlOptions {
        retry_count: 0,
        ..Default::default()
    };
    assert_ok!(crawl_site(&site.server.url(), options, NoopReporter).await)
}

fn analysis_options() -> AnalysisOptions {
    AnalysisOptions {
        retry_count: 0,
        retry_delay: 10,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_identical_pages_form_one_duplicate_group() {
    let site = mock_site().await;
    let result = crawl(&site).await;
    assert_eq!(result.page_count, 5);

    let report = analyze_site(&result, &analysis_options(), |_, _, _| {})
        .await
        .unwrap();

    assert_eq!(report.duplicate_pages.len(), 1);
    let group = &report.duplicate_pages[0];
    assert_eq!(group.urls.len(), 3);
    assert_eq!(group.title.as_deref(), Some("Shipping"));

    assert_eq!(report.content.total_pages, 5);
    assert_eq!(report.content.unique_pages, 5 - 3);
    assert!((report.content.overall_uniqueness - 40.0).abs() < 1e-9);

    let titles: Vec<_> = report
        .duplicate_meta
        .iter()
        .filter(|d| d.tag == MetaTagKind::Title)
        .collect();
    assert_eq!(titles.len(), 1);
    assert_eq!(titles[0].pages.len(), 3);
}

#[tokio::test]
async fn test_report_covers_links_structure_and_resources() {
    let site = mock_site().await;
    let base = site.server.url();
    let result = crawl(&site).await;

    let stages = Mutex::new(Vec::new());
    let report = analyze_site(&result, &analysis_options(), |stage, _, _| {
        let mut stages = stages.lock().unwrap();
        if stages.last() != Some(&stage) {
            stages.push(stage);
        }
    })
    .await
    .unwrap();

    assert!(report.has_issues());
    assert_eq!(report.links.broken.len(), 1);
    assert_eq!(report.links.broken[0].url, format!("{}/gone", base));
    assert_eq!(report.links.broken[0].status_code, 404);
    assert!(report.links.redirects.is_empty());

    assert_eq!(report.structure.nodes.len(), 5);
    let total: f64 = report.structure.nodes.iter().map(|n| n.page_rank).sum();
    assert!((total - 100.0).abs() < 1e-6);
    let home = report.structure.node(&base).unwrap();
    assert_eq!(home.incoming_links, 4);
    assert!(report
        .structure
        .nodes
        .iter()
        .all(|n| n.url == base || n.page_rank < home.page_rank));

    assert!(report.resources.robots_txt.exists());
    assert_eq!(
        report.resources.sitemap_xml,
        ResourceStatus::Found(format!("{}/sitemap.xml", base))
    );
    assert_eq!(report.resources.sitemap_url_count, 2);
    assert_eq!(
        report.resources.unreached_sitemap_urls,
        vec![format!("{}/orphan", base)]
    );
    assert!(!report.resources.ssl);

    let stages = stages.into_inner().unwrap();
    assert_eq!(stages.first(), Some(&AnalysisStage::Links));
    assert_eq!(stages.last(), Some(&AnalysisStage::Resources));
}

#[tokio::test]
async fn test_extract_and_archive_from_crawl_cache() {
    let site = mock_site().await;
    let result = crawl(&site).await;

    let extractor = SiteExtractor::new(&ExtractionOptions::default()).unwrap();
    let mut urls = result.urls.clone();
    urls.push(format!("{}/gone", site.server.url()));
    let extracted = extractor
        .extract_site(&urls, &result.domain, Some(&result), &no_steps)
        .await;

    assert_eq!(extracted.page_count, 5);
    assert_eq!(extracted.pages[0].url, result.urls[0]);
    assert_eq!(extracted.skipped.len(), 1);
    assert!(extracted.skipped[0].url.ends_with("/gone"));

    let markdown = site::to_markdown(&extracted);
    assert!(markdown.contains("## Garden Supplies"));
    assert!(markdown.contains("## Skipped"));

    let archive = site::to_archive(&extracted).unwrap();
    assert!(archive.len() > 2);
    // gzip magic
    assert_eq!(&archive[..2], &[0x1f, 0x8b]);
}

#[tokio::test]
async fn test_invalid_analysis_options_are_rejected() {
    let site = mock_site().await;
    let result = crawl(&site).await;

    let options = AnalysisOptions {
        damping_factor: 1.5,
        ..analysis_options()
    };
    assert!(analyze_site(&result, &options, |_, _, _| {}).await.is_err());
}
