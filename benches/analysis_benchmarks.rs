// benches/analysis_benchmarks.rs
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::{hint::black_box, sync::Arc, time::Duration};
use tokio::runtime::Runtime;

use async_trait::async_trait;
use chrono::Utc;
use crawlscope::config::{AnalysisOptions, CrawlOptions};
use crawlscope::domain::models::{Headings, MetaTags, PageLinks, PageRecord};
use crawlscope::extractor::page_extractor::content_hash;
use crawlscope::service::analysis::{analyze_structure, analyze_uniqueness};
use crawlscope::service::http::{FetchResponse, PageFetcher};
use crawlscope::service::progress::{no_steps, NoopReporter};
use crawlscope::service::Crawler;
use crawlscope::CrawlTarget;

const VOCABULARY: [&str; 12] = [
    "crawler", "frontier", "anchor", "sitemap", "robots", "canonical", "redirect", "heading",
    "budget", "depth", "worker", "scope",
];

fn synthetic_site(pages: usize) -> Vec<PageRecord> {
    (0..pages)
        .map(|i| {
            let url = format!("https://bench.test/p{}", i);
            let text: String = (0..120)
                .map(|w| VOCABULARY[(i * 7 + w * (i % 5 + 1)) % VOCABULARY.len()])
                .collect::<Vec<_>>()
                .join(" ");
            let internal = (1..=4)
                .map(|step| format!("https://bench.test/p{}", (i + step * 13) % pages))
                .collect();
            PageRecord {
                url: url.clone(),
                status_code: 200,
                final_url: url,
                content_type: Some("text/html".to_string()),
                depth: 1,
                title: Some(format!("Page {}", i)),
                headings: Headings::default(),
                links: PageLinks {
                    internal,
                    external: Vec::new(),
                },
                anchors: Vec::new(),
                images: Vec::new(),
                meta: MetaTags::default(),
                word_count: 120,
                content_hash: content_hash(&text),
                content_length: text.len(),
                text,
                fetch_duration_ms: 1,
                extracted_at: Utc::now(),
            }
        })
        .collect()
}

fn bench_uniqueness(c: &mut Criterion) {
    let mut group = c.benchmark_group("uniqueness");
    for pages in [100usize, 300, 1000] {
        let records = synthetic_site(pages);
        let options = AnalysisOptions::default();
        group.bench_with_input(BenchmarkId::from_parameter(pages), &records, |b, records| {
            b.iter(|| black_box(analyze_uniqueness(black_box(records), &options, &no_steps)));
        });
    }
    group.finish();
}

fn bench_page_rank(c: &mut Criterion) {
    let records = synthetic_site(2000);
    let options = AnalysisOptions::default();
    c.bench_function("page_rank_2000", |b| {
        b.iter(|| black_box(analyze_structure(black_box(&records), &options, &no_steps)));
    });
}

/// Every page links to the next ten; served from memory.
struct MemorySite;

#[async_trait]
impl PageFetcher for MemorySite {
    async fn fetch(&self, url: &str) -> crawlscope::Result<FetchResponse> {
        let n: usize = url.rsplit('p').next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let body: String = (1..=10)
            .map(|k| format!(r#"<a href="/p{}">next</a>"#, n + k))
            .collect();
        Ok(FetchResponse {
            status_code: 200,
            final_url: url::Url::parse(url).map_err(|e| crawlscope::AppError::InvalidUrl(e.to_string()))?,
            body,
            content_type: Some("text/html".to_string()),
            location: None,
            duration: Duration::ZERO,
            attempts: 1,
        })
    }
}

fn bench_crawl(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let target = CrawlTarget::parse("https://bench.test/p0").unwrap();

    c.bench_function("crawl_500_in_memory", |b| {
        b.to_async(&rt).iter(|| async {
            let options = CrawlOptions {
                max_pages: 500,
                max_depth: 100,
                concurrent_requests: 8,
                ..Default::default()
            };
            let crawler = Crawler::new(target.clone(), options, Arc::new(MemorySite));
            black_box(crawler.crawl(&NoopReporter).await)
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(10)
        .measurement_time(Duration::from_secs(10));
    targets = bench_uniqueness, bench_page_rank, bench_crawl
}

criterion_main!(benches);
