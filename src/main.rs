// src/main.rs

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands, ExportFormat, SitemapFormat};
use crawlscope::config::{AnalysisOptions, CrawlOptions, ExtractionOptions};
use crawlscope::domain::models::{CrawlProgress, CrawlResult};
use crawlscope::export::{self, site};
use crawlscope::lifecycle;
use crawlscope::service::analysis::{analyze_site, SiteReport};
use crawlscope::service::progress::no_steps;
use crawlscope::service::{start_crawl, SiteExtractor};

#[tokio::main]
async fn main() {
    lifecycle::init_logging();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            url,
            crawl,
            json,
            output,
        } => {
            let result = crawl_with_progress(&url, crawl.to_options()?).await?;
            let text = if json {
                serde_json::to_string_pretty(&result)?
            } else {
                crawl_summary(&result)
            };
            emit(&text, output.as_deref())?;
            Ok(crawl_exit_code(&result))
        }
        Commands::Sitemap {
            url,
            crawl,
            format,
            output,
        } => {
            let result = crawl_with_progress(&url, crawl.to_options()?).await?;
            let text = match format {
                SitemapFormat::Xml => export::render_xml(&result.urls)?,
                SitemapFormat::Html => export::render_html(&result.domain, &result.urls),
                SitemapFormat::Csv => export::render_csv(&result.urls)?,
            };
            emit(&text, output.as_deref())?;
            Ok(crawl_exit_code(&result))
        }
        Commands::Analyze {
            url,
            crawl,
            analysis_options,
            json,
            output,
        } => {
            let analysis = match analysis_options {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    AnalysisOptions::from_json_str(&raw)?
                }
                None => AnalysisOptions::default(),
            };
            let result = crawl_with_progress(&url, crawl.to_options()?).await?;
            let report = analyze_site(&result, &analysis, |stage, current, total| {
                tracing::debug!("[ANALYSIS] {} {}/{}", stage.as_str(), current, total);
            })
            .await?;

            let text = if json {
                serde_json::to_string_pretty(&report)?
            } else {
                report_summary(&report)
            };
            emit(&text, output.as_deref())?;
            Ok(if report.has_issues() { 1 } else { crawl_exit_code(&result) })
        }
        Commands::Extract {
            url,
            crawl,
            format,
            output,
        } => {
            let result = crawl_with_progress(&url, crawl.to_options()?).await?;
            let extractor = SiteExtractor::new(&ExtractionOptions::default())?;
            let extracted = extractor
                .extract_site(&result.urls, &result.domain, Some(&result), &no_steps)
                .await;

            match format {
                ExportFormat::Archive => {
                    let path = output.context("--output is required for the archive format")?;
                    let bytes = site::to_archive(&extracted)?;
                    std::fs::write(&path, bytes)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("Wrote {}", path.display());
                }
                format => {
                    let text = match format {
                        ExportFormat::Json => site::to_json(&extracted)?,
                        ExportFormat::Html => site::to_html(&extracted),
                        ExportFormat::Markdown => site::to_markdown(&extracted),
                        _ => site::to_sitemap_xml(&extracted)?,
                    };
                    emit(&text, output.as_deref())?;
                }
            }
            Ok(if extracted.skipped.is_empty() { crawl_exit_code(&result) } else { 1 })
        }
    }
}

/// Crawl with a progress line on stderr; Ctrl-C cancels and keeps the
/// partial result.
async fn crawl_with_progress(url: &str, options: CrawlOptions) -> Result<CrawlResult> {
    let reporter = |p: CrawlProgress| {
        eprint!("\r[{}/{}] {:<80.80}", p.scanned, p.estimated_total, p.current_url);
    };
    let session = start_crawl(url, options, reporter)?;

    let canceler = session.canceler();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling, waiting for in-flight requests...");
            canceler.cancel();
        }
    });

    let result = session.wait().await?;
    eprintln!();
    Ok(result)
}

fn crawl_exit_code(result: &CrawlResult) -> i32 {
    if result.is_complete() && result.broken_links.is_empty() {
        0
    } else {
        1
    }
}

fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn crawl_summary(result: &CrawlResult) -> String {
    let mut lines = vec![
        format!("Domain:      {}", result.domain),
        format!("Outcome:     {}", result.outcome.state().as_str()),
        format!("Pages:       {}", result.page_count),
        format!("Max depth:   {}", result.max_depth_reached),
        format!("External:    {}", result.external_urls.len()),
        format!("Broken:      {}", result.broken_links.len()),
        format!("Duration:    {}ms", result.duration_ms()),
    ];
    if let Some(reason) = result.failure_reason() {
        lines.push(format!("Reason:      {}", reason));
    }
    if let Some(budget) = result.budget_exhausted {
        lines.push(format!("Budget hit:  {:?}", budget));
    }
    lines.push(String::new());
    lines.extend(result.urls.iter().map(|u| format!("  {}", u)));
    for broken in &result.broken_links {
        lines.push(format!(
            "  BROKEN {} {} (from {})",
            broken.status_code,
            broken.url,
            broken.from_page.as_deref().unwrap_or("-")
        ));
    }
    lines.join("\n")
}

fn report_summary(report: &SiteReport) -> String {
    let mut lines = vec![
        format!("Domain:            {}", report.domain),
        format!(
            "Links checked:     {} ({} broken, {} redirects)",
            report.links.checked,
            report.links.broken.len(),
            report.links.redirects.len()
        ),
        format!("Duplicate content: {} groups", report.duplicate_pages.len()),
        format!("Duplicate meta:    {} groups", report.duplicate_meta.len()),
        format!(
            "Uniqueness:        {:.1}% ({}/{} pages)",
            report.content.overall_uniqueness, report.content.unique_pages, report.content.total_pages
        ),
        format!(
            "robots.txt:        {}",
            if report.resources.robots_txt.exists() { "yes" } else { "no" }
        ),
        format!(
            "sitemap.xml:       {} ({} URLs, {} unreached)",
            if report.resources.sitemap_xml.exists() { "yes" } else { "no" },
            report.resources.sitemap_url_count,
            report.resources.unreached_sitemap_urls.len()
        ),
        format!("HTTPS:             {}", if report.resources.ssl { "yes" } else { "no" }),
        String::new(),
        "Top pages by rank:".to_string(),
    ];

    let mut nodes: Vec<_> = report.structure.nodes.iter().collect();
    nodes.sort_by(|a, b| b.page_rank.total_cmp(&a.page_rank));
    for node in nodes.iter().take(10) {
        lines.push(format!(
            "  {:>6.2}  in {:>3}  out {:>3}  {}",
            node.page_rank, node.incoming_links, node.outgoing_links, node.url
        ));
    }
    for broken in &report.links.broken {
        lines.push(format!(
            "  BROKEN {} {} (from {})",
            broken.status_code,
            broken.url,
            broken.from_page.as_deref().unwrap_or("-")
        ));
    }
    lines.join("\n")
}
