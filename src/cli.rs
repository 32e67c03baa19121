use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crawlscope::config::CrawlOptions;
use crawlscope::Result;

#[derive(Parser, Debug)]
#[command(
    name = "crawlscope",
    version,
    about = "Crawl a site, audit it, and emit sitemaps",
    long_about = "crawlscope crawls a website breadth-first under page, depth and time budgets, \
                  then checks links, duplicate content, uniqueness and link structure."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl a site and report the URLs found
    Crawl {
        url: String,

        #[command(flatten)]
        crawl: CrawlArgs,

        #[arg(long)]
        json: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Crawl a site and render its sitemap
    Sitemap {
        url: String,

        #[command(flatten)]
        crawl: CrawlArgs,

        #[arg(long, value_enum, default_value_t = SitemapFormat::Xml)]
        format: SitemapFormat,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Crawl a site and run every analysis pass
    Analyze {
        url: String,

        #[command(flatten)]
        crawl: CrawlArgs,

        /// JSON file with analysis options (camelCase keys)
        #[arg(long)]
        analysis_options: Option<PathBuf>,

        #[arg(long)]
        json: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Crawl a site and export its structured content
    Extract {
        url: String,

        #[command(flatten)]
        crawl: CrawlArgs,

        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Required for the archive format
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SitemapFormat {
    Xml,
    Html,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Html,
    Markdown,
    Sitemap,
    Archive,
}

/// Crawl flags shared by every subcommand. Flags override `--options`.
#[derive(Args, Debug, Clone, Default)]
pub struct CrawlArgs {
    /// JSON file with crawl options (camelCase keys)
    #[arg(long)]
    pub options: Option<PathBuf>,

    #[arg(long)]
    pub max_pages: Option<usize>,

    #[arg(long)]
    pub max_depth: Option<usize>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-worker pause after each fetch, in ms
    #[arg(long)]
    pub delay: Option<u64>,

    /// Per-request timeout, in ms
    #[arg(long)]
    pub timeout: Option<u64>,

    #[arg(long)]
    pub retries: Option<u32>,

    /// Pause between retries, in ms
    #[arg(long)]
    pub retry_delay: Option<u64>,

    /// Global crawl budget, in ms
    #[arg(long)]
    pub max_duration: Option<u64>,

    #[arg(long)]
    pub follow_external: bool,

    #[arg(long)]
    pub subdomains: bool,

    #[arg(long)]
    pub stylesheets: bool,

    #[arg(long)]
    pub user_agent: Option<String>,
}

impl CrawlArgs {
    pub fn to_options(&self) -> Result<CrawlOptions> {
        let mut options = match &self.options {
            Some(path) => CrawlOptions::from_json_file(path)?,
            None => CrawlOptions::default(),
        };

        if let Some(v) = self.max_pages {
            options.max_pages = v;
        }
        if let Some(v) = self.max_depth {
            options.max_depth = v;
        }
        if let Some(v) = self.concurrency {
            options.concurrent_requests = v;
        }
        if let Some(v) = self.delay {
            options.request_delay = v;
        }
        if let Some(v) = self.timeout {
            options.timeout = v;
        }
        if let Some(v) = self.retries {
            options.retry_count = v;
        }
        if let Some(v) = self.retry_delay {
            options.retry_delay = v;
        }
        if self.max_duration.is_some() {
            options.max_duration = self.max_duration;
        }
        if let Some(v) = &self.user_agent {
            options.user_agent = v.clone();
        }
        options.follow_external_links |= self.follow_external;
        options.include_subdomains |= self.subdomains;
        options.include_stylesheet |= self.stylesheets;

        options.validate()?;
        Ok(options)
    }
}
