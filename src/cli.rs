//! Command-line interface definitions for the publication crawler.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! The site key and database path can also come from environment variables.

use crate::outputs::SinkTarget;
use clap::Parser;
use std::path::PathBuf;

/// User agent sent with every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("publication_crawler/", env!("CARGO_PKG_VERSION"));

/// Command-line arguments for the publication crawler.
///
/// # Examples
///
/// ```sh
/// # Crawl the built-in BCG listings into ./publications.db
/// publication_crawler
///
/// # Crawl one arXiv listing into a CSV file, four workers
/// publication_crawler --site arxiv --csv ./arxiv.csv --workers 4 \
///     "https://arxiv.org/search/?query=quantum&searchtype=title"
///
/// # Site adapters from a file, re-scraping everything already stored
/// publication_crawler --sites-file ./sites.yaml --site example --refresh
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Listing page URLs to crawl (defaults to the adapter's own seeds)
    pub seeds: Vec<String>,

    /// Site adapter key
    #[arg(short, long, env = "PUBCRAWL_SITE", default_value = "bcg")]
    pub site: String,

    /// YAML file with additional site adapters
    #[arg(long)]
    pub sites_file: Option<PathBuf>,

    /// SQLite database path
    #[arg(short, long, env = "PUBCRAWL_DATABASE", default_value = "publications.db")]
    pub database: PathBuf,

    /// Export to this CSV file instead of the database
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Concurrent article workers (one rendering session each)
    #[arg(short, long, default_value_t = 2)]
    pub workers: usize,

    /// Articles persisted between checkpoints
    #[arg(long, default_value_t = 5)]
    pub batch_size: usize,

    /// Override the adapter's "load more" budget per listing page
    #[arg(long)]
    pub max_load_more: Option<usize>,

    /// Per-page render/load timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Retries for transient fetch failures
    #[arg(long, default_value_t = 2)]
    pub retries: usize,

    /// Delay before the first retry in milliseconds; doubles on each further retry
    #[arg(long, default_value_t = 500)]
    pub retry_delay_ms: u64,

    /// Page requests per minute across all workers
    #[arg(long, default_value_t = 30)]
    pub requests_per_minute: u32,

    /// Keywords kept per article
    #[arg(long, default_value_t = 15)]
    pub top_keywords: usize,

    /// Re-scrape articles that are already persisted
    #[arg(long)]
    pub refresh: bool,

    /// User-Agent header for page requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl Cli {
    /// Persistence target: the CSV file when given, the database otherwise.
    pub fn sink_target(&self) -> SinkTarget {
        match &self.csv {
            Some(path) => SinkTarget::Csv(path.clone()),
            None => SinkTarget::Sqlite(self.database.clone()),
        }
    }
}
