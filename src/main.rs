//! # Publication Crawler
//!
//! A bounded, resumable crawl-and-extract pipeline for publication sites.
//! It discovers article links on listing pages, extracts each article's
//! title, publish date and body, computes keyword statistics, and persists
//! the result to a SQLite catalog or a CSV export.
//!
//! ## Features
//!
//! - Declarative site adapters (built-in `bcg` and `arxiv`, more via YAML)
//! - "Load more" expansion with a budget and stagnation detection
//! - Bounded worker pool with a shared request rate limit
//! - Idempotent persistence with periodic checkpoints; restarted runs skip
//!   articles already stored
//!
//! ## Usage
//!
//! ```sh
//! publication_crawler --site bcg --database ./publications.db
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: render listing seeds and collect a deduplicated frontier
//! 2. **Processing**: fetch, extract and summarise articles (parallel, `--workers` at a time)
//! 3. **Persistence**: commit each article atomically, checkpoint every `--batch-size`

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod extract;
mod fetcher;
mod keywords;
mod models;
mod outputs;
mod pipeline;
mod retry;
mod scrapers;
mod utils;

use cli::Cli;
use config::PipelineConfig;
use error::ConfigError;
use fetcher::http::HttpBackend;
use pipeline::IngestionPipeline;
use scrapers::AdapterRegistry;
use utils::ensure_writable_parent;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("publication_crawler starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Site adapter ----
    let mut registry = AdapterRegistry::builtin();
    if let Some(path) = &args.sites_file {
        registry.load_file(path)?;
    }
    let site = registry.resolve(&args.site).inspect_err(|e| {
        error!(site = %args.site, available = ?registry.keys().collect::<Vec<_>>(), error = %e, "Unusable site adapter");
    })?;

    let seeds = if args.seeds.is_empty() {
        site.seeds.clone()
    } else {
        args.seeds.clone()
    };
    if seeds.is_empty() {
        return Err(ConfigError::NoSeeds(site.key.clone()).into());
    }
    info!(site = %site.key, seeds = seeds.len(), "Resolved listing seeds");

    let config = PipelineConfig::from_cli(&args)?;

    // ---- Sink ----
    let target = args.sink_target();
    if let Err(e) = ensure_writable_parent(target.path()).await {
        error!(
            path = %target.path().display(),
            error = %e,
            "Output location is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    let sink = target.open().inspect_err(|e| {
        error!(path = %target.path().display(), error = %e, "Could not open persistence target");
    })?;

    // ---- Backend ----
    let backend = HttpBackend::new(&args.user_agent, config.fetch.page_timeout + Duration::from_secs(5))?;
    let pipeline = IngestionPipeline::new(config, Arc::new(backend))?;

    // ---- Ctrl-C ----
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received; finishing up");
                on_signal.cancel();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    // ---- Run ----
    let summary = pipeline.run(site, &seeds, sink, &cancel).await?;

    match serde_json::to_string(&summary) {
        Ok(json) => info!(summary = %json, "Run summary"),
        Err(e) => warn!(error = %e, "Could not serialise run summary"),
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        discovered = summary.discovered,
        persisted = summary.persisted,
        failed = summary.failed,
        "Execution complete"
    );

    Ok(())
}
