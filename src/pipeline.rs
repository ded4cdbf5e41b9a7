//! Crawl orchestration: listing discovery, article processing, persistence.
//!
//! A run has two phases.
//!
//! 1. **Discovery.** Listing seeds are rendered one after another in a single
//!    session ("load more" state lives in the session) and their links are
//!    merged into one frontier, deduplicated across seeds.
//! 2. **Processing.** Up to `workers` articles are fetched, extracted and
//!    summarised concurrently, each on its own session from a pool. Results
//!    are consumed in frontier order by a single writer that persists them
//!    and checkpoints the sink every `batch_size` records.
//!
//! URLs the sink already holds are skipped unless `refresh_existing` is set,
//! so a restarted run picks up after the last checkpoint. Per-article faults
//! are counted and logged; only failing to acquire a session or to use the
//! sink at all aborts the run. The sink and every opened session are closed
//! on every exit path.
//!
//! Sink calls are synchronous; on a multi-threaded runtime they run under
//! [`tokio::task::block_in_place`] so in-flight fetches keep making progress.

use crate::config::PipelineConfig;
use crate::error::{FetchError, PipelineError};
use crate::extract::{ArticleExtractor, LinkExtractor};
use crate::fetcher::{InteractionPolicy, PageFetcher, RenderBackend, RenderSession, RenderedPage};
use crate::keywords::KeywordSummarizer;
use crate::models::{ArticleRecord, ArticleUrl, ListingPage, RunSummary};
use crate::outputs::Sink;
use crate::scrapers::SiteAdapter;
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use itertools::Itertools;
use std::num::NonZeroU32;
use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

type SessionPool = Mutex<Vec<Box<dyn RenderSession>>>;

/// What one article task produced.
enum ArticleOutcome {
    Extracted(ArticleRecord),
    Failed,
    Cancelled,
}

// block_in_place panics on a current-thread runtime, where there is no other
// worker to hand the scheduler to anyway.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

async fn close_sessions(sessions: Vec<Box<dyn RenderSession>>) {
    for mut session in sessions {
        if let Err(e) = session.close().await {
            debug!(error = %e, "Closing rendering session failed");
        }
    }
}

/// Runs crawls against one rendering backend.
pub struct IngestionPipeline {
    config: PipelineConfig,
    backend: Arc<dyn RenderBackend>,
    fetcher: PageFetcher,
    summarizer: KeywordSummarizer,
    limiter: DefaultDirectRateLimiter,
}

impl IngestionPipeline {
    pub fn new(config: PipelineConfig, backend: Arc<dyn RenderBackend>) -> Result<Self, PipelineError> {
        config.validate()?;
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            fetcher: PageFetcher::new(config.fetch.clone()),
            summarizer: KeywordSummarizer::with_top_n(config.top_keywords),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            config,
            backend,
        })
    }

    /// Crawl `seeds` with `site`'s adapter into `sink`.
    ///
    /// Returns the run's counts, including when `cancel` fires mid-run.
    /// Errors only on infrastructure faults; the sink is closed either way.
    #[instrument(level = "info", skip_all, fields(site = %site.key, backend = self.backend.name(), sink = %sink.describe()))]
    pub async fn run(
        &self,
        site: &SiteAdapter,
        seeds: &[String],
        mut sink: Box<dyn Sink>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let t0 = Instant::now();
        let result = self.crawl(site, seeds, sink.as_mut(), cancel).await;

        match (result, sink.close()) {
            (Ok(summary), Ok(())) => {
                info!(
                    discovered = summary.discovered,
                    already_persisted = summary.already_persisted,
                    persisted = summary.persisted,
                    failed = summary.failed,
                    listing_failures = summary.listing_failures,
                    cancelled = summary.cancelled,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Run finished"
                );
                Ok(summary)
            }
            (Ok(_), Err(e)) => {
                error!(error = %e, "Closing the sink failed");
                Err(PipelineError::Sink(e))
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "Closing the sink failed after a fatal error");
                }
                error!(error = %e, "Run aborted");
                Err(e)
            }
        }
    }

    async fn crawl(
        &self,
        site: &SiteAdapter,
        seeds: &[String],
        sink: &mut dyn Sink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let links = LinkExtractor::new(site)?;
        let articles = ArticleExtractor::new(site);
        let mut summary = RunSummary::default();

        let known = sink.known_urls().map_err(PipelineError::Sink)?;
        debug!(known = known.len(), "Loaded persisted URLs");

        // --- Discovery ---
        let listings = self.discover(site, seeds, &links, cancel, &mut summary).await?;
        for page in &listings {
            debug!(listing = %page.url, load_more_clicks = page.load_more_clicks, links = page.links.len(), "Listing links");
        }
        let frontier: Vec<ArticleUrl> = listings
            .iter()
            .flat_map(|page| page.links.iter().cloned())
            .unique()
            .collect();
        summary.discovered = frontier.len();

        let (pending, skipped): (Vec<ArticleUrl>, Vec<ArticleUrl>) = frontier
            .into_iter()
            .partition(|url| self.config.refresh_existing || !known.contains(url.as_str()));
        summary.already_persisted = skipped.len();
        info!(
            discovered = summary.discovered,
            pending = pending.len(),
            already_persisted = summary.already_persisted,
            "Frontier built"
        );

        if summary.cancelled || pending.is_empty() {
            return Ok(summary);
        }

        // --- Processing ---
        let mut sessions = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers.min(pending.len()) {
            match self.backend.open_session().await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    close_sessions(sessions).await;
                    return Err(PipelineError::Backend(e));
                }
            }
        }
        let pool: SessionPool = Mutex::new(sessions);

        let source = site.source_record();
        let batch_size = self.config.batch_size;
        let mut since_checkpoint = 0usize;

        {
            let pool = &pool;
            let articles = &articles;
            let mut results = pin!(
                stream::iter(pending)
                    .map(move |url| self.process_article(url, pool, articles, cancel))
                    .buffered(self.config.workers)
            );

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!(persisted = summary.persisted, "Cancellation requested; abandoning in-flight articles");
                        summary.cancelled = true;
                        break;
                    }
                    next = results.next() => next,
                };
                let Some(outcome) = next else { break };

                let record = match outcome {
                    ArticleOutcome::Extracted(record) => record,
                    ArticleOutcome::Failed => {
                        summary.failed += 1;
                        continue;
                    }
                    ArticleOutcome::Cancelled => continue,
                };

                match blocking(|| sink.persist(&source, &record)) {
                    Ok(id) => {
                        summary.persisted += 1;
                        since_checkpoint += 1;
                        debug!(url = %record.url, id, "Article persisted");
                    }
                    Err(e) => {
                        summary.failed += 1;
                        warn!(url = %record.url, stage = "persist", error = %e, "Persisting article failed; skipping");
                    }
                }

                if since_checkpoint >= batch_size {
                    since_checkpoint = 0;
                    match blocking(|| sink.checkpoint()) {
                        Ok(()) => info!(persisted = summary.persisted, "Checkpoint committed"),
                        Err(e) => warn!(error = %e, "Checkpoint failed; retrying after the next batch"),
                    }
                }
            }

            // In-flight tasks see the cancellation and hand their sessions
            // back; what they produced is dropped unpersisted.
            if summary.cancelled {
                while results.next().await.is_some() {}
            }
        }

        close_sessions(pool.into_inner()).await;
        blocking(|| sink.checkpoint()).map_err(PipelineError::Sink)?;
        Ok(summary)
    }

    /// Render every seed in one session and extract its links.
    async fn discover(
        &self,
        site: &SiteAdapter,
        seeds: &[String],
        links: &LinkExtractor,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<Vec<ListingPage>, PipelineError> {
        let mut policy = site.listing_policy();
        if let Some(max) = self.config.max_load_more {
            policy.max_load_more = max;
        }

        let session = self.backend.open_session().await.map_err(PipelineError::Backend)?;
        let session = Mutex::new(session);
        let mut listings = Vec::with_capacity(seeds.len());

        for seed in seeds {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                fetched = self.fetch_with_retry(&session, seed, &policy) => fetched,
            };

            match fetched {
                Ok(page) => {
                    let found = links.extract(&page.html);
                    info!(
                        seed = %seed,
                        title = LinkExtractor::page_title(&page.html).as_deref().unwrap_or(""),
                        load_more_clicks = page.load_more_clicks,
                        stop = ?page.stop,
                        links = found.len(),
                        "Listing page crawled"
                    );
                    listings.push(ListingPage {
                        url: page.url,
                        load_more_clicks: page.load_more_clicks,
                        links: found,
                    });
                }
                Err(e) => {
                    summary.listing_failures += 1;
                    warn!(seed = %seed, stage = "listing", error = %e, "Listing page failed; skipping seed");
                }
            }
        }

        if let Err(e) = session.into_inner().close().await {
            debug!(error = %e, "Closing listing session failed");
        }
        Ok(listings)
    }

    /// Fetch, extract and summarise one article.
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn process_article(
        &self,
        url: ArticleUrl,
        pool: &SessionPool,
        articles: &ArticleExtractor,
        cancel: &CancellationToken,
    ) -> ArticleOutcome {
        if cancel.is_cancelled() {
            return ArticleOutcome::Cancelled;
        }
        let lease = match self.lease(pool).await {
            Ok(session) => session,
            Err(e) => {
                warn!(%url, stage = "session", error = %e, "No rendering session available; skipping article");
                return ArticleOutcome::Failed;
            }
        };

        let session = Mutex::new(lease);
        let no_interaction = InteractionPolicy::none();
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            fetched = self.fetch_with_retry(&session, url.as_str(), &no_interaction) => Some(fetched),
        };
        pool.lock().await.push(session.into_inner());

        let Some(fetched) = fetched else {
            debug!(%url, "Article abandoned on cancellation");
            return ArticleOutcome::Cancelled;
        };

        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                warn!(%url, stage = "fetch", error = %e, "Article fetch failed; skipping");
                return ArticleOutcome::Failed;
            }
        };

        let Some(mut record) = articles.extract(&page.html, &url) else {
            warn!(
                %url,
                stage = "extract",
                preview = %truncate_for_log(&page.html, 200),
                "No article body found; skipping"
            );
            return ArticleOutcome::Failed;
        };

        record.keywords = self.summarizer.summarize(&record.body);
        debug!(title = %record.title, keywords = record.keywords.len(), "Article extracted");
        ArticleOutcome::Extracted(record)
    }

    async fn lease(&self, pool: &SessionPool) -> Result<Box<dyn RenderSession>, FetchError> {
        let pooled = pool.lock().await.pop();
        match pooled {
            Some(session) => Ok(session),
            None => self.backend.open_session().await,
        }
    }

    /// Rate-limited fetch, retried on transient faults.
    async fn fetch_with_retry(
        &self,
        session: &Mutex<Box<dyn RenderSession>>,
        url: &str,
        policy: &InteractionPolicy,
    ) -> Result<RenderedPage, FetchError> {
        let fetcher = &self.fetcher;
        let limiter = &self.limiter;
        self.config
            .backoff
            .retry(url, move || async move {
                limiter.until_ready().await;
                let mut guard = session.lock().await;
                fetcher.fetch(&mut **guard, url, policy).await
            })
            .await
    }
}
