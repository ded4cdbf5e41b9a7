//! Rendered page retrieval.
//!
//! A [`RenderBackend`] hands out [`RenderSession`]s; a session is the
//! stateful view of one page (navigation, element counts, clicks). The
//! [`PageFetcher`] drives a session through the listing interaction:
//!
//! 1. Navigate. This and every later session call is bounded by the page
//!    timeout; a call that exceeds it fails the fetch.
//! 2. Poll until the ready selector appears (bounded, non-fatal).
//! 3. Dismiss the consent overlay if one is interactable (non-fatal).
//! 4. Trigger "load more" while it stays interactable and keeps adding
//!    items, up to the attempt budget. Two consecutive triggers that add
//!    nothing count as stagnation and stop the expansion.
//! 5. Return the final document.
//!
//! Waits are condition polls with a deadline rather than fixed sleeps.
//! Nothing is retried here; retry policy belongs to the pipeline.

pub mod http;

use crate::error::FetchError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};

/// Consecutive non-growing triggers after which expansion stops.
pub const STAGNATION_LIMIT: usize = 2;

/// One exclusively-owned rendering session.
#[async_trait]
pub trait RenderSession: Send {
    /// Load `url`, replacing the current document.
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError>;

    /// Current document markup.
    async fn content(&mut self) -> Result<String, FetchError>;

    /// Number of elements matching `selector` in the current document.
    async fn count(&mut self, selector: &str) -> Result<usize, FetchError>;

    /// Whether an element matching `selector` is present and can be triggered.
    async fn is_interactable(&mut self, selector: &str) -> Result<bool, FetchError>;

    /// Trigger the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<(), FetchError>;

    /// Release backend resources held by the session.
    async fn close(&mut self) -> Result<(), FetchError> {
        Ok(())
    }
}

/// Source of rendering sessions.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Open a new session. Failure here is an infrastructure fault.
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, FetchError>;
}

/// Timing bounds applied to every fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPolicy {
    /// Upper bound for each session call: navigation, element lookups,
    /// clicks and reading the document.
    pub page_timeout: Duration,
    /// How long to wait for a condition (readiness, new items) to hold.
    pub settle_timeout: Duration,
    /// Delay between condition probes.
    pub poll_interval: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(30),
            settle_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// What to do on a page after it loads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionPolicy {
    /// Wait until this selector matches before interacting.
    pub ready_selector: Option<String>,
    /// Accept button of the consent overlay.
    pub consent_selector: Option<String>,
    /// The "load more" affordance.
    pub load_more_selector: Option<String>,
    /// Items whose count must grow after each "load more" trigger.
    pub item_selector: Option<String>,
    /// Maximum number of "load more" triggers.
    pub max_load_more: usize,
}

impl InteractionPolicy {
    /// Plain navigation with no interaction, used for article pages.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Why "load more" expansion stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMoreStop {
    NotConfigured,
    Disappeared,
    NotInteractable,
    Stagnated,
    BudgetExhausted,
    Interrupted,
}

/// The final state of a fetched page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
    pub load_more_clicks: usize,
    pub stop: LoadMoreStop,
}

/// Drives a [`RenderSession`] through one page fetch.
#[derive(Debug, Clone, Default)]
pub struct PageFetcher {
    policy: FetchPolicy,
}

impl PageFetcher {
    pub fn new(policy: FetchPolicy) -> Self {
        Self { policy }
    }

    /// Fetch `url` in `session`, applying `interaction`.
    ///
    /// Every session call is bounded by the page timeout. Interaction
    /// failures are logged and skipped, but a call that exceeds the bound
    /// fails the whole fetch with [`FetchError::Timeout`].
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn fetch(
        &self,
        session: &mut dyn RenderSession,
        url: &str,
        interaction: &InteractionPolicy,
    ) -> Result<RenderedPage, FetchError> {
        let t0 = std::time::Instant::now();
        self.bounded(url, session.navigate(url)).await?;

        if let Some(ready) = &interaction.ready_selector {
            self.wait_until_present(session, url, ready).await?;
        }

        if let Some(consent) = &interaction.consent_selector {
            self.dismiss_consent(session, url, consent).await?;
        }

        let (load_more_clicks, stop) = match &interaction.load_more_selector {
            Some(load_more) => self.expand(session, url, load_more, interaction).await?,
            None => (0, LoadMoreStop::NotConfigured),
        };

        let html = self.bounded(url, session.content()).await?;
        debug!(
            bytes = html.len(),
            load_more_clicks,
            ?stop,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );

        Ok(RenderedPage {
            url: url.to_string(),
            html,
            load_more_clicks,
            stop,
        })
    }

    async fn bounded<T>(
        &self,
        url: &str,
        fut: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        match timeout(self.policy.page_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout: self.policy.page_timeout,
            }),
        }
    }

    // A hung session cannot be interacted with any further, so only timeouts
    // escape; other interaction errors are the caller's to tolerate.
    async fn interact<T>(
        &self,
        url: &str,
        fut: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<Result<T, FetchError>, FetchError> {
        match self.bounded(url, fut).await {
            Err(e @ FetchError::Timeout { .. }) => Err(e),
            res => Ok(res),
        }
    }

    async fn wait_until_present(
        &self,
        session: &mut dyn RenderSession,
        url: &str,
        selector: &str,
    ) -> Result<(), FetchError> {
        let deadline = Instant::now() + self.policy.settle_timeout;
        loop {
            match self.interact(url, session.count(selector)).await? {
                Ok(n) if n > 0 => return Ok(()),
                Ok(_) => {}
                Err(e) => {
                    debug!(selector, error = %e, "Readiness probe failed");
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                debug!(selector, "Ready selector never appeared; continuing");
                return Ok(());
            }
            sleep(self.policy.poll_interval).await;
        }
    }

    async fn dismiss_consent(
        &self,
        session: &mut dyn RenderSession,
        url: &str,
        selector: &str,
    ) -> Result<(), FetchError> {
        match self.interact(url, session.is_interactable(selector)).await? {
            Ok(true) => {}
            Ok(false) => {
                debug!(selector, "No consent overlay present");
                return Ok(());
            }
            Err(e) => {
                warn!(selector, error = %e, "Consent overlay lookup failed; continuing");
                return Ok(());
            }
        }

        if let Err(e) = self.interact(url, session.click(selector)).await? {
            warn!(selector, error = %e, "Consent overlay dismissal failed; continuing");
            return Ok(());
        }

        let deadline = Instant::now() + self.policy.settle_timeout;
        while Instant::now() < deadline {
            match self.interact(url, session.is_interactable(selector)).await? {
                Ok(false) | Err(_) => break,
                Ok(true) => sleep(self.policy.poll_interval).await,
            }
        }
        info!(selector, "Dismissed consent overlay");
        Ok(())
    }

    async fn expand(
        &self,
        session: &mut dyn RenderSession,
        url: &str,
        load_more: &str,
        interaction: &InteractionPolicy,
    ) -> Result<(usize, LoadMoreStop), FetchError> {
        let item = interaction.item_selector.as_deref();
        let mut items = match self.interact(url, count_items(session, item)).await? {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Could not count items; skipping load more");
                return Ok((0, LoadMoreStop::Interrupted));
            }
        };

        let mut clicks = 0;
        let mut stagnant = 0;
        loop {
            if clicks >= interaction.max_load_more {
                debug!(clicks, items, "Load more budget exhausted");
                return Ok((clicks, LoadMoreStop::BudgetExhausted));
            }

            match self.interact(url, session.is_interactable(load_more)).await? {
                Ok(true) => {}
                Ok(false) => {
                    debug!(clicks, items, "No more 'load more' affordance");
                    return Ok((clicks, LoadMoreStop::Disappeared));
                }
                Err(e) => {
                    warn!(error = %e, "Load more lookup failed");
                    return Ok((clicks, LoadMoreStop::NotInteractable));
                }
            }

            if let Err(e) = self.interact(url, session.click(load_more)).await? {
                warn!(error = %e, "Load more trigger failed");
                return Ok((clicks, LoadMoreStop::NotInteractable));
            }
            clicks += 1;

            let now = match self.wait_for_growth(session, url, item, items).await? {
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "Item count failed after load more");
                    return Ok((clicks, LoadMoreStop::Interrupted));
                }
            };

            if now > items {
                debug!(clicks, before = items, after = now, "Load more added items");
                items = now;
                stagnant = 0;
            } else {
                stagnant += 1;
                debug!(clicks, stagnant, "Load more added nothing");
                if stagnant >= STAGNATION_LIMIT {
                    return Ok((clicks, LoadMoreStop::Stagnated));
                }
            }
        }
    }

    async fn wait_for_growth(
        &self,
        session: &mut dyn RenderSession,
        url: &str,
        item: Option<&str>,
        baseline: usize,
    ) -> Result<Result<usize, FetchError>, FetchError> {
        let deadline = Instant::now() + self.policy.settle_timeout;
        loop {
            let n = match self.interact(url, count_items(session, item)).await? {
                Ok(n) => n,
                Err(e) => return Ok(Err(e)),
            };
            if n > baseline || Instant::now() >= deadline {
                return Ok(Ok(n));
            }
            sleep(self.policy.poll_interval).await;
        }
    }
}

// Without an item selector growth cannot be observed, so every trigger counts
// as stagnant.
async fn count_items(
    session: &mut dyn RenderSession,
    item: Option<&str>,
) -> Result<usize, FetchError> {
    match item {
        Some(selector) => session.count(selector).await,
        None => Ok(0),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory sessions shared by fetcher and pipeline tests.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    pub const ITEM: &str = "article";
    pub const MORE: &str = "button.more";
    pub const CONSENT: &str = "#accept";

    /// A listing whose "load more" reveals `plan[i]` items on click `i`.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedPage {
        pub html: String,
        pub initial_items: usize,
        pub plan: Vec<usize>,
        pub consent: bool,
        pub consent_fails: bool,
        pub navigate_delay: Option<Duration>,
        /// Every "load more" click takes this long.
        pub click_delay: Option<Duration>,
        /// The first `n` navigations answer 503.
        pub unavailable_first: usize,
    }

    impl ScriptedPage {
        pub fn html(html: impl Into<String>) -> Self {
            Self {
                html: html.into(),
                ..Self::default()
            }
        }
    }

    /// Pages keyed by URL, plus a log of every navigation and click.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedSite {
        pub pages: Arc<HashMap<String, ScriptedPage>>,
        pub visits: Arc<Mutex<Vec<String>>>,
        pub clicks: Arc<Mutex<Vec<String>>>,
        pub fail_open: bool,
        /// Sessions that can be opened before the backend starts failing.
        pub session_limit: Option<usize>,
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
    }

    impl ScriptedSite {
        pub fn new(pages: HashMap<String, ScriptedPage>) -> Self {
            Self {
                pages: Arc::new(pages),
                ..Self::default()
            }
        }

        pub fn visits(&self) -> Vec<String> {
            self.visits.lock().unwrap().clone()
        }

        pub fn clicks(&self) -> Vec<String> {
            self.clicks.lock().unwrap().clone()
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RenderBackend for ScriptedSite {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn open_session(&self) -> Result<Box<dyn RenderSession>, FetchError> {
            let exhausted = self.session_limit.is_some_and(|limit| self.opened() >= limit);
            if self.fail_open || exhausted {
                return Err(FetchError::Backend("browser failed to start".into()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSession {
                site: self.clone(),
                current: None,
                items: 0,
                plan: VecDeque::new(),
                consent: false,
            }))
        }
    }

    pub struct ScriptedSession {
        site: ScriptedSite,
        current: Option<ScriptedPage>,
        items: usize,
        plan: VecDeque<usize>,
        consent: bool,
    }

    impl ScriptedSession {
        pub fn open(page: ScriptedPage, url: &str) -> Self {
            let mut pages = HashMap::new();
            pages.insert(url.to_string(), page);
            Self {
                site: ScriptedSite::new(pages),
                current: None,
                items: 0,
                plan: VecDeque::new(),
                consent: false,
            }
        }
    }

    #[async_trait]
    impl RenderSession for ScriptedSession {
        async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
            let attempt = {
                let mut visits = self.site.visits.lock().unwrap();
                visits.push(url.to_string());
                visits.iter().filter(|v| *v == url).count()
            };
            let page = self
                .site
                .pages
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })?;
            if attempt <= page.unavailable_first {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }
            if let Some(delay) = page.navigate_delay {
                sleep(delay).await;
            }
            self.items = page.initial_items;
            self.plan = page.plan.iter().copied().collect();
            self.consent = page.consent;
            self.current = Some(page);
            Ok(())
        }

        async fn content(&mut self) -> Result<String, FetchError> {
            self.current
                .as_ref()
                .map(|p| p.html.clone())
                .ok_or_else(|| FetchError::Backend("no page loaded".into()))
        }

        async fn count(&mut self, selector: &str) -> Result<usize, FetchError> {
            Ok(if selector == ITEM { self.items } else { 0 })
        }

        async fn is_interactable(&mut self, selector: &str) -> Result<bool, FetchError> {
            let page = self.current.as_ref();
            match selector {
                MORE => Ok(!self.plan.is_empty()),
                CONSENT if page.is_some_and(|p| p.consent_fails) => {
                    Err(FetchError::ElementNotFound(selector.into()))
                }
                CONSENT => Ok(self.consent),
                _ => Ok(false),
            }
        }

        async fn click(&mut self, selector: &str) -> Result<(), FetchError> {
            self.site.clicks.lock().unwrap().push(selector.to_string());
            match selector {
                MORE => {
                    if let Some(delay) = self.current.as_ref().and_then(|p| p.click_delay) {
                        sleep(delay).await;
                    }
                    let added = self
                        .plan
                        .pop_front()
                        .ok_or_else(|| FetchError::ElementNotFound(selector.into()))?;
                    self.items += added;
                    Ok(())
                }
                CONSENT => {
                    self.consent = false;
                    Ok(())
                }
                _ => Err(FetchError::ElementNotFound(selector.into())),
            }
        }

        async fn close(&mut self) -> Result<(), FetchError> {
            self.site.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
