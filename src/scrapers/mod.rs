//! Per-site adapters describing how to crawl a publication site.
//!
//! An adapter is declarative: it names the listing seeds, the CSS selectors
//! for article blocks, links, titles, dates and bodies, the date format, and
//! the "load more" and consent affordances. The extractors in
//! [`crate::extract`] interpret these descriptors, so adding a site means
//! adding configuration rather than code.
//!
//! # Built-in adapters
//!
//! | Key | Module | Listing | Notes |
//! |-----|--------|---------|-------|
//! | `bcg` | [`bcg`] | `/publications` listing | Consent banner, "View more" button |
//! | `arxiv` | [`arxiv`] | Title search results | Pagination via "next" anchor |
//!
//! Further adapters can be supplied in a YAML file (see
//! [`AdapterRegistry::load_file`]); file entries override built-ins with the
//! same key.

pub mod arxiv;
pub mod bcg;

use crate::error::ConfigError;
use crate::fetcher::InteractionPolicy;
use crate::models::{SourceRecord, SourceType};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};
use url::Url;

/// Default number of "load more" expansions per listing page.
pub const DEFAULT_MAX_LOAD_MORE: usize = 10;

/// Declarative description of one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteAdapter {
    /// Lookup key, e.g. `"bcg"`.
    pub key: String,
    /// Stored as `URL.source_name`.
    pub source_name: String,
    #[serde(default)]
    pub source_type: SourceType,
    /// Stored as `ScrapedData.field_id`.
    #[serde(default)]
    pub field_id: i64,
    /// Scheme-qualified origin used to resolve relative links.
    pub origin: String,
    /// Listing pages crawled when none are given on the command line.
    #[serde(default)]
    pub seeds: Vec<String>,
    pub listing: ListingSelectors,
    pub article: ArticleSelectors,
}

/// How to find article links on a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Selector for one article block; also counts loaded items.
    pub article_block: String,
    /// Substring an anchor target must contain to count as an article link.
    pub link_pattern: String,
    /// The "load more" affordance, if the listing paginates in place.
    #[serde(default)]
    pub load_more: Option<String>,
    /// The consent-overlay accept button, if the site shows one.
    #[serde(default)]
    pub consent: Option<String>,
    #[serde(default = "default_max_load_more")]
    pub max_load_more: usize,
}

/// How to pull fields out of an article page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSelectors {
    /// Candidate title selectors; the first match in document order wins.
    pub title: Vec<String>,
    /// Candidate date selectors; the first match in document order wins.
    #[serde(default)]
    pub date: Vec<String>,
    /// `chrono` format for the raw date text, e.g. `%B %d, %Y`.
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Candidate body-container selectors.
    pub body: Vec<String>,
    /// Paragraph selector applied inside the body container.
    #[serde(default = "default_paragraph")]
    pub paragraph: String,
}

fn default_max_load_more() -> usize {
    DEFAULT_MAX_LOAD_MORE
}

fn default_date_format() -> String {
    "%B %d, %Y".to_string()
}

fn default_paragraph() -> String {
    "p".to_string()
}

impl SiteAdapter {
    /// Parsed origin. Valid after [`SiteAdapter::validate`].
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin).map_err(|source| ConfigError::InvalidUrl {
            site: self.key.clone(),
            url: self.origin.clone(),
            source,
        })
    }

    /// Provenance written alongside every article from this site.
    pub fn source_record(&self) -> SourceRecord {
        SourceRecord {
            source_name: self.source_name.clone(),
            source_type: self.source_type,
            field_id: self.field_id,
        }
    }

    /// Interaction policy for this site's listing pages.
    pub fn listing_policy(&self) -> InteractionPolicy {
        InteractionPolicy {
            ready_selector: Some(self.listing.article_block.clone()),
            consent_selector: self.listing.consent.clone(),
            load_more_selector: self.listing.load_more.clone(),
            item_selector: Some(self.listing.article_block.clone()),
            max_load_more: self.listing.max_load_more,
        }
    }

    /// Check that the origin and seeds are absolute URLs and every selector parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin_url()?;
        for seed in &self.seeds {
            Url::parse(seed).map_err(|source| ConfigError::InvalidUrl {
                site: self.key.clone(),
                url: seed.clone(),
                source,
            })?;
        }

        let listing = [Some(&self.listing.article_block), self.listing.load_more.as_ref(), self.listing.consent.as_ref()];
        let article = self
            .article
            .title
            .iter()
            .chain(&self.article.date)
            .chain(&self.article.body)
            .chain(std::iter::once(&self.article.paragraph));

        for selector in listing.into_iter().flatten().chain(article) {
            Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
                site: self.key.clone(),
                selector: selector.clone(),
                reason: e.to_string(),
            })?;
        }

        if self.article.title.is_empty() || self.article.body.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "adapter '{}' needs at least one title and one body selector",
                self.key
            )));
        }
        Ok(())
    }
}

/// Adapter file layout: a list under `sites:`.
#[derive(Debug, Deserialize)]
struct AdapterFile {
    sites: Vec<SiteAdapter>,
}

/// Adapters keyed by site identifier.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, SiteAdapter>,
}

impl AdapterRegistry {
    /// Registry holding the built-in adapters.
    pub fn builtin() -> Self {
        let adapters = [bcg::adapter(), arxiv::adapter()]
            .into_iter()
            .map(|a| (a.key.clone(), a))
            .collect();
        Self { adapters }
    }

    /// Merge adapters from a YAML string; entries replace same-key adapters.
    pub fn merge_yaml(&mut self, yaml: &str) -> Result<usize, ConfigError> {
        let file: AdapterFile = serde_yaml::from_str(yaml)?;
        let count = file.sites.len();
        for adapter in file.sites {
            adapter.validate()?;
            debug!(key = %adapter.key, "Registered site adapter");
            self.adapters.insert(adapter.key.clone(), adapter);
        }
        Ok(count)
    }

    /// Merge adapters from a YAML file on disk.
    #[instrument(level = "info", skip(self), fields(path = %path.display()))]
    pub fn load_file(&mut self, path: &Path) -> Result<usize, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        let count = self.merge_yaml(&yaml)?;
        info!(count, "Loaded site adapters from file");
        Ok(count)
    }

    /// Look up an adapter and validate it.
    pub fn resolve(&self, key: &str) -> Result<&SiteAdapter, ConfigError> {
        let adapter = self
            .adapters
            .get(key)
            .ok_or_else(|| ConfigError::UnknownSite(key.to_string()))?;
        adapter.validate()?;
        Ok(adapter)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}
