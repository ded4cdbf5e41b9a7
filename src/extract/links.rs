//! Listing page link extraction.
//!
//! Each article block contributes at most one URL: the first anchor whose
//! resolved target contains the adapter's link pattern. Relative targets are
//! resolved against the site origin. A URL already seen earlier on the page
//! is skipped, and later anchors in the same block are not consulted.

use super::first_match;
use crate::error::ConfigError;
use crate::models::ArticleUrl;
use crate::scrapers::SiteAdapter;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Extracts article URLs from listing markup.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    origin: Url,
    article_block: String,
    link_pattern: String,
}

impl LinkExtractor {
    pub fn new(adapter: &SiteAdapter) -> Result<Self, ConfigError> {
        Ok(Self {
            origin: adapter.origin_url()?,
            article_block: adapter.listing.article_block.clone(),
            link_pattern: adapter.listing.link_pattern.clone(),
        })
    }

    /// Unique article URLs in first-seen order.
    pub fn extract(&self, html: &str) -> Vec<ArticleUrl> {
        let (Ok(block), Ok(anchor)) = (
            Selector::parse(&self.article_block),
            Selector::parse("a[href]"),
        ) else {
            return Vec::new();
        };

        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut urls = Vec::new();

        for article in document.select(&block) {
            let first = article
                .select(&anchor)
                .filter_map(|a| a.value().attr("href"))
                .filter_map(|href| ArticleUrl::resolve(&self.origin, href))
                .find(|url| url.as_str().contains(&self.link_pattern));

            if let Some(url) = first {
                if seen.insert(url.clone()) {
                    urls.push(url);
                } else {
                    debug!(%url, "Skipping duplicate article link");
                }
            }
        }
        urls
    }

    /// Title of the listing page, for logs.
    pub fn page_title(html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        first_match(&document, &["title".to_string()]).map(super::element_text)
    }
}
