//! Article page extraction.
//!
//! Field policy:
//!
//! | Field | Source | When missing |
//! |-------|--------|--------------|
//! | title | first title-selector match | [`TITLE_NOT_FOUND`] |
//! | date | first date-selector match, parsed with the adapter's format | `None` |
//! | body | paragraphs inside the first body-container match, joined by a blank line | article dropped |

use super::{element_text, first_match};
use crate::models::{ArticleRecord, ArticleUrl, Keywords, TITLE_NOT_FOUND};
use crate::scrapers::{ArticleSelectors, SiteAdapter};
use chrono::{NaiveDate, Utc};
use scraper::{Html, Selector};
use tracing::{debug, instrument};

/// Builds [`ArticleRecord`]s from article markup.
#[derive(Debug, Clone)]
pub struct ArticleExtractor {
    selectors: ArticleSelectors,
}

impl ArticleExtractor {
    pub fn new(adapter: &SiteAdapter) -> Self {
        Self {
            selectors: adapter.article.clone(),
        }
    }

    /// Extract an article, or `None` when the page has no body text.
    ///
    /// The returned record carries empty keywords and `scraped_at = now`.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub fn extract(&self, html: &str, url: &ArticleUrl) -> Option<ArticleRecord> {
        let document = Html::parse_document(html);

        let body = self.body(&document);
        if body.is_empty() {
            debug!("No body text found");
            return None;
        }

        let title = first_match(&document, &self.selectors.title)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| TITLE_NOT_FOUND.to_string());

        let published_date = first_match(&document, &self.selectors.date)
            .map(element_text)
            .and_then(|raw| parse_date(&raw, &self.selectors.date_format));

        Some(ArticleRecord {
            url: url.clone(),
            title,
            published_date,
            body,
            scraped_at: Utc::now(),
            keywords: Keywords::default(),
        })
    }

    fn body(&self, document: &Html) -> String {
        let Some(container) = first_match(document, &self.selectors.body) else {
            return String::new();
        };
        let Ok(paragraph) = Selector::parse(&self.selectors.paragraph) else {
            return String::new();
        };
        container
            .select(&paragraph)
            .map(element_text)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn parse_date(raw: &str, format: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(raw, format) {
        Ok(date) => Some(date),
        Err(e) => {
            debug!(raw, format, error = %e, "Unparsable publish date");
            None
        }
    }
}
