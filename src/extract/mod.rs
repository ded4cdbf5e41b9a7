//! HTML extraction driven by [`crate::scrapers::SiteAdapter`] descriptors.
//!
//! - [`links`]: listing page → ordered, unique article URLs
//! - [`article`]: article page → [`crate::models::ArticleRecord`]
//!
//! Both are total over their input: malformed or missing markup produces an
//! empty result (or `None`), never an error.

pub mod article;
pub mod links;

pub use article::ArticleExtractor;
pub use links::LinkExtractor;

use scraper::{ElementRef, Html, Selector};

/// First element in document order matching any of `candidates`.
pub(crate) fn first_match<'a>(document: &'a Html, candidates: &[String]) -> Option<ElementRef<'a>> {
    if candidates.is_empty() {
        return None;
    }
    let combined = Selector::parse(&candidates.join(", ")).ok()?;
    document.select(&combined).next()
}

/// Text content of an element with whitespace collapsed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    crate::utils::collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}
