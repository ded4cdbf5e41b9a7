//! Data models shared by the crawl, extraction, and persistence stages.
//!
//! - [`ArticleUrl`]: a normalised, absolute article URL used as the dedup key
//! - [`ListingPage`]: what one listing seed yielded during discovery
//! - [`ArticleRecord`]: an extracted article with its keyword statistics
//! - [`SourceRecord`]: provenance attached to every persisted article
//! - [`Keywords`]: ranked term frequencies, serialised as an ordered JSON object
//! - [`RunSummary`]: the counts reported at the end of a run

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use url::Url;

/// Title stored when no title selector matched.
pub const TITLE_NOT_FOUND: &str = "Title not found";

/// A canonical absolute article URL.
///
/// Construction goes through [`ArticleUrl::resolve`], which joins relative
/// targets against the site origin and drops fragments, so two anchors that
/// point at the same article compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArticleUrl(String);

impl ArticleUrl {
    /// Resolve `href` against `base`.
    ///
    /// Returns `None` for targets that are not http(s) once resolved
    /// (`mailto:`, `javascript:`, unparsable input).
    pub fn resolve(base: &Url, href: &str) -> Option<Self> {
        let mut resolved = base.join(href.trim()).ok()?;
        if !matches!(resolved.scheme(), "http" | "https") {
            return None;
        }
        resolved.set_fragment(None);
        Some(Self(resolved.into()))
    }

    /// Parse an already-absolute URL.
    pub fn parse(raw: &str) -> Option<Self> {
        let parsed = Url::parse(raw.trim()).ok()?;
        Self::resolve(&parsed, parsed.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A listing page after discovery. Not persisted.
#[derive(Debug, Clone)]
pub struct ListingPage {
    /// The seed URL that was rendered.
    pub url: String,
    /// How many "load more" triggers were issued before expansion stopped.
    pub load_more_clicks: usize,
    /// Article URLs in discovery order, unique within this page.
    pub links: Vec<ArticleUrl>,
}

/// Kind of source an article came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    #[default]
    Web,
    Api,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Web => "Web",
            SourceType::Api => "Api",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance for a persisted article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Human-readable source name, e.g. `"BCG"`.
    pub source_name: String,
    pub source_type: SourceType,
    /// Research field the source belongs to; `0` when unassigned.
    pub field_id: i64,
}

/// An article as extracted from its page.
///
/// `body` is never empty: the extractor returns `None` instead of building a
/// record without body text.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub url: ArticleUrl,
    pub title: String,
    pub published_date: Option<NaiveDate>,
    pub body: String,
    pub scraped_at: DateTime<Utc>,
    pub keywords: Keywords,
}

/// Ranked term frequencies, most frequent first.
///
/// Serialises as a JSON object whose key order is the ranking order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keywords(Vec<(String, u32)>);

impl Keywords {
    pub fn new(entries: Vec<(String, u32)>) -> Self {
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(t, c)| (t.as_str(), *c))
    }
}

impl Serialize for Keywords {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (term, count) in &self.0 {
            map.serialize_entry(term, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Keywords {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeywordsVisitor;

        impl<'de> Visitor<'de> for KeywordsVisitor {
            type Value = Keywords;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of keyword to count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Keywords, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((term, count)) = access.next_entry::<String, u32>()? {
                    entries.push((term, count));
                }
                Ok(Keywords(entries))
            }
        }

        deserializer.deserialize_map(KeywordsVisitor)
    }
}

/// Counts reported when a run finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Unique article URLs found across all listing seeds.
    pub discovered: usize,
    /// URLs skipped because an earlier run already persisted them.
    pub already_persisted: usize,
    /// Articles committed to the sink during this run.
    pub persisted: usize,
    /// Articles that failed to fetch, extract, or persist.
    pub failed: usize,
    /// Listing seeds that could not be fetched.
    pub listing_failures: usize,
    /// Whether the run stopped early on a cancellation signal.
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://www.bcg.com").unwrap()
    }

    #[test]
    fn test_resolve_relative_href() {
        let url = ArticleUrl::resolve(&origin(), "/publications/2024/ai-at-work").unwrap();
        assert_eq!(url.as_str(), "https://www.bcg.com/publications/2024/ai-at-work");
    }

    #[test]
    fn test_resolve_drops_fragment_and_keeps_absolute() {
        let url = ArticleUrl::resolve(&origin(), "https://other.example/publications/x#top").unwrap();
        assert_eq!(url.as_str(), "https://other.example/publications/x");
    }

    #[test]
    fn test_resolve_rejects_non_http() {
        assert!(ArticleUrl::resolve(&origin(), "mailto:press@bcg.com").is_none());
        assert!(ArticleUrl::resolve(&origin(), "javascript:void(0)").is_none());
    }

    #[test]
    fn test_parse_requires_absolute() {
        assert!(ArticleUrl::parse("/publications/x").is_none());
        assert_eq!(
            ArticleUrl::parse(" https://arxiv.org/abs/2401.00001 ").unwrap().as_str(),
            "https://arxiv.org/abs/2401.00001"
        );
    }

    #[test]
    fn test_keywords_serialize_in_rank_order() {
        let keywords = Keywords::new(vec![("edge".into(), 3), ("cloud".into(), 2)]);
        let json = serde_json::to_string(&keywords).unwrap();
        assert_eq!(json, r#"{"edge":3,"cloud":2}"#);

        let back: Keywords = serde_json::from_str(&json).unwrap();
        assert_eq!(back, keywords);
        assert_eq!(back.iter().last(), Some(("cloud", 2)));
    }

    #[test]
    fn test_source_type_display() {
        assert_eq!(SourceType::Web.to_string(), "Web");
        assert_eq!(SourceType::default(), SourceType::Web);
    }
}
