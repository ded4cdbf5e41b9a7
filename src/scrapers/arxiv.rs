//! arXiv title search.
//!
//! Seeds are title searches for the tracked research fields, newest first,
//! 200 results per page. Each result is an `li.arxiv-result` whose first
//! `/abs/` anchor is the paper. The "next" pagination anchor plays the role of
//! the "load more" affordance.
//!
//! Article pages expose the abstract in `blockquote.abstract`, which becomes
//! the body. The dateline reads `[Submitted on 3 Jan 2024]`; revised papers
//! carry a longer dateline that does not parse and are stored without a date.

use super::{ArticleSelectors, ListingSelectors, SiteAdapter};
use crate::models::SourceType;

pub const KEY: &str = "arxiv";

const SEARCH_URL: &str = "https://arxiv.org/search/";

/// Research fields searched by default.
pub const FIELDS: [&str; 4] = [
    "quantum computing",
    "generative artificial intelligence",
    "applied artificial intelligence",
    "cloud and edge computing",
];

/// Listing URL for a title search on `field`.
pub fn search_url(field: &str) -> String {
    format!(
        "{SEARCH_URL}?query={}&searchtype=title&abstracts=show&order=-submitted_date&size=200",
        field.split_whitespace().collect::<Vec<_>>().join("+")
    )
}

/// Adapter for arXiv search listings and abstract pages.
pub fn adapter() -> SiteAdapter {
    SiteAdapter {
        key: KEY.to_string(),
        source_name: "arXiv".to_string(),
        source_type: SourceType::Web,
        field_id: 0,
        origin: "https://arxiv.org".to_string(),
        seeds: FIELDS.iter().map(|f| search_url(f)).collect(),
        listing: ListingSelectors {
            article_block: "li.arxiv-result".to_string(),
            link_pattern: "/abs/".to_string(),
            load_more: Some("a.pagination-next".to_string()),
            consent: None,
            max_load_more: 2,
        },
        article: ArticleSelectors {
            title: vec!["h1.title".to_string()],
            date: vec!["div.dateline".to_string()],
            date_format: "[Submitted on %d %b %Y]".to_string(),
            body: vec!["#abs".to_string()],
            paragraph: "blockquote.abstract".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_encodes_field() {
        assert_eq!(
            search_url("cloud and edge computing"),
            "https://arxiv.org/search/?query=cloud+and+edge+computing&searchtype=title&abstracts=show&order=-submitted_date&size=200"
        );
    }

    #[test]
    fn test_adapter_has_one_seed_per_field() {
        let adapter = adapter();
        assert_eq!(adapter.seeds.len(), FIELDS.len());
        assert!(adapter.seeds.iter().all(|s| s.starts_with(SEARCH_URL)));
    }
}
