//! Boston Consulting Group publications.
//!
//! The listing at `https://www.bcg.com/publications` renders one `<article>`
//! block per publication and reveals more through a "View more" button. A
//! TrustArc consent banner may cover the page on first load.
//!
//! # URL Pattern
//!
//! Article links are relative (`/publications/2024/...`) and resolve against
//! `https://www.bcg.com`.

use super::{ArticleSelectors, DEFAULT_MAX_LOAD_MORE, ListingSelectors, SiteAdapter};
use crate::models::SourceType;

pub const KEY: &str = "bcg";

/// Adapter for the BCG publications listing.
pub fn adapter() -> SiteAdapter {
    SiteAdapter {
        key: KEY.to_string(),
        source_name: "BCG".to_string(),
        source_type: SourceType::Web,
        field_id: 0,
        origin: "https://www.bcg.com".to_string(),
        seeds: vec![
            "https://www.bcg.com/publications".to_string(),
            "https://www.bcg.com/publications/latest".to_string(),
            "https://www.bcg.com/publications?sort=date".to_string(),
        ],
        listing: ListingSelectors {
            article_block: "article".to_string(),
            link_pattern: "/publications/".to_string(),
            load_more: Some("span.call-to-action__button".to_string()),
            consent: Some("#truste-consent-button".to_string()),
            max_load_more: DEFAULT_MAX_LOAD_MORE,
        },
        article: ArticleSelectors {
            title: vec![
                "h1.article-header-title".to_string(),
                "h1.hero-content-title".to_string(),
            ],
            date: vec!["time.date".to_string(), "span.date".to_string()],
            date_format: "%B %d, %Y".to_string(),
            body: vec!["div.rtf".to_string(), "div.article-body".to_string()],
            paragraph: "p".to_string(),
        },
    }
}
