//! HTTP rendering backend for server-rendered sites.
//!
//! There is no script execution: the "document" is the markup the server
//! returns. A "load more" affordance is interactable when it is (or sits in,
//! or wraps) an anchor with an `href` that has not been fetched yet;
//! triggering it fetches that page and appends its body to the session. This
//! covers listings that paginate through plain links, which is what most
//! "load more" buttons fall back to without JavaScript.
//!
//! Consent overlays are script-driven, so they are never interactable here.

use super::{RenderBackend, RenderSession};
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Backend issuing plain GET requests through a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RenderBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn open_session(&self) -> Result<Box<dyn RenderSession>, FetchError> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            pages: Vec::new(),
        }))
    }
}

#[derive(Debug)]
struct LoadedPage {
    url: Url,
    html: String,
}

/// Session state: the navigated page followed by every page appended through
/// "load more".
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    pages: Vec<LoadedPage>,
}

impl HttpSession {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &Url) -> Result<String, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        debug!(bytes = body.len(), "GET complete");
        Ok(body)
    }

    fn next_target(&self, selector: &str) -> Option<Url> {
        let last = self.pages.last()?;
        let target = load_more_href(&last.html, selector, &last.url)?;
        let visited = self.pages.iter().any(|p| p.url == target);
        (!visited).then_some(target)
    }
}

#[async_trait]
impl RenderSession for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        let url = Url::parse(url).map_err(|e| FetchError::Backend(format!("invalid URL {url}: {e}")))?;
        let html = self.get(&url).await?;
        self.pages.clear();
        self.pages.push(LoadedPage { url, html });
        Ok(())
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        if self.pages.is_empty() {
            return Err(FetchError::Backend("no page loaded".into()));
        }
        let pages: Vec<&str> = self.pages.iter().map(|p| p.html.as_str()).collect();
        Ok(merge_pages(&pages))
    }

    async fn count(&mut self, selector: &str) -> Result<usize, FetchError> {
        Ok(self.pages.iter().map(|p| count_matches(&p.html, selector)).sum())
    }

    async fn is_interactable(&mut self, selector: &str) -> Result<bool, FetchError> {
        Ok(self.next_target(selector).is_some())
    }

    async fn click(&mut self, selector: &str) -> Result<(), FetchError> {
        let target = self
            .next_target(selector)
            .ok_or_else(|| FetchError::ElementNotFound(selector.to_string()))?;
        let html = self.get(&target).await?;
        self.pages.push(LoadedPage { url: target, html });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), FetchError> {
        self.pages.clear();
        Ok(())
    }
}

fn count_matches(html: &str, selector: &str) -> usize {
    let Ok(selector) = Selector::parse(selector) else {
        return 0;
    };
    Html::parse_document(html).select(&selector).count()
}

/// Link target of the first element matching `selector`: its own `href`, a
/// descendant anchor's, or an enclosing anchor's.
fn load_more_href(html: &str, selector: &str, base: &Url) -> Option<Url> {
    let selector = Selector::parse(selector).ok()?;
    let anchor = Selector::parse("a[href]").ok()?;
    let document = Html::parse_document(html);
    let element = document.select(&selector).next()?;

    let href = element
        .value()
        .attr("href")
        .or_else(|| element.select(&anchor).next().and_then(|a| a.value().attr("href")))
        .or_else(|| {
            element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "a")
                .and_then(|a| a.value().attr("href"))
        })?;

    base.join(href.trim()).ok()
}

/// Concatenate the bodies of every loaded page into one document.
fn merge_pages(pages: &[&str]) -> String {
    match pages {
        [] => String::new(),
        [only] => only.to_string(),
        _ => {
            let Ok(body) = Selector::parse("body") else {
                return pages.concat();
            };
            let mut merged = String::from("<html><body>");
            for page in pages {
                let document = Html::parse_document(page);
                if let Some(b) = document.select(&body).next() {
                    merged.push_str(&b.inner_html());
                }
            }
            merged.push_str("</body></html>");
            merged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <ol>
            <li class="arxiv-result"><a href="/abs/2401.00001">one</a></li>
            <li class="arxiv-result"><a href="/abs/2401.00002">two</a></li>
          </ol>
          <nav><a class="pagination-next" href="?query=x&start=200">Next</a></nav>
        </body></html>"#;

    fn base() -> Url {
        Url::parse("https://arxiv.org/search/?query=x").unwrap()
    }

    #[test]
    fn test_count_matches() {
        assert_eq!(count_matches(LISTING, "li.arxiv-result"), 2);
        assert_eq!(count_matches(LISTING, "article"), 0);
        assert_eq!(count_matches(LISTING, "li[["), 0);
    }

    #[test]
    fn test_load_more_href_on_anchor() {
        let href = load_more_href(LISTING, "a.pagination-next", &base()).unwrap();
        assert_eq!(href.as_str(), "https://arxiv.org/search/?query=x&start=200");
    }

    #[test]
    fn test_load_more_href_from_enclosing_anchor() {
        let html = r#"<a href="/publications?page=2"><span class="call-to-action__button">View more</span></a>"#;
        let base = Url::parse("https://www.bcg.com/publications").unwrap();
        let href = load_more_href(html, "span.call-to-action__button", &base).unwrap();
        assert_eq!(href.as_str(), "https://www.bcg.com/publications?page=2");
    }

    #[test]
    fn test_load_more_href_script_button() {
        let html = r#"<button class="more" onclick="load()">More</button>"#;
        assert!(load_more_href(html, "button.more", &base()).is_none());
    }

    #[test]
    fn test_merge_pages_keeps_every_body() {
        let second = r#"<html><body><li class="arxiv-result"><a href="/abs/2401.00003">three</a></li></body></html>"#;
        let merged = merge_pages(&[LISTING, second]);
        assert_eq!(count_matches(&merged, "li.arxiv-result"), 3);
        assert!(merged.contains("/abs/2401.00003"));
    }

    #[test]
    fn test_merge_single_page_is_unchanged() {
        assert_eq!(merge_pages(&[LISTING]), LISTING);
        assert_eq!(merge_pages(&[]), "");
    }

    #[tokio::test]
    async fn test_open_session_without_navigation() {
        let backend = HttpBackend::new("publication_crawler-test", Duration::from_secs(5)).unwrap();
        let mut session = backend.open_session().await.unwrap();
        assert_eq!(session.count("li").await.unwrap(), 0);
        assert!(!session.is_interactable("a.pagination-next").await.unwrap());
        assert!(session.content().await.is_err());
    }
}
