//! Walks one category's paginated listing and yields product links.
//!
//! ## Termination
//!
//! A category ends when a page has no next-page control, when the next-page
//! URL has already been visited (some listings link back to themselves), or
//! after `max_pages` pages. A failed fetch on page 1 is an error; a failure
//! further in ends the category and keeps what was collected.

use crate::models::ProductLink;
use crate::scraper::parsers::{next_page_url, parse_listing_page, resolve_url};
use crate::scraper::{FetchError, PageFetcher};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

pub struct Paginator<'a> {
    fetcher: &'a dyn PageFetcher,
    next_url: Option<String>,
    page_number: u32,
    position: u32,
    max_pages: u32,
    seen: HashSet<String>,
    visited_pages: HashSet<String>,
}

impl<'a> Paginator<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, start_url: &str, max_pages: u32) -> Self {
        Self {
            fetcher,
            next_url: Some(start_url.to_string()),
            page_number: 1,
            position: 0,
            max_pages,
            seen: HashSet::new(),
            visited_pages: HashSet::new(),
        }
    }

    /// Product URLs discovered so far.
    pub fn links_found(&self) -> usize {
        self.seen.len()
    }

    /// Links first seen on the next page, or `None` once the crawl is over.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ProductLink>>, FetchError> {
        let Some(url) = self.next_url.take() else { return Ok(None) };

        if self.page_number > self.max_pages {
            warn!("Reached page limit ({}), stopping before {}", self.max_pages, url);
            return Ok(None);
        }
        if !self.visited_pages.insert(url.clone()) {
            warn!("Next-page link points back to {}, stopping", url);
            return Ok(None);
        }

        info!("Fetching listing page {} ({})", self.page_number, url);
        let html = match self.fetcher.fetch(&url).await {
            Ok(html) => html,
            Err(e) if self.page_number == 1 => return Err(e),
            Err(e) => {
                warn!(
                    "Listing page {} failed ({}), keeping {} links",
                    self.page_number,
                    e,
                    self.seen.len()
                );
                return Ok(None);
            }
        };

        let listing = parse_listing_page(&html);
        let base = Url::parse(&url).ok();
        let mut links = Vec::new();

        for href in &listing.product_hrefs {
            let Some(product_url) = base.as_ref().and_then(|b| resolve_url(b, href)) else {
                debug!("Unresolvable product href {:?} on {}", href, url);
                continue;
            };
            if self.seen.insert(product_url.clone()) {
                self.position += 1;
                links.push(ProductLink {
                    url: product_url,
                    position: self.position,
                    page_number: self.page_number,
                });
            }
        }

        info!(
            "  Page {}: {} anchors, {} new",
            self.page_number,
            listing.product_hrefs.len(),
            links.len()
        );

        match listing.next_href.and_then(|href| next_page_url(&url, &href)) {
            Some(next) => {
                self.next_url = Some(next);
                self.page_number += 1;
            }
            None => debug!("No next page after page {}", self.page_number),
        }

        Ok(Some(links))
    }
}

/// Crawl a whole category.
pub async fn crawl(
    fetcher: &dyn PageFetcher,
    start_url: &str,
    max_pages: u32,
) -> Result<Vec<ProductLink>, FetchError> {
    let mut paginator = Paginator::new(fetcher, start_url, max_pages);
    let mut links = Vec::new();

    while let Some(page) = paginator.next_page().await? {
        links.extend(page);
    }

    info!("{}: {} product links", start_url, paginator.links_found());
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::ScriptedFetcher;

    const START: &str = "https://shop.example/hombre";

    fn listing(products: &[&str], next: Option<&str>) -> String {
        let mut html = String::from("<div>");
        for p in products {
            html.push_str(&format!(r#"<a class="vtex-product-summary-2-x-clearLink" href="{}">p</a>"#, p));
        }
        if let Some(next) = next {
            html.push_str(&format!(r#"<a href="{}">Mostrar más</a>"#, next));
        }
        html.push_str("</div>");
        html
    }

    fn page_url(n: u32) -> String {
        format!("{}?page={}", START, n)
    }

    #[tokio::test]
    async fn stops_when_page_has_no_next_control() {
        let fetcher = ScriptedFetcher::new()
            .page(START, listing(&["/a/p", "/b/p"], Some("?page=2")))
            .page(&page_url(2), listing(&["/c/p"], Some("?page=3")))
            .page(&page_url(3), listing(&["/d/p"], None))
            .page(&page_url(4), listing(&["/never/p"], None));

        let links = crawl(&fetcher, START, 50).await.unwrap();

        let pages: Vec<u32> = links.iter().map(|l| l.page_number).collect();
        assert_eq!(pages, [1, 1, 2, 3]);
        assert_eq!(links[3].url, "https://shop.example/d/p");
        assert_eq!(fetcher.request_count(&page_url(4)), 0);
        assert_eq!(fetcher.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_urls_keep_positions_contiguous() {
        let fetcher = ScriptedFetcher::new()
            .page(START, listing(&["/a/p", "/b/p", "/a/p"], Some("?page=2")))
            .page(&page_url(2), listing(&["/b/p", "/c/p"], None));

        let links = crawl(&fetcher, START, 50).await.unwrap();

        let got: Vec<(&str, u32, u32)> = links
            .iter()
            .map(|l| (l.url.as_str(), l.position, l.page_number))
            .collect();
        assert_eq!(
            got,
            [
                ("https://shop.example/a/p", 1, 1),
                ("https://shop.example/b/p", 2, 1),
                ("https://shop.example/c/p", 3, 2),
            ]
        );
    }

    #[tokio::test]
    async fn self_referential_next_link_terminates() {
        let fetcher = ScriptedFetcher::new()
            .page(START, listing(&["/a/p"], Some("?page=2")))
            .page(&page_url(2), listing(&["/b/p"], Some("?page=2")));

        let links = crawl(&fetcher, START, 50).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(fetcher.request_count(&page_url(2)), 1);
    }

    #[tokio::test]
    async fn page_limit_caps_an_endless_listing() {
        let mut fetcher = ScriptedFetcher::new().page(START, listing(&["/p1/p"], Some("?page=2")));
        for n in 2..=20 {
            let product = format!("/p{}/p", n);
            let next = format!("?page={}", n + 1);
            fetcher = fetcher.page(&page_url(n), listing(&[product.as_str()], Some(next.as_str())));
        }

        let links = crawl(&fetcher, START, 4).await.unwrap();
        assert_eq!(links.len(), 4);
        assert_eq!(fetcher.requests.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn first_page_failure_is_an_error() {
        let fetcher = ScriptedFetcher::new().status(START, 500);
        let err = crawl(&fetcher, START, 50).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn later_failure_keeps_partial_results() {
        let fetcher = ScriptedFetcher::new()
            .page(START, listing(&["/a/p", "/b/p"], Some("?page=2")))
            .flaky(&page_url(2));

        let links = crawl(&fetcher, START, 50).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(fetcher.request_count(&page_url(2)), 1);
    }

    #[tokio::test]
    async fn paginator_is_lazy() {
        let fetcher = ScriptedFetcher::new()
            .page(START, listing(&["/a/p"], Some("?page=2")))
            .page(&page_url(2), listing(&["/b/p"], None));

        let mut paginator = Paginator::new(&fetcher, START, 50);
        let first = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(fetcher.requests.lock().unwrap().len(), 1);

        assert!(paginator.next_page().await.unwrap().is_some());
        assert!(paginator.next_page().await.unwrap().is_none());
        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(paginator.links_found(), 2);
    }
}
