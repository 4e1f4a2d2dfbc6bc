//! Bounded retry around a [`PageFetcher`], and the per-product scrape step
//! built on it.
//!
//! Only [`FetchError::Transient`] is retried, with a fixed pause between
//! attempts. HTTP status errors come back on the first attempt.

use crate::config::ScraperConfig;
use crate::models::{ProductLink, ProductRecord};
use crate::scraper::parsers::extract_product;
use crate::scraper::{FetchError, PageFetcher};
use std::cell::Cell;
use std::time::{Duration, Instant};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_secs(2) }
    }
}

pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    policy: &RetryPolicy,
) -> Result<String, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let strategy = FixedInterval::new(policy.delay).take(max_attempts as usize - 1);
    let attempt = Cell::new(0u32);

    RetryIf::spawn(
        strategy,
        || {
            attempt.set(attempt.get() + 1);
            debug!("GET {} (attempt {}/{})", url, attempt.get(), max_attempts);
            fetcher.fetch(url)
        },
        |err: &FetchError| {
            let retry = err.is_transient() && attempt.get() < max_attempts;
            if retry {
                warn!(
                    "{}; retrying in {:?} ({}/{})",
                    err, policy.delay, attempt.get(), max_attempts
                );
            }
            retry
        },
    )
    .await
}

/// Fetch and extract one product page.
///
/// Returns `None` once the page cannot be fetched; the caller moves on to
/// the next link.
pub async fn scrape_product(
    fetcher: &dyn PageFetcher,
    link: &ProductLink,
    policy: &RetryPolicy,
) -> Option<ProductRecord> {
    info!("Scraping {} (position {}, page {})", link.url, link.position, link.page_number);
    let started = Instant::now();

    match fetch_with_retry(fetcher, &link.url, policy).await {
        Ok(html) => {
            let record = extract_product(&html, link.position, link.page_number);
            info!("Extracted {} from {} in {:.2?}", record.reference, link.url, started.elapsed());
            Some(record)
        }
        Err(e) => {
            error!("Giving up on {}: {}", link.url, e);
            None
        }
    }
}
