pub mod cleaner;
pub mod http_client;
pub mod paginator;
pub mod parsers;
pub mod retry;
pub mod selectors;

use async_trait::async_trait;
use thiserror::Error;

pub use self::http_client::HttpClient;
pub use self::paginator::crawl;
pub use self::retry::{scrape_product, RetryPolicy};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FetchError {
    /// Server answered with anything other than 200. Never retried.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Connection reset, timeout, truncated body.
    #[error("network failure for {url}: {reason}")]
    Transient { url: String, reason: String },

    /// The request could not be built (bad URL, unsupported scheme).
    #[error("invalid request for {url}: {reason}")]
    Request { url: String, reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

// ── Source trait ──────────────────────────────────────────────────────────────

/// Anything that can turn a URL into an HTML document.
///
/// The production implementation is [`HttpClient`]; a JS-rendering backend
/// would slot in here as well.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
