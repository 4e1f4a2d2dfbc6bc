use crate::config::ScraperConfig;
use crate::scraper::{FetchError, PageFetcher};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-CO,es;q=0.9,en;q=0.7"));

        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // VTEX storefronts set a segment cookie on the first hit
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }
}

/// Sort a reqwest failure into the retry taxonomy.
fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_builder() {
        FetchError::Request { url: url.to_string(), reason: err.to_string() }
    } else {
        FetchError::Transient { url: url.to_string(), reason: err.to_string() }
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {}", url);

        let resp = self.inner.get(url).send().await.map_err(|e| classify(url, e))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(FetchError::Http { status: status.as_u16(), url: url.to_string() });
        }

        // A body cut off mid-transfer surfaces here, not in send()
        resp.text().await.map_err(|e| classify(url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        let cfg = ScraperConfig { timeout_secs: 5, ..ScraperConfig::default() };
        HttpClient::new(&cfg).unwrap()
    }

    #[tokio::test]
    async fn returns_body_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hombre"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let html = client().fetch(&format!("{}/hombre", server.uri())).await.unwrap();
        assert_eq!(html, "<html>ok</html>");
    }

    #[tokio::test]
    async fn non_200_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client().fetch(&format!("{}/gone", server.uri())).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn follows_redirect_to_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", format!("{}/new", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let html = client().fetch(&format!("{}/old", server.uri())).await.unwrap();
        assert_eq!(html, "moved");
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        // Port 9 (discard) is not listening on test hosts
        let err = client().fetch("http://127.0.0.1:9/").await.unwrap_err();
        assert!(err.is_transient(), "got {:?}", err);
    }

    #[tokio::test]
    async fn malformed_url_is_not_transient() {
        let err = client().fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }), "got {:?}", err);
    }
}
