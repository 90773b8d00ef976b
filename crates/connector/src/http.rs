//! Shared HTTP fetcher for story sources.
//!
//! Sends the header set of a desktop browser (some story sites reject bare
//! clients), follows at most ten redirects, and lets reqwest decode gzip,
//! brotli, and zstd bodies.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

const MAX_REDIRECTS: usize = 10;

const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36",
    ),
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    ("accept-language", "en-US,en;q=0.9"),
    ("cache-control", "no-cache"),
    ("pragma", "no-cache"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
    ("upgrade-insecure-requests", "1"),
    (
        "sec-ch-ua",
        "\"Not.A/Brand\";v=\"8\", \"Chromium\";v=\"114\", \"Google Chrome\";v=\"114\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("dnt", "1"),
];

/// Errors from a single fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// HTTP status of a non-2xx response.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Thin wrapper over one pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .brotli(true)
            .zstd(true)
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// GET `url` and return the body as text. Non-2xx is an error.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.get_text_with(url, HeaderMap::new()).await
    }

    /// GET `url` with extra headers and return the body as text.
    pub async fn get_text_with(&self, url: &str, headers: HeaderMap) -> Result<String, FetchError> {
        let http = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };

        let started = std::time::Instant::now();
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(http)?;

        tracing::debug!(
            url,
            status = status.as_u16(),
            bytes = body.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "fetched"
        );
        Ok(body)
    }

    /// GET `url` with extra headers and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T, FetchError> {
        let body = self.get_text_with(url, headers).await?;
        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(BROWSER_HEADERS.len());
    for &(name, value) in BROWSER_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn sends_browser_headers() {
        let server = MockServer::start();
        let page = server.mock(|when, then| {
            when.method(GET)
                .path("/")
                .header("accept-language", "en-US,en;q=0.9")
                .header_exists("user-agent")
                .header_exists("sec-ch-ua");
            then.status(200).body("<html></html>");
        });

        let body = fetcher().get_text(&server.url("/")).await.unwrap();
        assert_eq!(body, "<html></html>");
        page.assert();
    }

    #[tokio::test]
    async fn follows_redirects() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/old");
            then.status(301).header("location", "/new");
        });
        server.mock(|when, then| {
            when.method(GET).path("/new");
            then.status(200).body("moved");
        });

        assert_eq!(fetcher().get_text(&server.url("/old")).await.unwrap(), "moved");
    }

    #[tokio::test]
    async fn non_success_is_status_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET);
            then.status(503);
        });

        let err = fetcher().get_text(&server.url("/")).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn json_decode_failure_names_url() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api");
            then.status(200).body("not json");
        });

        let url = server.url("/api");
        let err = fetcher()
            .get_json::<Vec<serde_json::Value>>(&url, HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(err.to_string().contains(&url));
    }

    #[test]
    fn header_table_is_valid() {
        assert_eq!(browser_headers().len(), BROWSER_HEADERS.len());
    }
}
