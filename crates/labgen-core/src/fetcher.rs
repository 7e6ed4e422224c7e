use crate::parser::normalize_url;
use crate::{Error, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

/// HTTP client for fetching the markdown rendition of documentation pages
pub struct DocFetcher {
    client: Client,
}

impl DocFetcher {
    /// Creates a new fetcher with a 30 second request timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Creates a new fetcher with a custom request timeout (primarily for tests)
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("labgen/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client })
    }

    /// Fetches the markdown for a documentation URL, appending `.md` when needed
    #[instrument(skip(self))]
    pub async fn fetch_markdown(&self, url: &str) -> Result<String> {
        let target = normalize_url(url);
        let response = self.client.get(&target).send().await?;
        let status = response.status();

        if !status.is_success() {
            if status == StatusCode::NOT_FOUND {
                return Err(Error::NotFound(format!(
                    "Documentation page not found at '{target}'"
                )));
            }
            return match response.error_for_status() {
                Ok(_) => Err(Error::Other(format!("Unexpected status {status} for '{target}'"))),
                Err(err) => Err(Error::Network(err)),
            };
        }

        let content = response.text().await?;
        debug!("Fetched {} bytes from {}", content.len(), target);
        Ok(content)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_appends_markdown_suffix() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/query-dsl-match-query.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Match query\n"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = DocFetcher::new().unwrap();
        let body = fetcher
            .fetch_markdown(&format!("{}/docs/query-dsl-match-query", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(body, "# Match query\n");
    }

    #[tokio::test]
    async fn test_fetch_maps_404_to_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = DocFetcher::new().unwrap();
        let err = fetcher
            .fetch_markdown(&format!("{}/missing.md", mock_server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_network_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock_server)
            .await;

        let fetcher = DocFetcher::new().unwrap();
        let err = fetcher
            .fetch_markdown(&format!("{}/page.md", mock_server.uri()))
            .await
            .unwrap_err();

        assert_eq!(err.category(), "network");
    }
}
