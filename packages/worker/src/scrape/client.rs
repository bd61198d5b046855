//! HTTP client for the external listing source.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use crate::common::FetchError;

const BASE_URL: &str = "https://www.thegradcafe.com/survey/index.php";

/// One page fetch from the external source.
///
/// Trait seam so the incremental driver can be exercised against canned
/// HTML in tests.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page of survey results (1-based page number).
    async fn fetch_page(&self, page: u32) -> Result<String, FetchError>;
}

/// Fetches survey pages from TheGradCafe over HTTP.
pub struct GradCafeClient {
    client: reqwest::Client,
}

impl GradCafeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        // Browser-like User-Agent to avoid bot detection
        let user_agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/119.0.0.0 Safari/537.36";

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .expect("static header value"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "en-US,en;q=0.5".parse().expect("static header value"),
        );

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    fn page_url(page: u32) -> Url {
        Url::parse_with_params(
            BASE_URL,
            &[("q", ""), ("t", "a"), ("o", ""), ("page", &page.to_string())],
        )
        .expect("static base URL")
    }
}

#[async_trait]
impl PageFetcher for GradCafeClient {
    async fn fetch_page(&self, page: u32) -> Result<String, FetchError> {
        let url = Self::page_url(page);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        response.text().await.map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })
    }
}
