use crate::config::CrawlConfig;
use crate::crawlers::{PageFetcher, RawPage};
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use url::Url;

/// Redirect hops followed before a request fails
const MAX_REDIRECTS: usize = 10;

/// Build the HTTP client shared by page fetches, robots.txt and sitemaps
pub fn build_client(config: &CrawlConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout_duration())
        .connect_timeout(config.request_timeout_duration())
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
}

/// Plain HTTP(S) fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_content_bytes: usize,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration, max_content_bytes: usize) -> Self {
        Self {
            client,
            timeout,
            max_content_bytes,
        }
    }

    fn map_error(&self, err: reqwest::Error) -> FetchError {
        match FetchError::from(err) {
            FetchError::Timeout(_) => FetchError::Timeout(self.timeout),
            other => other,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<RawPage, FetchError> {
        ::log::debug!("GET {}", url);

        let mut response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_content_bytes as u64 {
                return Err(FetchError::ContentTooLarge(length as usize));
            }
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Servers may omit or misreport the length, so the cap is enforced while reading
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            if body.len() + chunk.len() > self.max_content_bytes {
                return Err(FetchError::ContentTooLarge(body.len() + chunk.len()));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(RawPage {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}
