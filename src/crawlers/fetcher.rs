use crate::config::CrawlConfig;
use crate::crawlers::{HttpFetcher, RenderFetcher};
use crate::error::FetchError;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Body and metadata returned by a successful fetch
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawPage {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The network step of a crawl.
///
/// Implementations perform exactly one attempt; retries, backoff and pacing
/// are applied by the worker pool around every implementation alike.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<RawPage, FetchError>;

    /// Release any held resources once the session ends
    async fn shutdown(&self) {}
}

/// Pick the fetch strategy for a session from its `render` flag
pub fn fetcher_for(config: &CrawlConfig, client: reqwest::Client) -> Arc<dyn PageFetcher> {
    if config.render {
        ::log::info!("Rendering pages through WebDriver at {}", config.webdriver_url);
        Arc::new(RenderFetcher::new(
            &config.webdriver_url,
            config.request_timeout_duration(),
            config.render_wait(),
            config.max_content_bytes,
        ))
    } else {
        Arc::new(HttpFetcher::new(
            client,
            config.request_timeout_duration(),
            config.max_content_bytes,
        ))
    }
}
