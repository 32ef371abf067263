//! Fetching through a WebDriver-controlled browser.
//!
//! Browser sessions are opened lazily and pooled, so a session that never
//! renders a page never connects to WebDriver.

use crate::crawlers::{PageFetcher, RawPage};
use crate::error::FetchError;
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder};
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// Common WebDriver endpoints tried when the configured one is unreachable
const FALLBACK_WEBDRIVER_URLS: &[&str] = &[
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4444", // geckodriver / Selenium default
    "http://127.0.0.1:4444",
];

/// Renders pages in a browser and returns the resulting DOM as HTML
#[derive(Debug)]
pub struct RenderFetcher {
    webdriver_url: String,
    timeout: Duration,
    /// Pause after navigation so scripts can finish building the DOM
    settle: Duration,
    max_content_bytes: usize,
    idle: Mutex<Vec<Client>>,
}

impl RenderFetcher {
    pub fn new(
        webdriver_url: &str,
        timeout: Duration,
        settle: Duration,
        max_content_bytes: usize,
    ) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            timeout,
            settle,
            max_content_bytes,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Reuse an idle browser session or open a new one
    async fn checkout(&self) -> Result<Client, FetchError> {
        if let Some(client) = self.idle.lock().await.pop() {
            return Ok(client);
        }
        self.connect().await
    }

    async fn checkin(&self, client: Client) {
        self.idle.lock().await.push(client);
    }

    async fn connect(&self) -> Result<Client, FetchError> {
        match ClientBuilder::native().connect(&self.webdriver_url).await {
            Ok(client) => {
                ::log::debug!("Connected to WebDriver at {}", self.webdriver_url);
                return Ok(client);
            }
            Err(e) => {
                ::log::warn!(
                    "Failed to connect to WebDriver at {}: {}",
                    self.webdriver_url,
                    e
                );
            }
        }

        for url in FALLBACK_WEBDRIVER_URLS {
            if *url == self.webdriver_url {
                continue;
            }
            ::log::debug!("Trying fallback WebDriver URL: {}", url);
            if let Ok(client) = ClientBuilder::native().connect(url).await {
                ::log::info!("Connected to fallback WebDriver at {}", url);
                return Ok(client);
            }
        }

        ::log::error!("No WebDriver server reachable; start one or set WEBDRIVER_URL");
        Err(FetchError::Render(format!(
            "cannot connect to WebDriver at {}",
            self.webdriver_url
        )))
    }

    async fn render(&self, client: &Client, url: &Url) -> Result<RawPage, CmdError> {
        client.goto(url.as_str()).await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        let html = client.source().await?;
        let final_url = client.current_url().await?;
        Ok(RawPage {
            final_url,
            // WebDriver does not expose the HTTP status of the navigation
            status: 200,
            content_type: Some("text/html".to_string()),
            body: html.into_bytes(),
        })
    }

    async fn discard(&self, client: Client) {
        if let Err(e) = client.close().await {
            ::log::debug!("Failed to close WebDriver session: {}", e);
        }
    }
}

fn is_session_lost(error: &CmdError) -> bool {
    let message = error.to_string();
    message.contains("Unable to find session") || message.contains("invalid session id")
}

#[async_trait]
impl PageFetcher for RenderFetcher {
    async fn fetch(&self, url: &Url) -> Result<RawPage, FetchError> {
        let client = self.checkout().await?;
        ::log::debug!("RENDER: {}", url);

        match tokio::time::timeout(self.timeout, self.render(&client, url)).await {
            Ok(Ok(page)) => {
                self.checkin(client).await;
                if page.body.len() > self.max_content_bytes {
                    return Err(FetchError::ContentTooLarge(page.body.len()));
                }
                Ok(page)
            }
            Ok(Err(e)) => {
                if is_session_lost(&e) {
                    // The next attempt reconnects with a fresh session
                    ::log::warn!("Lost WebDriver session while rendering {}", url);
                    self.discard(client).await;
                } else {
                    self.checkin(client).await;
                }
                Err(FetchError::Render(e.to_string()))
            }
            Err(_) => {
                // A browser stuck on a page is not handed out again
                self.discard(client).await;
                Err(FetchError::Timeout(self.timeout))
            }
        }
    }

    async fn shutdown(&self) {
        let clients: Vec<Client> = self.idle.lock().await.drain(..).collect();
        ::log::debug!("Closing {} WebDriver sessions", clients.len());
        for client in clients {
            self.discard(client).await;
        }
    }
}

