use crate::error::{CrawlError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Upper bound for `delay`, in seconds
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Upper bound for `request_timeout`, in seconds
pub const MAX_REQUEST_TIMEOUT_SECS: f64 = 3600.0;

/// Configuration for one crawl session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// URL to start crawling from
    pub seed_url: String,

    /// Maximum number of URLs admitted to the frontier (seed included)
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Maximum link depth from the seed (seed is depth 0)
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Minimum delay in seconds between two requests to the same host
    #[serde(default = "default_delay")]
    pub delay: f64,

    /// Number of concurrent fetch workers
    #[serde(default = "default_concurrent")]
    pub concurrent: usize,

    /// Whether to consult robots.txt before every request
    #[serde(default = "default_true")]
    pub respect_robots: bool,

    /// Whether to fetch pages through a WebDriver browser instead of plain HTTP
    #[serde(default)]
    pub render: bool,

    /// User agent sent with requests and matched against robots.txt groups
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential retry backoff, in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Whether to follow links outside the seed's registrable domain
    #[serde(default)]
    pub allow_external: bool,

    /// Regex patterns for URLs to include
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns for URLs to exclude
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Whether `?b=1&a=2` and `?a=2&b=1` are the same URL for dedup
    #[serde(default = "default_true")]
    pub sort_query_params: bool,

    /// Skip `rel=nofollow` anchors and pages with a nofollow robots meta tag
    #[serde(default = "default_true")]
    pub respect_nofollow: bool,

    /// Seed the frontier from the site's XML sitemaps before crawling
    #[serde(default)]
    pub parse_sitemaps: bool,

    /// Largest response body accepted, in bytes
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,

    /// Change percentage a revisit must exceed to produce a change event
    #[serde(default)]
    pub change_threshold: f64,

    /// URL for the WebDriver instance used in render mode
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Time a rendered page is given to settle before its DOM is read, in milliseconds
    #[serde(default = "default_render_wait_ms")]
    pub render_wait_ms: u64,
}

fn default_max_pages() -> usize {
    1000
}

fn default_max_depth() -> u32 {
    10
}

fn default_delay() -> f64 {
    0.5
}

fn default_concurrent() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    concat!("crawl-engine/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_request_timeout() -> f64 {
    30.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_max_content_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_render_wait_ms() -> u64 {
    2000
}

impl CrawlConfig {
    /// Create a new configuration with default values
    pub fn new(seed_url: &str) -> Self {
        Self {
            seed_url: seed_url.to_string(),
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            delay: default_delay(),
            concurrent: default_concurrent(),
            respect_robots: true,
            render: false,
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            allow_external: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            sort_query_params: true,
            respect_nofollow: true,
            parse_sitemaps: false,
            max_content_bytes: default_max_content_bytes(),
            change_threshold: 0.0,
            webdriver_url: default_webdriver_url(),
            render_wait_ms: default_render_wait_ms(),
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.apply_env();
        Ok(config)
    }

    /// Override the WebDriver URL from `WEBDRIVER_URL` when set
    pub fn apply_env(&mut self) {
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                self.webdriver_url = webdriver_url;
            }
        }
    }

    /// Check the configuration and return the parsed seed URL.
    ///
    /// A session whose configuration fails here never enters `Running`.
    pub fn validate(&self) -> Result<Url> {
        let seed = Url::parse(&self.seed_url).map_err(|e| CrawlError::InvalidSeed {
            url: self.seed_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(seed.scheme(), "http" | "https") || seed.host_str().is_none() {
            return Err(CrawlError::InvalidSeed {
                url: self.seed_url.clone(),
                reason: "only absolute http(s) URLs can be crawled".to_string(),
            });
        }

        if self.max_pages == 0 {
            return Err(CrawlError::Config("max_pages must be positive".into()));
        }
        if self.concurrent == 0 {
            return Err(CrawlError::Config("concurrent must be positive".into()));
        }
        if !(0.0..=MAX_DELAY_SECS).contains(&self.delay) {
            return Err(CrawlError::Config(format!(
                "delay must be between 0 and {MAX_DELAY_SECS} seconds"
            )));
        }
        if !(self.request_timeout > 0.0 && self.request_timeout <= MAX_REQUEST_TIMEOUT_SECS) {
            return Err(CrawlError::Config(format!(
                "request_timeout must be positive and at most {MAX_REQUEST_TIMEOUT_SECS} seconds"
            )));
        }
        Duration::try_from_secs_f64(self.delay)
            .and(Duration::try_from_secs_f64(self.request_timeout))
            .map_err(|e| CrawlError::Config(format!("invalid duration: {e}")))?;
        if self.max_content_bytes == 0 {
            return Err(CrawlError::Config("max_content_bytes must be positive".into()));
        }
        if !self.change_threshold.is_finite() || !(0.0..=100.0).contains(&self.change_threshold) {
            return Err(CrawlError::Config(
                "change_threshold must be between 0 and 100".into(),
            ));
        }
        if self.render {
            Url::parse(&self.webdriver_url)
                .map_err(|e| CrawlError::Config(format!("invalid webdriver_url: {e}")))?;
            if self.render_wait() >= self.request_timeout_duration() {
                return Err(CrawlError::Config(
                    "render_wait_ms must be shorter than request_timeout".into(),
                ));
            }
        }
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            regex::Regex::new(pattern)?;
        }

        Ok(seed)
    }

    /// Same-host request gap; out-of-range values fall back to no delay
    pub fn delay_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay.min(MAX_DELAY_SECS)).unwrap_or_default()
    }

    pub fn render_wait(&self) -> Duration {
        Duration::from_millis(self.render_wait_ms)
    }

    /// Per-request timeout; out-of-range values fall back to the default
    pub fn request_timeout_duration(&self) -> Duration {
        let secs = self.request_timeout.min(MAX_REQUEST_TIMEOUT_SECS);
        match Duration::try_from_secs_f64(secs) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            _ => Duration::from_secs_f64(default_request_timeout()),
        }
    }
}
