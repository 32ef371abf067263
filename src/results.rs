use crate::frontier::FrontierEntry;
use crate::parsers::{PageMeta, ParserType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Outcome of fetching one frontier entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum FetchStatus {
    Success,
    HttpError(u16),
    NetworkError,
    RobotsBlocked,
    Timeout,
    Skipped,
}

impl FetchStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchStatus::Success)
    }

    /// Blocked or skipped entries count as skipped, not failed
    pub fn is_skip(&self) -> bool {
        matches!(self, FetchStatus::RobotsBlocked | FetchStatus::Skipped)
    }
}

/// Result of processing a single URL
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL as it was popped from the frontier
    pub url: Url,
    /// URL after redirects
    pub final_url: Url,
    pub status: FetchStatus,
    /// HTTP status of the final response, when one arrived
    pub http_status: Option<u16>,
    /// Raw body, present on success
    pub content: Option<Vec<u8>>,
    pub content_type: Option<String>,
    /// How the body was interpreted
    pub parser_type: ParserType,
    /// Absolute outbound links in document order
    pub links: Vec<Url>,
    pub fetched_at: DateTime<Utc>,
    pub title: Option<String>,
    pub meta: PageMeta,
    /// Extracted visible text
    pub text: String,
    /// Number of network attempts made (0 when nothing was sent)
    pub attempts: u32,
    pub error: Option<String>,
}

impl FetchResult {
    /// A result for an entry that never reached the network
    pub fn without_request(url: Url, status: FetchStatus) -> Self {
        Self {
            final_url: url.clone(),
            url,
            status,
            http_status: None,
            content: None,
            content_type: None,
            parser_type: ParserType::Other,
            links: Vec::new(),
            fetched_at: Utc::now(),
            title: None,
            meta: PageMeta::default(),
            text: String::new(),
            attempts: 0,
            error: None,
        }
    }

    /// A result for an entry whose last attempt failed
    pub fn failed(url: Url, status: FetchStatus, attempts: u32, error: String) -> Self {
        let http_status = match status {
            FetchStatus::HttpError(code) => Some(code),
            _ => None,
        };
        Self {
            http_status,
            attempts,
            error: Some(error),
            ..Self::without_request(url, status)
        }
    }

    /// Record handed to the storage collaborator for the entry that
    /// produced this result
    pub fn to_record(&self, entry: &FrontierEntry) -> ContentRecord {
        ContentRecord {
            url: self.url.to_string(),
            final_url: self.final_url.to_string(),
            depth: entry.depth,
            discovered_from: entry.discovered_from.as_ref().map(Url::to_string),
            status: self.status,
            http_status: self.http_status,
            content_type: self.content_type.clone(),
            title: self.title.clone(),
            meta: self.meta.clone(),
            text: self.text.clone(),
            fetched_at: self.fetched_at,
            error: self.error.clone(),
        }
    }
}

/// Per-page content record persisted by a [`ContentSink`](crate::sink::ContentSink)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub url: String,
    pub final_url: String,
    /// Hops from the seed URL
    pub depth: u32,
    /// Page the URL was first linked from; `None` for the seed and sitemap URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_from: Option<String>,
    pub status: FetchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub meta: PageMeta,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
