//! Content-version tracking across repeated visits of the same URL.

pub mod detector;
pub mod diff;
pub mod store;

pub use detector::ChangeDetector;
pub use store::VersionStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One captured state of a page's extracted text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageVersion {
    pub id: u64,
    pub url: String,
    /// Hex SHA-256 of `content_snapshot`
    pub content_hash: String,
    pub content_snapshot: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Previous version was empty
    Added,
    /// New version is empty
    Removed,
    Modified,
}

/// A significant difference between two consecutive versions of a URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub url: String,
    pub old_version_id: u64,
    pub new_version_id: u64,
    /// Share of changed lines relative to the old version, in `[0, 100]`
    pub change_percent: f64,
    pub change_type: ChangeType,
    pub diff_summary: String,
    pub added_lines: usize,
    pub removed_lines: usize,
    /// Unified-diff hunks, truncated
    pub diff_lines: Vec<String>,
    pub detected_at: DateTime<Utc>,
}
