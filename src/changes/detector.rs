use crate::changes::diff::{self, LineDiff};
use crate::changes::{ChangeEvent, ChangeType, PageVersion, VersionStore};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Hex-encoded SHA-256 of page content
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Human-readable description of a change
fn summarize(change_type: ChangeType, diff: &LineDiff, percent: f64) -> String {
    let label = match change_type {
        ChangeType::Added => "Content added",
        ChangeType::Removed => "Content removed",
        ChangeType::Modified if percent < 5.0 => "Minor text changes",
        ChangeType::Modified if percent < 20.0 => "Moderate content update",
        ChangeType::Modified if percent < 50.0 => "Significant content changes",
        ChangeType::Modified => "Major page restructure",
    };
    format!(
        "{label}: {} lines added, {} removed ({percent:.2}%)",
        diff.added, diff.removed
    )
}

/// Compares each fetched page with its previous version and records
/// changes that pass a significance threshold.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    store: Arc<VersionStore>,
    threshold: f64,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(Arc::new(VersionStore::new()))
    }
}

impl ChangeDetector {
    pub fn new(store: Arc<VersionStore>) -> Self {
        Self {
            store,
            threshold: 0.0,
        }
    }

    /// Default threshold used by [`record`](Self::record); an event needs a
    /// change percentage strictly greater than this.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    pub async fn record(&self, url: &str, content: &str) -> Option<ChangeEvent> {
        self.record_with_threshold(url, content, self.threshold).await
    }

    /// Store `content` as the newest version of `url` and diff it against
    /// the previous one.
    ///
    /// The first sighting and unchanged content produce no event, and
    /// unchanged content does not add a version either.
    pub async fn record_with_threshold(
        &self,
        url: &str,
        content: &str,
        threshold: f64,
    ) -> Option<ChangeEvent> {
        let hash = content_hash(content);
        let mut lineage = self.store.lock(url).await;

        let previous = lineage.latest().cloned();
        if previous.as_ref().is_some_and(|p| p.content_hash == hash) {
            ::log::trace!("No change for {}", url);
            return None;
        }

        let version = self.store.append(
            &mut lineage,
            PageVersion {
                id: 0,
                url: url.to_string(),
                content_hash: hash,
                content_snapshot: content.to_string(),
                captured_at: Utc::now(),
            },
        );

        let Some(previous) = previous else {
            ::log::debug!("Tracking new URL {} as version {}", url, version.id);
            return None;
        };

        let diff = diff::diff_text(&previous.content_snapshot, content);
        let change_percent = diff.change_percent();
        if change_percent <= threshold {
            ::log::debug!(
                "Change of {:.2}% on {} is below threshold {:.2}%",
                change_percent,
                url,
                threshold
            );
            return None;
        }

        let change_type = if previous.content_snapshot.is_empty() {
            ChangeType::Added
        } else if content.is_empty() {
            ChangeType::Removed
        } else {
            ChangeType::Modified
        };

        let event = ChangeEvent {
            url: url.to_string(),
            old_version_id: previous.id,
            new_version_id: version.id,
            change_percent,
            change_type,
            diff_summary: summarize(change_type, &diff, change_percent),
            added_lines: diff.added,
            removed_lines: diff.removed,
            diff_lines: diff.lines,
            detected_at: Utc::now(),
        };
        ::log::info!("{} changed: {}", url, event.diff_summary);
        lineage.push_change(event.clone());
        Some(event)
    }

    pub async fn history(&self, url: &str) -> Vec<Arc<PageVersion>> {
        self.store.history(url).await
    }

    pub async fn latest(&self, url: &str) -> Option<Arc<PageVersion>> {
        self.store.latest(url).await
    }

    pub fn version(&self, id: u64) -> Option<Arc<PageVersion>> {
        self.store.version(id)
    }

    pub async fn changes_for(&self, url: &str) -> Vec<ChangeEvent> {
        self.store.changes_for(url).await
    }

    pub fn tracked_urls(&self) -> Vec<String> {
        self.store.tracked_urls()
    }
}
