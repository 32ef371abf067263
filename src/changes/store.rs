use crate::changes::{ChangeEvent, PageVersion};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Versions and emitted changes of one URL
#[derive(Debug, Default)]
pub struct Lineage {
    versions: Vec<Arc<PageVersion>>,
    changes: Vec<ChangeEvent>,
}

impl Lineage {
    pub fn latest(&self) -> Option<&Arc<PageVersion>> {
        self.versions.last()
    }

    pub(crate) fn push_change(&mut self, change: ChangeEvent) {
        self.changes.push(change);
    }
}

/// Process-wide, append-only version store keyed by URL.
///
/// Each URL has its own async lock so writers to one URL are serialized
/// while unrelated URLs proceed in parallel.
#[derive(Debug)]
pub struct VersionStore {
    lineages: DashMap<String, Arc<Mutex<Lineage>>>,
    by_id: DashMap<u64, Arc<PageVersion>>,
    next_id: AtomicU64,
}

impl Default for VersionStore {
    fn default() -> Self {
        Self {
            lineages: DashMap::new(),
            by_id: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the lineage of `url`, creating an empty one if needed
    pub async fn lock(&self, url: &str) -> OwnedMutexGuard<Lineage> {
        // Clone the Arc out so the shard lock is released before awaiting
        let lineage = self
            .lineages
            .entry(url.to_string())
            .or_default()
            .value()
            .clone();
        lineage.lock_owned().await
    }

    /// Append a new version to a locked lineage and index it by id
    pub fn append(&self, lineage: &mut Lineage, mut version: PageVersion) -> Arc<PageVersion> {
        version.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let version = Arc::new(version);
        lineage.versions.push(Arc::clone(&version));
        self.by_id.insert(version.id, Arc::clone(&version));
        version
    }

    pub fn version(&self, id: u64) -> Option<Arc<PageVersion>> {
        self.by_id.get(&id).map(|v| Arc::clone(v.value()))
    }

    pub async fn history(&self, url: &str) -> Vec<Arc<PageVersion>> {
        match self.existing(url) {
            Some(lineage) => lineage.lock().await.versions.clone(),
            None => Vec::new(),
        }
    }

    pub async fn latest(&self, url: &str) -> Option<Arc<PageVersion>> {
        let lineage = self.existing(url)?;
        let guard = lineage.lock().await;
        guard.latest().cloned()
    }

    pub async fn changes_for(&self, url: &str) -> Vec<ChangeEvent> {
        match self.existing(url) {
            Some(lineage) => lineage.lock().await.changes.clone(),
            None => Vec::new(),
        }
    }

    /// URLs with at least one stored version, sorted
    pub fn tracked_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .by_id
            .iter()
            .map(|entry| entry.value().url.clone())
            .collect();
        urls.sort_unstable();
        urls.dedup();
        urls
    }

    fn existing(&self, url: &str) -> Option<Arc<Mutex<Lineage>>> {
        self.lineages.get(url).map(|l| Arc::clone(l.value()))
    }
}
