//! URL frontier: the pending-work queue of a crawl session.
//!
//! Entries pop in depth order (breadth-first bias) with FIFO tie-breaking,
//! so crawl order is deterministic for a given link-discovery order. The
//! seen-set is a sharded map keyed by normalized URL; the heap sits behind a
//! short mutex that is never held across an await.

use crate::filter::UrlNormalizer;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A URL admitted to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Normalized URL
    pub url: Url,
    /// Hops from the seed URL
    pub depth: u32,
    /// Ordering rank, lower pops first
    pub priority: i64,
    /// Page this URL was discovered on
    pub discovered_from: Option<Url>,
}

#[derive(Debug)]
struct Queued {
    entry: FrontierEntry,
    seq: u64,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // BinaryHeap is a max-heap: the smallest (priority, seq) must compare greatest
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .entry
            .priority
            .cmp(&self.entry.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
    in_flight: usize,
}

/// Budgets enforced on admission
#[derive(Debug, Clone, Copy)]
pub struct FrontierLimits {
    pub max_pages: usize,
    pub max_depth: u32,
}

/// Priority queue with dedup and depth/page budgets
#[derive(Debug)]
pub struct Frontier {
    limits: FrontierLimits,
    normalizer: UrlNormalizer,
    seen: DashMap<String, ()>,
    accepted: AtomicUsize,
    state: Mutex<QueueState>,
    available: Notify,
    closed: CancellationToken,
}

impl Frontier {
    pub fn new(limits: FrontierLimits, normalizer: UrlNormalizer) -> Self {
        Self {
            limits,
            normalizer,
            seen: DashMap::new(),
            accepted: AtomicUsize::new(0),
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Offer a URL to the frontier.
    ///
    /// Returns whether the URL was admitted. Rejection (already seen, too
    /// deep, page budget spent, closed, not an http(s) URL) is silent.
    pub fn push(&self, url: &str, depth: u32, discovered_from: Option<&Url>) -> bool {
        if self.is_closed() || depth > self.limits.max_depth {
            return false;
        }

        let Some(normalized) = self.normalizer.normalize_str(url) else {
            ::log::trace!("Frontier rejected unparseable URL: {}", url);
            return false;
        };

        // The seen-set insert is the admission point: only one concurrent
        // push can observe the vacant entry for a given key.
        if self.seen.insert(normalized.to_string(), ()).is_some() {
            return false;
        }

        // A URL refused for budget stays marked seen; the budget never frees up.
        let reserved = self
            .accepted
            .fetch_update(AtomicOrdering::AcqRel, AtomicOrdering::Acquire, |n| {
                (n < self.limits.max_pages).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            ::log::debug!("Page budget reached, dropping {}", normalized);
            return false;
        }

        let entry = FrontierEntry {
            url: normalized,
            depth,
            priority: i64::from(depth),
            discovered_from: discovered_from.cloned(),
        };

        {
            let mut state = self.lock_state();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(Queued { entry, seq });
        }
        self.available.notify_one();
        true
    }

    /// Remove and return the highest-priority entry.
    ///
    /// Suspends while the frontier is empty and open. Returns `None` once the
    /// frontier is closed, even if entries are still queued.
    pub async fn pop(&self) -> Option<FrontierEntry> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before inspecting the heap so a concurrent push cannot slip by
            notified.as_mut().enable();

            if self.is_closed() {
                return None;
            }

            {
                let mut state = self.lock_state();
                if let Some(queued) = state.heap.pop() {
                    state.in_flight += 1;
                    return Some(queued.entry);
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.closed.cancelled() => return None,
            }
        }
    }

    /// Mark one popped entry as finished.
    ///
    /// Links discovered while processing the entry must be pushed before
    /// this call. When nothing is pending and nothing is in flight the
    /// frontier closes itself.
    pub fn complete(&self) {
        let drained = {
            let mut state = self.lock_state();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.in_flight == 0 && state.heap.is_empty()
        };
        if drained {
            ::log::debug!("Frontier drained, closing");
            self.close();
        }
    }

    /// Signal that no more entries will be handed out. Idempotent.
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            self.closed.cancel();
            self.available.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the frontier is closed
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Entries waiting to be popped
    pub fn pending_len(&self) -> usize {
        self.lock_state().heap.len()
    }

    /// Entries popped but not yet completed
    pub fn in_flight(&self) -> usize {
        self.lock_state().in_flight
    }

    /// Distinct normalized URLs ever offered
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// URLs admitted against the page budget
    pub fn accepted_count(&self) -> usize {
        self.accepted.load(AtomicOrdering::Acquire)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // Critical sections never panic, so a poisoned lock still holds valid state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
