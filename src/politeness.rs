//! Per-host request pacing.
//!
//! Each host gets its own async lock around the timestamp of its last
//! request, so two workers never burst the same host while unrelated hosts
//! proceed independently.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct HostPacer {
    hosts: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl HostPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until at least `min_gap` has passed since the last request to
    /// `host`, then record a request starting now.
    pub async fn wait_turn(&self, host: &str, min_gap: Duration) {
        let slot = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .value()
            .clone();

        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + min_gap;
            if ready_at > Instant::now() {
                ::log::trace!("Pacing {} for {:?}", host, ready_at - Instant::now());
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_host_is_spaced() {
        let pacer = Arc::new(HostPacer::new());
        let gap = Duration::from_millis(50);
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let pacer = Arc::clone(&pacer);
                tokio::spawn(async move { pacer.wait_turn("https://a.test", gap).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // Three requests need two full gaps between them
        assert!(start.elapsed() >= gap * 2);
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let pacer = HostPacer::new();
        let gap = Duration::from_secs(5);

        pacer.wait_turn("https://a.test", gap).await;
        let start = Instant::now();
        pacer.wait_turn("https://b.test", gap).await;
        assert!(start.elapsed() < Duration::from_secs(1));

        // A second request to `a` still waits out the gap
        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            pacer.wait_turn("https://a.test", gap),
        )
        .await;
        assert!(waited.is_err());
    }
}
