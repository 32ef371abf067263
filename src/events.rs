//! Progress events published by running sessions.

use crate::changes::ChangeEvent;
use crate::session::CrawlStats;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CrawlEvent {
    Started {
        session_id: Uuid,
        seed_url: String,
    },
    Progress {
        session_id: Uuid,
        stats: CrawlStats,
    },
    ChangeDetected {
        session_id: Uuid,
        change: ChangeEvent,
    },
    Completed {
        session_id: Uuid,
        stats: CrawlStats,
    },
    Cancelled {
        session_id: Uuid,
        stats: CrawlStats,
    },
    Failed {
        session_id: Uuid,
        stats: CrawlStats,
        error: String,
    },
}

impl CrawlEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            CrawlEvent::Started { session_id, .. }
            | CrawlEvent::Progress { session_id, .. }
            | CrawlEvent::ChangeDetected { session_id, .. }
            | CrawlEvent::Completed { session_id, .. }
            | CrawlEvent::Cancelled { session_id, .. }
            | CrawlEvent::Failed { session_id, .. } => *session_id,
        }
    }

    /// Whether this is the last event a session publishes
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CrawlEvent::Completed { .. } | CrawlEvent::Cancelled { .. } | CrawlEvent::Failed { .. }
        )
    }
}

/// Bounded fan-out of events to any number of subscribers.
///
/// Publishing never waits: a subscriber that falls behind loses the oldest
/// events and observes `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CrawlEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: CrawlEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.sender.subscribe()
    }
}
