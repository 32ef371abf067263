//! Process-level registry of crawl sessions.

use crate::changes::ChangeDetector;
use crate::config::CrawlConfig;
use crate::error::{CrawlError, Result};
use crate::events::{CrawlEvent, EventBus};
use crate::session::{CrawlSession, CrawlStats, SessionStatus, SessionSummary};
use crate::sink::{ContentSink, NullSink};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_EVENT_BUFFER: usize = 1024;

/// A registered session: running, or archived once it reached a terminal state
enum SessionSlot {
    Live(Arc<CrawlSession>),
    Archived(SessionSummary),
}

impl SessionSlot {
    fn summary(&self) -> SessionSummary {
        match self {
            SessionSlot::Live(session) => session.summary(),
            SessionSlot::Archived(summary) => summary.clone(),
        }
    }
}

/// Starts, stops and observes crawl sessions.
///
/// The change detector and the content sink are shared by every session the
/// engine runs, so revisiting a URL in a later session diffs against what an
/// earlier one stored. A finished session drops its frontier and client and
/// is kept only as a [`SessionSummary`] until removed.
pub struct CrawlEngine {
    sessions: Arc<DashMap<Uuid, SessionSlot>>,
    detector: ChangeDetector,
    sink: Arc<dyn ContentSink>,
    bus: EventBus,
}

impl Default for CrawlEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlEngine {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            detector: ChangeDetector::default(),
            sink: Arc::new(NullSink),
            bus: EventBus::new(DEFAULT_EVENT_BUFFER),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ContentSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_detector(mut self, detector: ChangeDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Capacity of the event stream before slow subscribers lose events
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.bus = EventBus::new(capacity);
        self
    }

    /// Validate `config` and launch a session in the background.
    ///
    /// Configuration errors are returned here and no session is registered.
    /// Must be called from within a Tokio runtime.
    pub fn start_crawl(&self, config: CrawlConfig) -> Result<Uuid> {
        let session = Arc::new(CrawlSession::new(config, self.bus.clone())?);
        let id = session.id();
        self.sessions.insert(id, SessionSlot::Live(Arc::clone(&session)));
        ::log::info!("Registered session {} for {}", id, session.seed_url());

        let detector = self.detector.clone();
        let sink = Arc::clone(&self.sink);
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            Arc::clone(&session).run(detector, sink).await;
            archive(&sessions, &session);
        });
        Ok(id)
    }

    /// Cancel a session; a no-op for sessions already finished
    pub fn stop_crawl(&self, id: Uuid) -> Result<SessionStatus> {
        match self.live(id)? {
            Some(session) => {
                session.stop();
                Ok(session.status())
            }
            None => Ok(self.summary(id)?.status),
        }
    }

    /// Events of every session, in the order each session's state changed
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.bus.subscribe()
    }

    pub fn status(&self, id: Uuid) -> Result<SessionStatus> {
        Ok(self.summary(id)?.status)
    }

    pub fn stats(&self, id: Uuid) -> Result<CrawlStats> {
        Ok(self.summary(id)?.stats)
    }

    pub fn summary(&self, id: Uuid) -> Result<SessionSummary> {
        self.sessions
            .get(&id)
            .map(|slot| slot.summary())
            .ok_or(CrawlError::UnknownSession(id))
    }

    /// Wait for a session to reach a terminal state
    pub async fn wait(&self, id: Uuid) -> Result<SessionStatus> {
        match self.live(id)? {
            Some(session) => Ok(session.wait().await),
            None => self.status(id),
        }
    }

    /// Forget a finished session and return its final summary
    pub fn remove_session(&self, id: Uuid) -> Result<SessionSummary> {
        let removed = self
            .sessions
            .remove_if(&id, |_, slot| slot.summary().status.is_terminal());
        match removed {
            Some((_, slot)) => Ok(slot.summary()),
            None if self.sessions.contains_key(&id) => Err(CrawlError::SessionActive(id)),
            None => Err(CrawlError::UnknownSession(id)),
        }
    }

    /// Ids of all registered sessions
    pub fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.iter().map(|s| *s.key()).collect()
    }

    pub fn change_detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// The running session behind `id`, `None` once archived
    fn live(&self, id: Uuid) -> Result<Option<Arc<CrawlSession>>> {
        let slot = self.sessions.get(&id).ok_or(CrawlError::UnknownSession(id))?;
        Ok(match slot.value() {
            SessionSlot::Live(session) => Some(Arc::clone(session)),
            SessionSlot::Archived(_) => None,
        })
    }
}

/// Replace a terminated session with its summary, unless it was removed meanwhile
fn archive(sessions: &DashMap<Uuid, SessionSlot>, session: &CrawlSession) {
    if let Some(mut slot) = sessions.get_mut(&session.id()) {
        let mut summary = session.summary();
        summary.finished_at = Some(Utc::now());
        ::log::debug!("Archiving session {} as {:?}", summary.id, summary.status);
        *slot = SessionSlot::Archived(summary);
    }
}
