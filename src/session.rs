//! One crawl run: state machine, statistics and the driver that ties the
//! frontier, the worker pool and the change detector together.

use crate::changes::ChangeDetector;
use crate::config::CrawlConfig;
use crate::crawlers::http::build_client;
use crate::crawlers::web::{self, CrawlContext};
use crate::crawlers::fetcher_for;
use crate::error::Result;
use crate::events::{CrawlEvent, EventBus};
use crate::filter::{UrlFilter, UrlFilterConfig, UrlNormalizer};
use crate::frontier::{Frontier, FrontierLimits};
use crate::politeness::HostPacer;
use crate::results::FetchResult;
use crate::robots::{RobotsPolicy, origin_key};
use crate::sink::ContentSink;
use crate::sitemap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use url::Url;
use uuid::Uuid;

/// Aggregate counters of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub pages_crawled: usize,
    pub pages_failed: usize,
    pub pages_skipped: usize,
    /// Entries waiting in the frontier
    pub queue_size: usize,
    /// Distinct normalized URLs discovered
    pub urls_seen: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

/// What remains of a session once its resources are released
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub seed_url: String,
    pub status: SessionStatus,
    pub stats: CrawlStats,
    pub created_at: DateTime<Utc>,
    /// Set once the session has been archived
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct TrackerState {
    stats: CrawlStats,
    seed_error: Option<String>,
}

/// Session statistics and their event stream.
///
/// Counters change and the matching event is published under one lock, so
/// subscribers see events in the order the state changed.
#[derive(Debug)]
pub struct ProgressTracker {
    session_id: Uuid,
    frontier: Arc<Frontier>,
    bus: EventBus,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new(session_id: Uuid, frontier: Arc<Frontier>, bus: EventBus) -> Self {
        Self {
            session_id,
            frontier,
            bus,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Count a finished entry and publish the new totals
    pub fn record(&self, result: &FetchResult, is_seed: bool) {
        let mut state = self.lock();
        let status = result.status;
        if status.is_success() {
            state.stats.pages_crawled += 1;
        } else if status.is_skip() {
            state.stats.pages_skipped += 1;
        } else {
            state.stats.pages_failed += 1;
            if is_seed {
                state.seed_error = result.error.clone().or(Some(format!("{status:?}")));
            }
        }
        let stats = self.refresh(&mut state);
        self.bus.publish(CrawlEvent::Progress {
            session_id: self.session_id,
            stats,
        });
    }

    /// Publish an event built from the current totals
    pub fn publish(&self, event: impl FnOnce(Uuid, CrawlStats) -> CrawlEvent) -> CrawlStats {
        let mut state = self.lock();
        let stats = self.refresh(&mut state);
        self.bus.publish(event(self.session_id, stats));
        stats
    }

    pub fn snapshot(&self) -> CrawlStats {
        let mut state = self.lock();
        self.refresh(&mut state)
    }

    fn seed_error(&self) -> Option<String> {
        self.lock().seed_error.clone()
    }

    fn refresh(&self, state: &mut TrackerState) -> CrawlStats {
        state.stats.queue_size = self.frontier.pending_len();
        state.stats.urls_seen = self.frontier.seen_count();
        state.stats
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A single crawl from one seed URL
#[derive(Debug)]
pub struct CrawlSession {
    id: Uuid,
    seed: Url,
    config: CrawlConfig,
    created_at: DateTime<Utc>,
    client: reqwest::Client,
    filter: Arc<UrlFilter>,
    frontier: Arc<Frontier>,
    tracker: Arc<ProgressTracker>,
    status: watch::Sender<SessionStatus>,
    stop_requested: AtomicBool,
}

impl CrawlSession {
    /// Validate `config` and prepare a `Pending` session
    pub fn new(config: CrawlConfig, bus: EventBus) -> Result<Self> {
        let seed = config.validate()?;
        let filter = UrlFilter::new(UrlFilterConfig::for_session(&seed, &config))?;
        let client = build_client(&config)?;

        let id = Uuid::new_v4();
        let frontier = Arc::new(Frontier::new(
            FrontierLimits {
                max_pages: config.max_pages,
                max_depth: config.max_depth,
            },
            UrlNormalizer::new(config.sort_query_params),
        ));
        let tracker = Arc::new(ProgressTracker::new(id, Arc::clone(&frontier), bus));
        let (status, _) = watch::channel(SessionStatus::Pending);

        Ok(Self {
            id,
            seed,
            config,
            created_at: Utc::now(),
            client,
            filter: Arc::new(filter),
            frontier,
            tracker,
            status,
            stop_requested: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn seed_url(&self) -> &Url {
        &self.seed
    }

    /// Current status and totals, without the frontier or HTTP client
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            seed_url: self.seed.to_string(),
            status: self.status(),
            stats: self.stats(),
            created_at: self.created_at,
            finished_at: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn stats(&self) -> CrawlStats {
        self.tracker.snapshot()
    }

    /// Resolves once the session reaches a terminal state
    pub async fn wait(&self) -> SessionStatus {
        let mut rx = self.status.subscribe();
        let status = match rx.wait_for(SessionStatus::is_terminal).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        };
        status
    }

    /// Request cancellation.
    ///
    /// A pending session is cancelled on the spot. A running one stops
    /// handing out work at once and turns `Cancelled` after in-flight
    /// requests finish. Stopping a finished session does nothing.
    pub fn stop(&self) {
        if self.status().is_terminal() {
            return;
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        self.frontier.close();

        let was_pending = self.status.send_if_modified(|status| {
            if *status == SessionStatus::Pending {
                *status = SessionStatus::Cancelled;
                true
            } else {
                false
            }
        });
        if was_pending {
            ::log::info!("Session {} cancelled before start", self.id);
            self.tracker.publish(|session_id, stats| CrawlEvent::Cancelled { session_id, stats });
        } else {
            ::log::info!(
                "Session {} stopping with {} request(s) in flight",
                self.id,
                self.frontier.in_flight()
            );
        }
    }

    /// Drive the session to a terminal state and return it
    pub async fn run(
        self: Arc<Self>,
        detector: ChangeDetector,
        sink: Arc<dyn ContentSink>,
    ) -> SessionStatus {
        let started = self.status.send_if_modified(|status| {
            if *status == SessionStatus::Pending {
                *status = SessionStatus::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return self.status();
        }

        ::log::info!("Session {} crawling {}", self.id, self.seed);
        self.tracker.publish(|session_id, _| CrawlEvent::Started {
            session_id,
            seed_url: self.seed.to_string(),
        });

        self.frontier.push(self.seed.as_str(), 0, None);

        let robots = RobotsPolicy::new(self.client.clone(), &self.config.user_agent);
        if self.config.parse_sitemaps {
            self.seed_from_sitemaps(&robots).await;
        }

        let fetcher = fetcher_for(&self.config, self.client.clone());
        let context = Arc::new(CrawlContext {
            session_id: self.id,
            config: self.config.clone(),
            frontier: Arc::clone(&self.frontier),
            robots: self.config.respect_robots.then_some(robots),
            pacer: HostPacer::new(),
            fetcher: Arc::clone(&fetcher),
            filter: Arc::clone(&self.filter),
            normalizer: UrlNormalizer::new(self.config.sort_query_params),
            detector,
            sink,
            tracker: Arc::clone(&self.tracker),
        });

        web::run_workers(context).await;
        fetcher.shutdown().await;

        self.finish()
    }

    /// Offer sitemap URLs at depth 1 before any worker starts
    async fn seed_from_sitemaps(&self, robots: &RobotsPolicy) {
        let mut roots: Vec<String> = robots.rules_for(&self.seed).await.sitemaps().to_vec();
        let default_sitemap = format!("{}/sitemap.xml", origin_key(&self.seed));
        if !roots.contains(&default_sitemap) {
            roots.push(default_sitemap);
        }

        let urls = sitemap::collect_urls(&self.client, &roots, sitemap::MAX_SITEMAP_URLS).await;
        let mut admitted = 0;
        for raw in urls {
            if self.frontier.is_closed() {
                break;
            }
            let Ok(url) = Url::parse(&raw) else {
                continue;
            };
            if self.filter.should_crawl(&url) && self.frontier.push(url.as_str(), 1, None) {
                admitted += 1;
            }
        }
        ::log::info!("Session {} admitted {} sitemap URLs", self.id, admitted);
    }

    /// Settle the terminal state once every worker has exited
    fn finish(&self) -> SessionStatus {
        let stats = self.tracker.snapshot();
        let seed_error = self.tracker.seed_error();

        let (status, error) = if self.stop_requested.load(Ordering::SeqCst) {
            (SessionStatus::Cancelled, None)
        } else if stats.pages_crawled == 0 && self.frontier.accepted_count() == 1 && seed_error.is_some() {
            (SessionStatus::Failed, seed_error)
        } else {
            (SessionStatus::Completed, None)
        };

        self.status.send_replace(status);
        let stats = self.tracker.publish(|session_id, stats| match status {
            SessionStatus::Cancelled => CrawlEvent::Cancelled { session_id, stats },
            SessionStatus::Failed => CrawlEvent::Failed {
                session_id,
                stats,
                error: format!(
                    "seed {} failed: {}",
                    self.seed,
                    error.clone().unwrap_or_default()
                ),
            },
            _ => CrawlEvent::Completed { session_id, stats },
        });

        ::log::info!(
            "Session {} {:?}: {} crawled, {} failed, {} skipped, {} seen",
            self.id,
            status,
            stats.pages_crawled,
            stats.pages_failed,
            stats.pages_skipped,
            stats.urls_seen
        );
        status
    }
}
