use crate::changes::ChangeDetector;
use crate::config::CrawlConfig;
use crate::crawlers::{PageFetcher, RawPage};
use crate::error::FetchError;
use crate::events::CrawlEvent;
use crate::filter::{UrlFilter, UrlNormalizer};
use crate::frontier::{Frontier, FrontierEntry};
use crate::parsers::{ParseResult, Parser, ParserType};
use crate::politeness::HostPacer;
use crate::results::{FetchResult, FetchStatus};
use crate::robots::{RobotsPolicy, origin_key};
use crate::session::ProgressTracker;
use crate::sink::ContentSink;
use crate::utils::{backoff_delay, resolve_link};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use url::Url;
use uuid::Uuid;

/// Everything the workers of one session share
pub struct CrawlContext {
    pub session_id: Uuid,
    pub config: CrawlConfig,
    pub frontier: Arc<Frontier>,
    /// `None` when robots.txt is not respected
    pub robots: Option<RobotsPolicy>,
    pub pacer: HostPacer,
    pub fetcher: Arc<dyn PageFetcher>,
    pub filter: Arc<UrlFilter>,
    pub normalizer: UrlNormalizer,
    pub detector: ChangeDetector,
    pub sink: Arc<dyn ContentSink>,
    pub tracker: Arc<ProgressTracker>,
}

/// Runs exactly `concurrent` workers until the frontier closes
pub async fn run_workers(ctx: Arc<CrawlContext>) {
    let mut workers = JoinSet::new();
    for worker_id in 0..ctx.config.concurrent {
        ::log::trace!("Spawning worker {}", worker_id);
        workers.spawn(worker_loop(worker_id, Arc::clone(&ctx)));
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            // A lost worker leaves its entry in flight forever; end the crawl instead of hanging
            ::log::error!("Session {} worker task failed: {}", ctx.session_id, e);
            ctx.frontier.close();
        }
    }
    ::log::debug!("Session {} all {} workers done", ctx.session_id, ctx.config.concurrent);
}

async fn worker_loop(worker_id: usize, ctx: Arc<CrawlContext>) {
    ::log::debug!("Worker {} starting processing loop", worker_id);

    while let Some(entry) = ctx.frontier.pop().await {
        ::log::trace!("Worker {} processing: {}", worker_id, entry.url);
        if let Some(result) = process_entry(worker_id, &ctx, &entry).await {
            record_result(&ctx, &entry, &result).await;
        }
        ctx.frontier.complete();
    }

    ::log::debug!("Worker {} finished, frontier closed", worker_id);
}

/// Fetch one entry with robots check, pacing and retries.
///
/// Returns `None` when the frontier closed before the entry produced an
/// outcome worth recording.
async fn process_entry(
    worker_id: usize,
    ctx: &CrawlContext,
    entry: &FrontierEntry,
) -> Option<FetchResult> {
    let url = &entry.url;

    if let Some(robots) = &ctx.robots {
        if !robots.is_allowed(url, &ctx.config.user_agent).await {
            ::log::info!("Worker {} robots.txt disallows {}", worker_id, url);
            return Some(FetchResult::without_request(url.clone(), FetchStatus::RobotsBlocked));
        }
    }

    let host = origin_key(url);
    let gap = min_gap(ctx, &host);
    let mut attempts = 0;
    let mut last_error: Option<FetchError> = None;

    loop {
        tokio::select! {
            biased;
            _ = ctx.frontier.closed() => return abandon(worker_id, url, attempts, last_error),
            _ = ctx.pacer.wait_turn(&host, gap) => {}
        }

        attempts += 1;
        let error = match ctx.fetcher.fetch(url).await {
            Ok(page) => return Some(build_success(worker_id, ctx, entry, page, attempts)),
            Err(e) => e,
        };

        let retries_used = attempts - 1;
        if !error.is_transient() || retries_used >= ctx.config.max_retries {
            ::log::warn!(
                "Worker {} giving up on {} after {} attempt(s): {}",
                worker_id,
                url,
                attempts,
                error
            );
            return Some(failure(url, attempts, &error));
        }

        let delay = backoff_delay(attempts, ctx.config.retry_base_delay_ms);
        ::log::info!(
            "Worker {} retrying {} in {:?} after: {}",
            worker_id,
            url,
            delay,
            error
        );
        last_error = Some(error);

        tokio::select! {
            biased;
            _ = ctx.frontier.closed() => return abandon(worker_id, url, attempts, last_error),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Minimum spacing between two requests to `host`
fn min_gap(ctx: &CrawlContext, host: &str) -> Duration {
    let delay = ctx.config.delay_duration();
    ctx.robots
        .as_ref()
        .and_then(|robots| robots.crawl_delay(host))
        .map_or(delay, |crawl_delay| crawl_delay.max(delay))
}

/// Outcome of an entry interrupted by cancellation: a page that already
/// failed keeps its failure, an untouched page is dropped
fn abandon(
    worker_id: usize,
    url: &Url,
    attempts: u32,
    last_error: Option<FetchError>,
) -> Option<FetchResult> {
    ::log::debug!("Worker {} abandoning {}, frontier closed", worker_id, url);
    last_error.map(|error| failure(url, attempts, &error))
}

fn failure(url: &Url, attempts: u32, error: &FetchError) -> FetchResult {
    let status = match error {
        FetchError::Timeout(_) => FetchStatus::Timeout,
        FetchError::Status(code) => FetchStatus::HttpError(*code),
        FetchError::Network(_)
        | FetchError::Render(_)
        | FetchError::InvalidUrl(_)
        | FetchError::ContentTooLarge(_) => FetchStatus::NetworkError,
    };
    FetchResult::failed(url.clone(), status, attempts, error.to_string())
}

fn build_success(
    worker_id: usize,
    ctx: &CrawlContext,
    entry: &FrontierEntry,
    page: RawPage,
    attempts: u32,
) -> FetchResult {
    let parser_type =
        ParserType::from_content_type(page.content_type.as_deref(), page.final_url.as_str());
    let parsed = match parser_type {
        ParserType::Other => ParseResult::default(),
        _ => Parser::parse(&page.text(), parser_type),
    };

    let links = resolve_links(
        &page.final_url,
        &parsed,
        &ctx.filter,
        &ctx.normalizer,
        ctx.config.respect_nofollow,
    );
    let text = match parser_type {
        ParserType::Other => String::new(),
        _ => parsed.line_text(),
    };
    let mut meta = parsed.meta;
    meta.canonical_url = meta
        .canonical_url
        .and_then(|href| resolve_link(&page.final_url, &href))
        .map(String::from);
    ::log::debug!(
        "Worker {} found {} crawlable links in {}",
        worker_id,
        links.len(),
        entry.url
    );

    FetchResult {
        url: entry.url.clone(),
        final_url: page.final_url,
        status: FetchStatus::Success,
        http_status: Some(page.status),
        content_type: page.content_type,
        parser_type,
        content: Some(page.body),
        links,
        fetched_at: Utc::now(),
        title: parsed.title,
        text,
        meta,
        attempts,
        error: None,
    }
}

/// Absolute, deduplicated, in-scope links of a parsed page in document order
pub fn resolve_links(
    base: &Url,
    parsed: &ParseResult,
    filter: &UrlFilter,
    normalizer: &UrlNormalizer,
    respect_nofollow: bool,
) -> Vec<Url> {
    let mut seen = HashSet::new();
    parsed
        .followable_links(respect_nofollow)
        .filter_map(|href| resolve_link(base, href))
        .filter_map(|url| normalizer.normalize(&url))
        .filter(|url| filter.should_crawl(url))
        .filter(|url| seen.insert(url.to_string()))
        .collect()
}

/// Hand a finished entry to the frontier, change detector, sink and stats
async fn record_result(ctx: &CrawlContext, entry: &FrontierEntry, result: &FetchResult) {
    if result.status.is_success() {
        let next_depth = entry.depth + 1;
        if next_depth <= ctx.config.max_depth {
            let admitted = result
                .links
                .iter()
                .filter(|link| ctx.frontier.push(link.as_str(), next_depth, Some(&entry.url)))
                .count();
            ::log::debug!("Queued {} of {} links from {}", admitted, result.links.len(), entry.url);
        }

        if result.parser_type != ParserType::Other {
            let change = ctx
                .detector
                .record_with_threshold(entry.url.as_str(), &result.text, ctx.config.change_threshold)
                .await;
            if let Some(change) = change {
                if let Err(e) = ctx.sink.store_change(&change).await {
                    ::log::error!("Failed to store change for {}: {}", entry.url, e);
                }
                ctx.tracker.publish(|session_id, _| CrawlEvent::ChangeDetected { session_id, change });
            }
        }
    }

    if let Err(e) = ctx.sink.store_page(&result.to_record(entry)).await {
        ::log::error!("Failed to store page {}: {}", entry.url, e);
    }

    ctx.tracker.record(result, entry.depth == 0);
}
