use clap::Parser;
use crawl_engine::{CrawlEngine, CrawlEvent, JsonLinesSink, SessionStatus};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

mod args;
use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();
    let output = args.output.clone();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            ::log::error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut engine = CrawlEngine::new();
    if let Some(path) = output {
        match JsonLinesSink::open(&path).await {
            Ok(sink) => engine = engine.with_sink(Arc::new(sink)),
            Err(e) => {
                ::log::error!("Cannot open output {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }
    let engine = Arc::new(engine);

    let mut events = engine.subscribe();
    let id = match engine.start_crawl(config) {
        Ok(id) => id,
        Err(e) => {
            ::log::error!("Failed to start crawl: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let stopper = Arc::clone(&engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::warn!("Interrupted, stopping session {}", id);
            let _ = stopper.stop_crawl(id);
        }
    });

    let start_time = std::time::Instant::now();
    loop {
        match events.recv().await {
            Ok(CrawlEvent::Progress { stats, .. }) => {
                ::log::info!(
                    "crawled {} failed {} skipped {} queued {} seen {}",
                    stats.pages_crawled,
                    stats.pages_failed,
                    stats.pages_skipped,
                    stats.queue_size,
                    stats.urls_seen
                );
            }
            Ok(CrawlEvent::ChangeDetected { change, .. }) => {
                ::log::info!("Changed: {} ({})", change.url, change.diff_summary);
            }
            Ok(event) if event.is_terminal() => break,
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                ::log::debug!("Progress output skipped {} events", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }

    let status = engine.wait(id).await.unwrap_or(SessionStatus::Failed);
    let stats = engine.stats(id).unwrap_or_default();
    println!(
        "{:?}: {} pages crawled, {} failed, {} skipped in {:.2} seconds",
        status,
        stats.pages_crawled,
        stats.pages_failed,
        stats.pages_skipped,
        start_time.elapsed().as_secs_f64()
    );

    match status {
        SessionStatus::Failed => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}
