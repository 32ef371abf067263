use crawl_engine::{CrawlConfig, CrawlEngine, CrawlEvent, MemorySink};
use std::error::Error;
use std::sync::Arc;

/// Crawl a site twice and print progress plus any content changes between
/// the two visits.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let seed = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com".to_string());

    let sink = Arc::new(MemorySink::new());
    let engine = CrawlEngine::new().with_sink(sink.clone());
    let mut events = engine.subscribe();

    for round in 1..=2 {
        let mut config = CrawlConfig::new(&seed);
        config.max_pages = 20;
        config.max_depth = 2;
        config.concurrent = 4;

        let id = engine.start_crawl(config)?;
        println!("Round {round}: session {id}");

        while let Ok(event) = events.recv().await {
            if event.session_id() != id {
                continue;
            }
            match &event {
                CrawlEvent::Progress { stats, .. } => println!(
                    "  {} crawled, {} failed, {} skipped, {} queued",
                    stats.pages_crawled, stats.pages_failed, stats.pages_skipped, stats.queue_size
                ),
                CrawlEvent::ChangeDetected { change, .. } => {
                    println!("  {} changed by {:.2}%", change.url, change.change_percent)
                }
                _ => {}
            }
            if event.is_terminal() {
                println!("  finished: {:?}", engine.status(id)?);
                break;
            }
        }
    }

    println!(
        "Stored {} pages, {} changes; tracking {} URLs",
        sink.pages().len(),
        sink.changes().len(),
        engine.change_detector().tracked_urls().len()
    );
    Ok(())
}
