pub mod changes;
pub mod config;
pub mod crawlers;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod frontier;
pub mod parsers;
pub mod politeness;
pub mod results;
pub mod robots;
pub mod session;
pub mod sink;
pub mod sitemap;
pub mod utils;

// Re-export commonly used types for convenience
pub use changes::{ChangeDetector, ChangeEvent, ChangeType, PageVersion};
pub use config::CrawlConfig;
pub use engine::CrawlEngine;
pub use error::{CrawlError, FetchError, Result};
pub use events::CrawlEvent;
pub use results::{ContentRecord, FetchResult, FetchStatus};
pub use session::{CrawlStats, SessionStatus, SessionSummary};
pub use sink::{ContentSink, JsonLinesSink, MemorySink};
