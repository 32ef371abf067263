pub mod fetcher;
pub mod http;
pub mod render;
pub mod web;

pub use fetcher::{PageFetcher, RawPage, fetcher_for};
pub use http::HttpFetcher;
pub use render::RenderFetcher;
