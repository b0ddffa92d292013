// src/ingest/providers/mod.rs
pub mod feed;
pub mod nitter;
pub mod rss;

pub use nitter::NitterCollector;
pub use rss::RssCollector;
