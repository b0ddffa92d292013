// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// One news item as it flows through the pipeline.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Item {
    pub title: String,
    pub url: String,
    pub summary: String,
    /// `None` when the feed carried no usable date.
    pub published_at: Option<DateTime<Utc>>,
    pub source: String, // e.g., "ITmedia AI+", "Twitter - usutaku"
    /// Popularity score; collectors may pre-seed it (social posts), the scorer overwrites it.
    pub score: f64,
}

impl Item {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        summary: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            summary: summary.into(),
            published_at: None,
            source: source.into(),
            score: 0.0,
        }
    }

    pub fn with_published_at(mut self, ts: DateTime<Utc>) -> Self {
        self.published_at = Some(ts);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score.max(0.0);
        self
    }
}

/// A source of raw items. The pipeline does not care how they are fetched.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self) -> Result<Vec<Item>>;
    fn name(&self) -> &str;
}
