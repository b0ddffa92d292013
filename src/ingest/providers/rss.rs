use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::time::Duration;

use crate::config::{FeedSource, SourcesConfig};
use crate::ingest::providers::feed::{parse_feed, FeedEntry};
use crate::ingest::types::{Collector, Item};
use crate::ingest::{normalize_text, truncate_chars, KeywordGate};

/// Feed summaries are cut to this many characters.
pub const MAX_SUMMARY_CHARS: usize = 200;

/// Collects from every enabled RSS / RDF / Atom feed in `[sources].rss`.
pub struct RssCollector {
    feeds: Vec<FeedSource>,
    max_entries: usize,
    gate: KeywordGate,
    client: reqwest::Client,
}

impl RssCollector {
    pub fn new(sources: &SourcesConfig, gate: KeywordGate) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(sources.user_agent.clone())
            .timeout(Duration::from_secs(sources.request_timeout_secs))
            .build()
            .context("building rss http client")?;
        Ok(Self {
            feeds: sources.rss.iter().filter(|f| f.enabled).cloned().collect(),
            max_entries: sources.max_entries,
            gate,
            client,
        })
    }

    async fn fetch(&self, feed: &FeedSource) -> Result<String> {
        let rsp = self
            .client
            .get(&feed.url)
            .send()
            .await
            .with_context(|| format!("GET {}", feed.url))?;
        let rsp = rsp
            .error_for_status()
            .with_context(|| format!("feed {} returned an error status", feed.name))?;
        rsp.text().await.context("reading feed body")
    }

    /// Turn raw feed text into items of one source. Missing dates become `now`.
    pub fn items_from_feed(
        xml: &str,
        source: &str,
        max_entries: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Item>> {
        let entries = parse_feed(xml, max_entries)
            .with_context(|| format!("parsing feed of {source}"))?;
        Ok(entries
            .into_iter()
            .filter_map(|e| entry_to_item(e, source, now))
            .collect())
    }
}

fn entry_to_item(e: FeedEntry, source: &str, now: DateTime<Utc>) -> Option<Item> {
    let title = normalize_text(&e.title);
    let url = e.link.trim().to_string();
    if title.is_empty() || url.is_empty() {
        return None;
    }
    let summary = truncate_chars(&normalize_text(&e.summary), MAX_SUMMARY_CHARS);
    let published = e.timestamp().unwrap_or(now);
    Some(Item::new(title, url, summary, source).with_published_at(published))
}

#[async_trait]
impl Collector for RssCollector {
    async fn collect(&self) -> Result<Vec<Item>> {
        let mut all = Vec::new();
        for feed in &self.feeds {
            let res = match self.fetch(feed).await {
                Ok(body) => Self::items_from_feed(&body, &feed.name, self.max_entries, Utc::now()),
                Err(e) => Err(e),
            };
            match res {
                Ok(mut items) => {
                    tracing::debug!(feed = %feed.name, count = items.len(), "feed parsed");
                    all.append(&mut items);
                }
                Err(e) => {
                    tracing::warn!(error = ?e, feed = %feed.name, "feed skipped");
                    counter!("ingest_source_errors_total").increment(1);
                }
            }
        }
        Ok(self.gate.apply(all))
    }

    fn name(&self) -> &str {
        "rss"
    }
}
