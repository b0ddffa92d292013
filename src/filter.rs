//! # Content Filter
//!
//! Three sequential stages over one batch, each keeping arrival order:
//! 1) **dedup**: url already seen earlier in the batch, or already published (history)
//! 2) **recency**: known publication time older than `recency_days`; unknown times are kept
//! 3) **quality**: trimmed title / summary too short, or url not http(s)
//!
//! Lengths are counted in characters, not bytes, so Japanese titles are judged fairly.
//! The only failure is a history store error; the stages themselves are total.

use std::collections::HashSet;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use tracing::{debug, info};

use crate::config::FilterConfig;
use crate::history::PublishHistory;
use crate::ingest::types::Item;

/// Per-stage drop counts for one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    pub input: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub low_quality: usize,
    pub kept: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    cfg: FilterConfig,
}

impl ContentFilter {
    pub fn new(cfg: FilterConfig) -> Self {
        Self { cfg }
    }

    pub async fn filter(
        &self,
        items: Vec<Item>,
        history: &dyn PublishHistory,
    ) -> Result<Vec<Item>, sqlx::Error> {
        let (kept, _) = self.filter_at(items, history, Utc::now()).await?;
        Ok(kept)
    }

    /// All three stages with an explicit clock; also returns the drop counts.
    pub async fn filter_at(
        &self,
        items: Vec<Item>,
        history: &dyn PublishHistory,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Item>, FilterReport), sqlx::Error> {
        let mut report = FilterReport {
            input: items.len(),
            ..FilterReport::default()
        };

        let unique = self.dedup(items, history).await?;
        report.duplicates = report.input - unique.len();

        let n = unique.len();
        let recent = self.recency(unique, now);
        report.stale = n - recent.len();

        let n = recent.len();
        let kept = self.quality(recent);
        report.low_quality = n - kept.len();
        report.kept = kept.len();

        counter!("filter_dropped_total", "stage" => "dedup").increment(report.duplicates as u64);
        counter!("filter_dropped_total", "stage" => "recency").increment(report.stale as u64);
        counter!("filter_dropped_total", "stage" => "quality").increment(report.low_quality as u64);
        info!(
            input = report.input,
            duplicates = report.duplicates,
            stale = report.stale,
            low_quality = report.low_quality,
            kept = report.kept,
            "content filter finished"
        );

        Ok((kept, report))
    }

    /// Drop repeated urls within the batch and urls the history already knows.
    pub async fn dedup(
        &self,
        items: Vec<Item>,
        history: &dyn PublishHistory,
    ) -> Result<Vec<Item>, sqlx::Error> {
        let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
        let mut out = Vec::with_capacity(items.len());
        for it in items {
            if !seen.insert(it.url.clone()) {
                debug!(url = %it.url, "duplicate within batch");
                continue;
            }
            if history.is_duplicate(&it.url).await? {
                debug!(url = %it.url, "already published");
                continue;
            }
            out.push(it);
        }
        Ok(out)
    }

    pub fn recency(&self, items: Vec<Item>, now: DateTime<Utc>) -> Vec<Item> {
        let cutoff = now - ChronoDuration::days(i64::from(self.cfg.recency_days));
        items
            .into_iter()
            .filter(|it| match it.published_at {
                Some(ts) => ts >= cutoff,
                None => true,
            })
            .collect()
    }

    pub fn quality(&self, items: Vec<Item>) -> Vec<Item> {
        items.into_iter().filter(|it| self.passes_quality(it)).collect()
    }

    pub fn passes_quality(&self, it: &Item) -> bool {
        it.title.trim().chars().count() >= self.cfg.min_title_chars
            && it.summary.trim().chars().count() >= self.cfg.min_summary_chars
            && (it.url.starts_with("http://") || it.url.starts_with("https://"))
    }
}
