// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::config::KeywordConfig;
use crate::ingest::types::{Collector, Item};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series carry help text in the textfile).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Items returned by collectors.");
        describe_counter!(
            "ingest_source_errors_total",
            "Collector or feed fetch/parse failures."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Normalize feed text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Collapse whitespace (includes NBSP and newlines)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Keep at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Collector-side include/exclude keyword gate over `lower(title + " " + summary)`.
#[derive(Debug, Clone, Default)]
pub struct KeywordGate {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl KeywordGate {
    pub fn from_config(cfg: &KeywordConfig) -> Self {
        let lower = |v: &[String]| -> Vec<String> {
            v.iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            include: lower(&cfg.include),
            exclude: lower(&cfg.exclude),
        }
    }

    pub fn accepts(&self, item: &Item) -> bool {
        let text = format!("{} {}", item.title, item.summary).to_lowercase();
        if self.exclude.iter().any(|k| text.contains(k.as_str())) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|k| text.contains(k.as_str()))
    }

    pub fn apply(&self, items: Vec<Item>) -> Vec<Item> {
        items.into_iter().filter(|it| self.accepts(it)).collect()
    }
}

/// Run every collector in order. A failing collector contributes nothing.
pub async fn collect_all(collectors: &[Box<dyn Collector>]) -> Vec<Item> {
    ensure_metrics_described();

    let mut raw = Vec::new();
    for c in collectors {
        match c.collect().await {
            Ok(mut v) => {
                tracing::info!(collector = c.name(), count = v.len(), "collected");
                counter!("ingest_items_total").increment(v.len() as u64);
                raw.append(&mut v);
            }
            Err(e) => {
                let err = crate::error::PipelineError::Collection {
                    source_name: c.name().to_string(),
                    message: format!("{e:#}"),
                };
                tracing::warn!(error = %err, collector = c.name(), "collector error");
                counter!("ingest_source_errors_total").increment(1);
            }
        }
    }
    raw
}
