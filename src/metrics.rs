// src/metrics.rs
//! Prometheus recorder for a batch process.
//!
//! There is no scrape endpoint: the binary exits after one run, so the exposition
//! text is written to a file picked up by node-exporter's textfile collector.

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::fs;
use std::path::Path;

pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe();
        Ok(Self { handle })
    }

    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition text atomically (temp file + rename).
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let tmp = path.with_extension("prom.tmp");
        fs::write(&tmp, self.render()).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("renaming onto {}", path.display()))?;
        tracing::debug!(path = %path.display(), "metrics textfile written");
        Ok(())
    }
}

/// Help text for the pipeline-wide series. Collector series are described in `ingest`.
pub fn describe() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline runs by outcome.");
        describe_gauge!("pipeline_last_run_ts", "Unix time of the last finished run.");
        describe_counter!("filter_dropped_total", "Items dropped by filter stage.");
        describe_counter!(
            "external_calls_total",
            "Calls to rate-limited resources by outcome."
        );
        describe_histogram!(
            "rate_limit_wait_ms",
            "Time spent waiting for a rate-limit window, in milliseconds."
        );
        describe_counter!("history_pruned_total", "History rows removed by retention.");
    });
}
