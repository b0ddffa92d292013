// src/pipeline.rs
//! # Pipeline Orchestrator
//! One run, strictly sequential:
//!
//! ```text
//! Idle → Collecting → Filtering → Scoring → Generating → Publishing → Recording → Done
//!                          └──────────────┴───────────┴────────────┴──────────┴→ Aborted
//! ```
//!
//! Rules:
//! - the publish endpoint is checked before collecting; failure is a config abort
//! - fewer than `min_items_required` items after filtering aborts with a skip report
//! - publishing is not retried; a refused or failed publish aborts with an error report
//! - items are recorded only after a confirmed publish, then old rows are pruned
//! - every aborted or skipped run produces exactly one report

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, Credentials};
use crate::error::PipelineError;
use crate::filter::ContentFilter;
use crate::generate::{FallbackGenerator, GenerationRequest};
use crate::history::{HistoryStore, PublishHistory};
use crate::ingest::providers::{NitterCollector, RssCollector};
use crate::ingest::types::{Collector, Item};
use crate::ingest::{collect_all, KeywordGate};
use crate::notify::{ReportEvent, ReporterMux};
use crate::publish::{jst, jst_date, post_title, HatenaPublisher, Publisher};
use crate::rate_limit::RateLimiter;
use crate::retry::{CallGuard, RetryPolicy};
use crate::scoring::PopularityScorer;

pub const INSUFFICIENT_ITEMS: &str = "insufficient items";
pub const MANUAL_SKIP: &str = "manual skip";
pub const PUBLISH_RESOURCE: &str = "hatena";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Collecting,
    Filtering,
    Scoring,
    Generating,
    Publishing,
    Recording,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Collecting => "collecting",
            PipelineState::Filtering => "filtering",
            PipelineState::Scoring => "scoring",
            PipelineState::Generating => "generating",
            PipelineState::Publishing => "publishing",
            PipelineState::Recording => "recording",
            PipelineState::Done => "done",
            PipelineState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Published and recorded.
    Done {
        entry_url: Option<String>,
        published: usize,
        provider: String,
    },
    /// `skip_next_publish` was set; one skip report was sent.
    Skipped { reason: String },
    /// `maintenance_mode` was set; nothing ran and nothing was reported.
    Maintenance,
    /// The run stopped in `at`. `error` is `None` for a planned stop (too few items).
    Aborted {
        at: PipelineState,
        reason: String,
        error: Option<PipelineError>,
    },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Done { .. } => "done",
            RunOutcome::Skipped { .. } => "skipped",
            RunOutcome::Maintenance => "maintenance",
            RunOutcome::Aborted { error: None, .. } => "aborted_skip",
            RunOutcome::Aborted { error: Some(_), .. } => "aborted_error",
        }
    }

    /// Whether the process should exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Aborted { error: Some(_), .. })
    }
}

pub struct Pipeline {
    cfg: AppConfig,
    collectors: Vec<Box<dyn Collector>>,
    history: Arc<dyn PublishHistory>,
    filter: ContentFilter,
    scorer: PopularityScorer,
    generator: FallbackGenerator,
    publisher: Box<dyn Publisher>,
    publish_guard: CallGuard,
    reporters: ReporterMux,
}

impl Pipeline {
    pub fn new(
        cfg: AppConfig,
        collectors: Vec<Box<dyn Collector>>,
        history: Arc<dyn PublishHistory>,
        generator: FallbackGenerator,
        publisher: Box<dyn Publisher>,
        limiter: Arc<RateLimiter>,
        reporters: ReporterMux,
    ) -> Self {
        let publish_guard = CallGuard::from_config(limiter, &cfg, PUBLISH_RESOURCE)
            .with_retry(RetryPolicy::no_retry());
        Self {
            filter: ContentFilter::new(cfg.filter.clone()),
            scorer: PopularityScorer::from_config(&cfg.scoring),
            cfg,
            collectors,
            history,
            generator,
            publisher,
            publish_guard,
            reporters,
        }
    }

    /// Wire the production collaborators from configuration and credentials.
    pub fn from_config(
        cfg: AppConfig,
        creds: &Credentials,
        history: Arc<dyn PublishHistory>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, PipelineError> {
        let collectors = build_collectors(&cfg)?;
        let generator = FallbackGenerator::from_config(&cfg, creds, limiter.clone())?;
        let publisher = HatenaPublisher::new(creds, &cfg.pipeline.category)
            .map_err(|e| PipelineError::Config(format!("{e:#}")))?;
        let reporters = ReporterMux::from_credentials(creds)
            .map_err(|e| PipelineError::Config(format!("{e:#}")))?;
        Ok(Self::new(
            cfg,
            collectors,
            history,
            generator,
            Box::new(publisher),
            limiter,
            reporters,
        ))
    }

    pub async fn run(&self) -> RunOutcome {
        self.run_at(Utc::now()).await
    }

    /// One full run with an explicit clock (recency filter and post date).
    pub async fn run_at(&self, now: DateTime<Utc>) -> RunOutcome {
        let outcome = self.execute(now).await;
        counter!("pipeline_runs_total", "outcome" => outcome.label()).increment(1);
        gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
        match &outcome {
            RunOutcome::Done {
                entry_url,
                published,
                provider,
            } => info!(
                published,
                provider = %provider,
                entry_url = entry_url.as_deref().unwrap_or("-"),
                "run done"
            ),
            RunOutcome::Aborted { at, reason, .. } => {
                info!(state = %at, reason = %reason, "run aborted")
            }
            other => info!(outcome = other.label(), "run finished"),
        }
        outcome
    }

    async fn execute(&self, now: DateTime<Utc>) -> RunOutcome {
        let control = &self.cfg.control;
        if control.maintenance_mode {
            info!("maintenance mode is on, nothing to do");
            return RunOutcome::Maintenance;
        }
        if control.skip_next_publish {
            self.reporters
                .report(&ReportEvent::skip(MANUAL_SKIP, "skip_next_publish is set"))
                .await;
            return RunOutcome::Skipped {
                reason: MANUAL_SKIP.to_string(),
            };
        }

        let mut state = PipelineState::Idle;

        if let Err(e) = self.publisher.check_connection().await {
            let err = PipelineError::Config(format!(
                "{} endpoint check failed: {e:#}",
                self.publisher.name()
            ));
            return self.abort(state, err).await;
        }

        transition(&mut state, PipelineState::Collecting);
        let raw = collect_all(&self.collectors).await;

        transition(&mut state, PipelineState::Filtering);
        let filtered = match self.filter.filter_at(raw, self.history.as_ref(), now).await {
            Ok((kept, _report)) => kept,
            Err(e) => return self.abort(state, PipelineError::Store(e)).await,
        };
        let min = self.cfg.pipeline.min_items_required;
        if filtered.len() < min {
            let detail = format!("{} items after filtering, {} required", filtered.len(), min);
            self.reporters
                .report(&ReportEvent::skip(INSUFFICIENT_ITEMS, detail))
                .await;
            return RunOutcome::Aborted {
                at: state,
                reason: INSUFFICIENT_ITEMS.to_string(),
                error: None,
            };
        }

        transition(&mut state, PipelineState::Scoring);
        let mut ranked = self.scorer.score_and_rank(filtered);
        ranked.truncate(self.cfg.pipeline.max_items_per_post);

        transition(&mut state, PipelineState::Generating);
        let req = GenerationRequest {
            items: ranked,
            date: jst_date(now),
            target_length: self.cfg.generation.target_length,
        };
        let generated = match self.generator.generate(&req).await {
            Ok(g) => g,
            Err(e) => return self.abort(state, e).await,
        };

        transition(&mut state, PipelineState::Publishing);
        let title = post_title(&self.cfg.pipeline.post_title_format, now);
        let body = generated.text.as_str();
        let published = self
            .publish_guard
            .call(|| self.publisher.publish(&title, body))
            .await;
        let entry_url = match published {
            Ok(out) if out.success => out.entry_url,
            Ok(out) => {
                let detail = out.detail.unwrap_or_default();
                let err = PipelineError::Publish(format!(
                    "{} answered HTTP {}: {}",
                    self.publisher.name(),
                    out.status,
                    detail
                ));
                return self.abort(state, err).await;
            }
            Err(e) => {
                let err = PipelineError::Publish(format!("{e:#}"));
                return self.abort(state, err).await;
            }
        };

        transition(&mut state, PipelineState::Recording);
        if let Err(e) = self.record(&req.items).await {
            return self.abort(state, e).await;
        }
        match self.history.prune(self.cfg.pipeline.history_retention_days).await {
            Ok(removed) => debug!(removed, "history pruned"),
            Err(e) => warn!(error = %e, "history prune failed"),
        }

        transition(&mut state, PipelineState::Done);
        RunOutcome::Done {
            entry_url,
            published: req.items.len(),
            provider: generated.provider,
        }
    }

    async fn record(&self, items: &[Item]) -> Result<(), PipelineError> {
        let tz = jst();
        for it in items {
            let first_seen = it.published_at.map(|ts| ts.with_timezone(&tz).date_naive());
            let inserted = self.history.record(&it.url, &it.title, first_seen).await?;
            if !inserted {
                debug!(url = %it.url, "already in history");
            }
        }
        Ok(())
    }

    async fn abort(&self, at: PipelineState, error: PipelineError) -> RunOutcome {
        self.reporters
            .report(&ReportEvent::error(error.kind(), error.to_string()))
            .await;
        RunOutcome::Aborted {
            at,
            reason: error.kind().to_string(),
            error: Some(error),
        }
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    debug!(from = %state, to = %next, "pipeline state");
    *state = next;
}

/// A wired pipeline and the history store the caller closes after the run.
pub struct Prepared {
    pub pipeline: Pipeline,
    pub store: HistoryStore,
}

pub fn needs_gemini(cfg: &AppConfig) -> bool {
    cfg.generation.primary == "gemini" || cfg.generation.secondary == "gemini"
}

/// Validation, credentials, history store and wiring. A failure is sent once through
/// `reporters` and returned as an aborted outcome.
pub async fn prepare<F>(
    cfg: AppConfig,
    lookup: F,
    limiter: Arc<RateLimiter>,
    reporters: &ReporterMux,
) -> Result<Prepared, RunOutcome>
where
    F: Fn(&str) -> Option<String>,
{
    match try_prepare(cfg, lookup, limiter).await {
        Ok(prepared) => Ok(prepared),
        Err(error) => {
            reporters
                .report(&ReportEvent::error(error.kind(), error.to_string()))
                .await;
            counter!("pipeline_runs_total", "outcome" => "aborted_error").increment(1);
            Err(RunOutcome::Aborted {
                at: PipelineState::Idle,
                reason: error.kind().to_string(),
                error: Some(error),
            })
        }
    }
}

async fn try_prepare<F>(
    cfg: AppConfig,
    lookup: F,
    limiter: Arc<RateLimiter>,
) -> Result<Prepared, PipelineError>
where
    F: Fn(&str) -> Option<String>,
{
    cfg.validate()?;
    let creds = Credentials::from_lookup(needs_gemini(&cfg), lookup)?;
    let store = HistoryStore::open(&cfg.pipeline.history_db_path).await?;
    let history: Arc<dyn PublishHistory> = Arc::new(store.clone());
    match Pipeline::from_config(cfg, &creds, history, limiter) {
        Ok(pipeline) => Ok(Prepared { pipeline, store }),
        Err(e) => {
            store.close().await;
            Err(e)
        }
    }
}

/// RSS feeds always; the social collector only when accounts are configured.
pub fn build_collectors(cfg: &AppConfig) -> Result<Vec<Box<dyn Collector>>, PipelineError> {
    let gate = KeywordGate::from_config(&cfg.keywords);
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();
    let rss = RssCollector::new(&cfg.sources, gate.clone())
        .map_err(|e| PipelineError::Config(format!("{e:#}")))?;
    collectors.push(Box::new(rss));
    if cfg.sources.social.iter().any(|a| a.enabled) {
        let nitter = NitterCollector::new(&cfg.sources, &cfg.scoring.social_prefix, gate)
            .map_err(|e| PipelineError::Config(format!("{e:#}")))?;
        collectors.push(Box::new(nitter));
    }
    Ok(collectors)
}
