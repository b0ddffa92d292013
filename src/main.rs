//! AI news publisher: binary entrypoint.
//!
//! One invocation is one batch job. `run` (the default) collects, filters, ranks,
//! generates and publishes a single post; `check`, `prune` and `history` are
//! maintenance commands over the same config and history store.

use std::process::ExitCode;
use std::sync::Arc;

use ai_news_publisher::cli::{Cli, Command};
use ai_news_publisher::config::{AppConfig, Credentials};
use ai_news_publisher::error::PipelineError;
use ai_news_publisher::history::{HistoryStore, PublishHistory};
use ai_news_publisher::metrics::Metrics;
use ai_news_publisher::notify::{ReportEvent, ReporterMux};
use ai_news_publisher::pipeline::{needs_gemini, prepare, Prepared, RunOutcome};
use ai_news_publisher::publish::{HatenaPublisher, Publisher};
use ai_news_publisher::rate_limit::RateLimiter;
use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` filter (default `info`); `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        fmt().with_env_filter(filter).json().with_current_span(false).init();
    } else {
        fmt().with_env_filter(filter).with_target(true).compact().init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let command = cli.command();
    let cfg = match AppConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            if command == Command::Run {
                ReporterMux::from_env()
                    .report(&ReportEvent::error("config", format!("{e:#}")))
                    .await;
            }
            return Err(e);
        }
    };

    match command {
        Command::Run => run(cfg).await,
        Command::Check => {
            cfg.validate()?;
            check(cfg).await
        }
        Command::Prune { days } => {
            cfg.validate()?;
            let days = days.unwrap_or(cfg.pipeline.history_retention_days);
            let store = open_store(&cfg).await?;
            let removed = store.prune(days).await.map_err(PipelineError::Store)?;
            info!(removed, days, "history pruned");
            store.close().await;
            Ok(ExitCode::SUCCESS)
        }
        Command::History { days } => {
            cfg.validate()?;
            let store = open_store(&cfg).await?;
            let rows = store.recent(days).await.map_err(PipelineError::Store)?;
            for r in &rows {
                println!("{}\t{}\t{}", r.first_seen, r.url, r.title);
            }
            info!(count = rows.len(), days, "history listed");
            store.close().await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn open_store(cfg: &AppConfig) -> Result<HistoryStore, PipelineError> {
    let store = HistoryStore::open(&cfg.pipeline.history_db_path).await?;
    Ok(store)
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    if outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(cfg: AppConfig) -> anyhow::Result<ExitCode> {
    if cfg.control.maintenance_mode {
        info!("maintenance mode is on, exiting");
        return Ok(ExitCode::SUCCESS);
    }

    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %e, "metrics recorder not installed");
            None
        }
    };
    let textfile = cfg.pipeline.metrics_textfile.clone();
    let write_metrics = || {
        if let (Some(m), Some(path)) = (&metrics, &textfile) {
            if let Err(e) = m.write_textfile(path) {
                warn!(error = %format!("{e:#}"), "metrics textfile not written");
            }
        }
    };

    let limiter = Arc::new(RateLimiter::new());
    let startup_reporters = ReporterMux::from_env();
    let Prepared { pipeline, store } =
        match prepare(cfg, |k| std::env::var(k).ok(), limiter, &startup_reporters).await {
            Ok(prepared) => prepared,
            Err(outcome) => {
                write_metrics();
                return Ok(exit_code(&outcome));
            }
        };

    let outcome = pipeline.run().await;
    write_metrics();
    store.close().await;
    Ok(exit_code(&outcome))
}

async fn check(cfg: AppConfig) -> anyhow::Result<ExitCode> {
    let creds = Credentials::from_env(needs_gemini(&cfg))?;
    let store = open_store(&cfg).await?;
    let rows = store.len().await.map_err(PipelineError::Store)?;
    store.close().await;
    info!(rows, path = %cfg.pipeline.history_db_path.display(), "history store ok");

    let publisher = HatenaPublisher::new(&creds, &cfg.pipeline.category)?;
    publisher
        .check_connection()
        .await
        .map_err(|e| PipelineError::Config(format!("{e:#}")))
        .context("publish endpoint check")?;
    info!(publisher = publisher.name(), "publish endpoint ok");
    Ok(ExitCode::SUCCESS)
}
