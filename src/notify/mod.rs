// src/notify/mod.rs
//! Run reports (errors and skips) fanned out to every configured channel.
//!
//! The orchestrator emits exactly one [`ReportEvent`] per aborted or skipped run and
//! hands it to a [`ReporterMux`]. A failing channel is logged and never turns a
//! report into a new failure.

pub mod discord;
pub mod github;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub use discord::DiscordReporter;
pub use github::GitHubIssueReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportCategory {
    Error,
    Skip,
}

impl ReportCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::Error => "error",
            ReportCategory::Skip => "skip",
        }
    }
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEvent {
    pub category: ReportCategory,
    /// Short, stable reason ("insufficient items", "generation", "manual skip", ...).
    pub reason: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl ReportEvent {
    pub fn error(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            category: ReportCategory::Error,
            reason: reason.into(),
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn skip(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            category: ReportCategory::Skip,
            reason: reason.into(),
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Reporter: Send + Sync {
    fn name(&self) -> &str;
    async fn report(&self, event: &ReportEvent) -> Result<()>;
}

/// Always-on channel: the event becomes one structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

#[async_trait]
impl Reporter for LogReporter {
    fn name(&self) -> &str {
        "log"
    }

    async fn report(&self, event: &ReportEvent) -> Result<()> {
        match event.category {
            ReportCategory::Error => tracing::error!(
                category = %event.category,
                reason = %event.reason,
                detail = %event.detail,
                "run aborted"
            ),
            ReportCategory::Skip => tracing::warn!(
                category = %event.category,
                reason = %event.reason,
                detail = %event.detail,
                "run skipped"
            ),
        }
        Ok(())
    }
}

/// Sends one event to every reporter; failures are logged and swallowed.
#[derive(Clone, Default)]
pub struct ReporterMux {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl ReporterMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log reporter plus whatever the credentials enable (GitHub issues, Discord).
    pub fn from_credentials(creds: &crate::config::Credentials) -> Result<Self> {
        let mut mux = Self::new().with(Arc::new(LogReporter));
        if let (Some(token), Some(repo)) = (&creds.github_token, &creds.github_repository) {
            mux = mux.with(Arc::new(GitHubIssueReporter::new(token, repo)?));
        }
        if let Some(url) = &creds.discord_webhook_url {
            mux = mux.with(Arc::new(DiscordReporter::new(url.clone())));
        }
        Ok(mux)
    }

    /// Channels for failures before the full credentials are loaded. Reads only the
    /// optional GitHub and Discord variables; a malformed GitHub target is skipped.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let creds = crate::config::Credentials::reporting_only(lookup);
        match Self::from_credentials(&creds) {
            Ok(mux) => mux,
            Err(e) => {
                tracing::warn!(error = %e, "github reporter disabled");
                let mut mux = Self::new().with(Arc::new(LogReporter));
                if let Some(url) = creds.discord_webhook_url {
                    mux = mux.with(Arc::new(DiscordReporter::new(url)));
                }
                mux
            }
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn with(mut self, r: Arc<dyn Reporter>) -> Self {
        self.reporters.push(r);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    /// Number of reporters that accepted the event.
    pub async fn report(&self, event: &ReportEvent) -> usize {
        let mut delivered = 0;
        for r in &self.reporters {
            match r.report(event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(reporter = r.name(), error = %e, "reporter failed");
                }
            }
        }
        delivered
    }
}
