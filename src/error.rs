// src/error.rs
//! Failure taxonomy for a pipeline run.
//!
//! Collaborators (collectors, providers, publisher, notifiers) return `anyhow::Error`
//! with context; the orchestrator folds them into one of these variants so the
//! caller can decide between "report and exit non-zero" and "report and exit clean".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing credentials, bad thresholds, unreachable publish endpoint at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The history store could not be read or written. Dedup correctness depends on it.
    #[error("history store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Both the primary and the secondary generation provider gave up.
    #[error("generation failed. primary ({primary_name}): {primary}; secondary ({secondary_name}): {secondary}")]
    Generation {
        primary_name: String,
        primary: String,
        secondary_name: String,
        secondary: String,
    },

    /// A single source failed to deliver items. Logged and skipped, never aborts a run.
    #[error("collection from '{source_name}' failed: {message}")]
    Collection {
        source_name: String,
        message: String,
    },

    /// Publish endpoint answered with a non-success status or the request failed.
    #[error("publish failed: {0}")]
    Publish(String),
}

impl PipelineError {
    /// Short, stable label used for report reasons and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Store(_) => "store",
            PipelineError::Generation { .. } => "generation",
            PipelineError::Collection { .. } => "collection",
            PipelineError::Publish(_) => "publish",
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
