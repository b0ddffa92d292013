// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod generate;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod publish;
pub mod rate_limit;
pub mod retry;
pub mod scoring;
pub mod source_weights;

// ---- Re-exports for stable public API ----
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::pipeline::{Pipeline, PipelineState, RunOutcome};
