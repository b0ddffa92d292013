// src/generate/mod.rs
//! Post generation: provider abstraction plus primary → secondary fallback.
//!
//! Each provider runs behind its own [`CallGuard`], so a rate-limit wait or a retry
//! budget spent on the primary never eats into the secondary's budget.

pub mod gemini;
pub mod ollama;
pub mod template;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, Credentials};
use crate::error::PipelineError;
use crate::ingest::types::Item;
use crate::rate_limit::RateLimiter;
use crate::retry::CallGuard;

pub use gemini::GeminiGenerator;
pub use ollama::OllamaGenerator;
pub use template::PromptTemplates;

/// Everything a provider needs to write one post.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Ranked items, already cut to `max_items_per_post`.
    pub items: Vec<Item>,
    /// Post date, JST `YYYY/MM/DD`.
    pub date: String,
    pub target_length: usize,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, req: &GenerationRequest) -> Result<String>;
}

/// Text plus the provider that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub provider: String,
    pub text: String,
}

pub struct FallbackGenerator {
    primary: Box<dyn Generator>,
    primary_guard: CallGuard,
    secondary: Box<dyn Generator>,
    secondary_guard: CallGuard,
}

impl FallbackGenerator {
    pub fn new(
        primary: Box<dyn Generator>,
        primary_guard: CallGuard,
        secondary: Box<dyn Generator>,
        secondary_guard: CallGuard,
    ) -> Self {
        Self {
            primary,
            primary_guard,
            secondary,
            secondary_guard,
        }
    }

    /// Providers named in `[generation]`, guards from `[rate_limits.*]` / `[retry.*]`.
    pub fn from_config(
        cfg: &AppConfig,
        creds: &Credentials,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, PipelineError> {
        let templates = PromptTemplates::from_config(cfg);
        let g = &cfg.generation;
        let primary = build_provider(&g.primary, &g.primary_template, cfg, creds, &templates)?;
        let secondary =
            build_provider(&g.secondary, &g.secondary_template, cfg, creds, &templates)?;
        Ok(Self::new(
            primary,
            CallGuard::from_config(limiter.clone(), cfg, &g.primary),
            secondary,
            CallGuard::from_config(limiter, cfg, &g.secondary),
        ))
    }

    async fn attempt(
        generator: &dyn Generator,
        guard: &CallGuard,
        req: &GenerationRequest,
    ) -> Result<String> {
        guard
            .call(|| async move {
                let text = generator.generate(req).await?;
                if text.trim().is_empty() {
                    anyhow::bail!("{} returned empty text", generator.name());
                }
                Ok(text)
            })
            .await
    }

    /// Primary through its guard; on exhaustion, secondary once through its own guard.
    pub async fn generate(&self, req: &GenerationRequest) -> Result<Generated, PipelineError> {
        let primary_err =
            match Self::attempt(self.primary.as_ref(), &self.primary_guard, req).await {
                Ok(text) => {
                    info!(provider = self.primary.name(), chars = text.chars().count(), "post generated");
                    return Ok(Generated {
                        provider: self.primary.name().to_string(),
                        text,
                    });
                }
                Err(e) => e,
            };
        warn!(
            provider = self.primary.name(),
            error = %primary_err,
            fallback = self.secondary.name(),
            "primary generator failed, falling back"
        );

        match Self::attempt(self.secondary.as_ref(), &self.secondary_guard, req).await {
            Ok(text) => {
                info!(provider = self.secondary.name(), chars = text.chars().count(), "post generated by fallback");
                Ok(Generated {
                    provider: self.secondary.name().to_string(),
                    text,
                })
            }
            Err(secondary_err) => Err(PipelineError::Generation {
                primary_name: self.primary.name().to_string(),
                primary: format!("{primary_err:#}"),
                secondary_name: self.secondary.name().to_string(),
                secondary: format!("{secondary_err:#}"),
            }),
        }
    }
}

/// Build one named provider with its prompt template resolved.
pub fn build_provider(
    name: &str,
    template_name: &str,
    cfg: &AppConfig,
    creds: &Credentials,
    templates: &PromptTemplates,
) -> Result<Box<dyn Generator>, PipelineError> {
    let template = templates.require(template_name)?.to_string();
    let g = &cfg.generation;
    let timeout = std::time::Duration::from_secs(g.timeout_secs);
    let provider: Box<dyn Generator> = match name {
        "gemini" => {
            if creds.gemini_api_key.is_empty() {
                return Err(PipelineError::Config("GEMINI_API_KEY is not set".to_string()));
            }
            Box::new(
                GeminiGenerator::new(&creds.gemini_api_key, &g.gemini_model, template, timeout)
                    .map_err(|e| PipelineError::Config(format!("{e:#}")))?,
            )
        }
        "ollama" => Box::new(
            OllamaGenerator::new(&g.ollama_url, &g.ollama_model, template, timeout)
                .map_err(|e| PipelineError::Config(format!("{e:#}")))?,
        ),
        other => {
            return Err(PipelineError::Config(format!(
                "unknown generation provider '{other}'"
            )))
        }
    };
    Ok(provider)
}
