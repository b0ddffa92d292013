// src/config/mod.rs
//! Typed configuration for the publisher.
//!
//! Everything the pipeline reads lives in [`AppConfig`]; every field has a default so an
//! empty (or missing) file yields a runnable setup. Secrets never live here, see
//! [`credentials`].
//!
//! Lookup order for the file:
//! 1) explicit path (CLI `--config`)
//! 2) `$NEWS_PUBLISHER_CONFIG`
//! 3) `config/publisher.toml`
//! 4) built-in defaults

pub mod credentials;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineError;

pub use credentials::Credentials;

pub const ENV_CONFIG_PATH: &str = "NEWS_PUBLISHER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/publisher.toml";

/// Provider names the generation stage knows how to build.
pub const KNOWN_PROVIDERS: &[&str] = &["gemini", "ollama"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub filter: FilterConfig,
    pub control: ControlConfig,
    pub scoring: ScoringConfig,
    pub keywords: KeywordConfig,
    pub sources: SourcesConfig,
    /// Per-resource sliding-window budgets, keyed by resource name ("gemini", "hatena", ...).
    pub rate_limits: BTreeMap<String, RateLimitConfig>,
    /// Per-provider retry budgets, keyed by provider name.
    pub retry: BTreeMap<String, RetryConfig>,
    pub generation: GenerationConfig,
    /// Extra or overriding prompt templates, keyed by template name.
    pub templates: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub min_items_required: usize,
    pub max_items_per_post: usize,
    pub history_retention_days: u32,
    pub history_db_path: PathBuf,
    /// `{date}` is replaced with today's JST date (`YYYY/MM/DD`).
    pub post_title_format: String,
    pub category: String,
    /// When set, Prometheus exposition text is written here at the end of a run.
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_items_required: 2,
            max_items_per_post: 5,
            history_retention_days: 30,
            history_db_path: PathBuf::from("data/history.db"),
            post_title_format: "今日のAIニュース（{date}）".to_string(),
            category: "AI".to_string(),
            metrics_textfile: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub recency_days: u32,
    pub min_title_chars: usize,
    pub min_summary_chars: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            recency_days: 7,
            min_title_chars: 10,
            min_summary_chars: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Exit quietly without collecting or reporting.
    pub maintenance_mode: bool,
    /// Skip this run and emit a skip report.
    pub skip_next_publish: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub default_weight: f64,
    /// Exact source label → base score.
    pub source_weights: BTreeMap<String, f64>,
    pub high_keywords: Vec<String>,
    pub medium_keywords: Vec<String>,
    /// Sources whose label starts with this prefix are social posts.
    pub social_prefix: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let source_weights = [
            ("ITmedia AI+", 7.0),
            ("はてなブックマーク テクノロジー", 6.0),
            ("Zenn AI", 5.0),
            ("Twitter - ChatGPT研究所", 8.0),
            ("Twitter - ぬこぬこ", 7.0),
            ("Twitter - usutaku", 7.0),
            ("Twitter - みのるん", 7.5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            default_weight: 5.0,
            source_weights,
            high_keywords: strings(&[
                "openai", "chatgpt", "gpt-4", "claude", "gemini", "新機能", "発表", "リリース",
                "発売", "beta",
            ]),
            medium_keywords: strings(&[
                "ai", "人工知能", "機械学習", "llm", "aiエージェント", "改善", "更新",
                "アップデート",
            ]),
            social_prefix: "Twitter - ".to_string(),
        }
    }
}

/// Collector-side keyword gate. Empty `include` keeps everything not excluded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub rss: Vec<FeedSource>,
    pub social: Vec<SocialAccount>,
    pub nitter_instances: Vec<String>,
    /// Social posts older than this are ignored at collection time.
    pub hours_back: u32,
    /// Entries taken from the head of each feed.
    pub max_entries: usize,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Keywords a social post must mention to be collected at all.
    pub ai_keywords: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            rss: vec![
                FeedSource::new("ITmedia AI+", "https://rss.itmedia.co.jp/rss/2.0/aiplus.xml"),
                FeedSource::new("Zenn AI", "https://zenn.dev/topics/ai/feed"),
                FeedSource::new(
                    "はてなブックマーク テクノロジー",
                    "https://b.hatena.ne.jp/hotentry/it.rss",
                ),
            ],
            social: Vec::new(),
            nitter_instances: strings(&[
                "https://nitter.net",
                "https://nitter.it",
                "https://nitter.unixfox.eu",
            ]),
            hours_back: 20,
            max_entries: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
                .to_string(),
            request_timeout_secs: 10,
            ai_keywords: strings(&[
                "ai", "chatgpt", "claude", "gemini", "openai", "anthropic", "機械学習",
                "人工知能", "llm", "gpt", "エージェント",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl FeedSource {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialAccount {
    pub account: String,
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_calls: usize,
    pub window_minutes: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 15,
            window_minutes: 1,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes * 60)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub primary: String,
    pub secondary: String,
    pub primary_template: String,
    pub secondary_template: String,
    pub gemini_model: String,
    pub ollama_model: String,
    pub ollama_url: String,
    pub target_length: usize,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            primary: "gemini".to_string(),
            secondary: "ollama".to_string(),
            primary_template: "detailed".to_string(),
            secondary_template: "compact".to_string(),
            gemini_model: "gemini-1.5-flash".to_string(),
            ollama_model: "llama3.1".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            target_length: 800,
            timeout_secs: 120,
        }
    }
}

fn default_true() -> bool {
    true
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl AppConfig {
    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(content)?;
        Ok(cfg)
    }

    /// Resolve the config path (explicit → env → default file) and load it.
    /// Falls back to built-in defaults only when no path was requested and the
    /// default file does not exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load_from(p);
        }
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        tracing::info!("no config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Budget for a rate-limited resource; unknown names get the default budget.
    pub fn rate_limit_for(&self, resource: &str) -> RateLimitConfig {
        self.rate_limits.get(resource).copied().unwrap_or_default()
    }

    /// Retry budget for a provider; unknown names get the default budget.
    pub fn retry_for(&self, provider: &str) -> RetryConfig {
        self.retry.get(provider).copied().unwrap_or_default()
    }

    /// Check every threshold once at startup. All problems are reported together.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut problems = Vec::new();

        let p = &self.pipeline;
        if p.min_items_required == 0 {
            problems.push("pipeline.min_items_required must be >= 1".to_string());
        }
        if p.max_items_per_post < p.min_items_required {
            problems.push(format!(
                "pipeline.max_items_per_post ({}) is below min_items_required ({})",
                p.max_items_per_post, p.min_items_required
            ));
        }
        if p.history_retention_days == 0 {
            problems.push("pipeline.history_retention_days must be >= 1".to_string());
        }
        if self.filter.recency_days == 0 {
            problems.push("filter.recency_days must be >= 1".to_string());
        }

        for (name, rl) in &self.rate_limits {
            if rl.max_calls == 0 || rl.window_minutes == 0 {
                problems.push(format!(
                    "rate_limits.{name}: max_calls and window_minutes must be positive"
                ));
            }
        }

        let g = &self.generation;
        for (role, name) in [("primary", &g.primary), ("secondary", &g.secondary)] {
            if !KNOWN_PROVIDERS.contains(&name.as_str()) {
                problems.push(format!("generation.{role}: unknown provider '{name}'"));
            }
        }
        if g.primary == g.secondary {
            problems.push("generation.primary and generation.secondary must differ".to_string());
        }
        let templates = crate::generate::template::PromptTemplates::from_config(self);
        for name in [&g.primary_template, &g.secondary_template] {
            if !templates.contains(name) {
                problems.push(format!("unknown prompt template '{name}'"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Config(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = AppConfig::parse("").unwrap();
        assert_eq!(cfg.pipeline.min_items_required, 2);
        assert_eq!(cfg.pipeline.max_items_per_post, 5);
        assert_eq!(cfg.filter.recency_days, 7);
        assert_eq!(cfg.pipeline.history_retention_days, 30);
        assert_eq!(cfg.scoring.default_weight, 5.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let toml = r#"
            [pipeline]
            min_items_required = 3

            [rate_limits.gemini]
            max_calls = 5
        "#;
        let cfg = AppConfig::parse(toml).unwrap();
        assert_eq!(cfg.pipeline.min_items_required, 3);
        assert_eq!(cfg.pipeline.max_items_per_post, 5);
        let rl = cfg.rate_limit_for("gemini");
        assert_eq!(rl.max_calls, 5);
        assert_eq!(rl.window_minutes, 1);
        assert_eq!(cfg.rate_limit_for("unknown"), RateLimitConfig::default());
    }

    #[test]
    fn validate_reports_all_problems() {
        let toml = r#"
            [pipeline]
            min_items_required = 0

            [generation]
            primary = "gpt"
            secondary = "gpt"
        "#;
        let cfg = AppConfig::parse(toml).unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("min_items_required"), "{err}");
        assert!(err.contains("unknown provider 'gpt'"), "{err}");
        assert!(err.contains("must differ"), "{err}");
    }

    #[test]
    fn unknown_template_is_rejected() {
        let toml = r#"
            [generation]
            primary_template = "fancy"
        "#;
        let cfg = AppConfig::parse(toml).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[serial_test::serial]
    #[test]
    fn env_path_takes_precedence_over_default() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "[pipeline]\nmax_items_per_post = 7\n").unwrap();

        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = AppConfig::load(None).unwrap();
        assert_eq!(cfg.pipeline.max_items_per_post, 7);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(AppConfig::load(None).is_err());
        env::remove_var(ENV_CONFIG_PATH);
    }
}
