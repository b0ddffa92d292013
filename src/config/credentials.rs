// src/config/credentials.rs
//! Secrets resolved from the environment (a `.env` file is loaded by the binary).

use crate::error::PipelineError;

pub const ENV_HATENA_API_KEY: &str = "HATENA_API_KEY";
pub const ENV_HATENA_USER_ID: &str = "HATENA_USER_ID";
pub const ENV_HATENA_BLOG_ID: &str = "HATENA_BLOG_ID";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";
pub const ENV_DISCORD_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";

fn non_blank<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub hatena_api_key: String,
    pub hatena_user_id: String,
    pub hatena_blog_id: String,
    /// Empty when Gemini is not one of the configured providers.
    pub gemini_api_key: String,
    pub github_token: Option<String>,
    pub github_repository: Option<String>,
    pub discord_webhook_url: Option<String>,
}

impl std::fmt::Debug for Credentials {
    // Safe diagnostics: only lengths and presence.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("hatena_user_id", &self.hatena_user_id)
            .field("hatena_blog_id", &self.hatena_blog_id)
            .field("hatena_key_len", &self.hatena_api_key.len())
            .field("gemini_key_len", &self.gemini_api_key.len())
            .field("github", &self.github_token.is_some())
            .field("discord", &self.discord_webhook_url.is_some())
            .finish()
    }
}

impl Credentials {
    pub fn from_env(needs_gemini: bool) -> Result<Self, PipelineError> {
        Self::from_lookup(needs_gemini, |k| std::env::var(k).ok())
    }

    /// Resolve through an arbitrary lookup. Reports every missing variable at once.
    pub fn from_lookup<F>(needs_gemini: bool, lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| non_blank(&lookup, k);

        let mut required = vec![ENV_HATENA_API_KEY, ENV_HATENA_USER_ID, ENV_HATENA_BLOG_ID];
        if needs_gemini {
            required.push(ENV_GEMINI_API_KEY);
        }
        let missing: Vec<&str> = required.into_iter().filter(|k| get(k).is_none()).collect();
        if !missing.is_empty() {
            return Err(PipelineError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            hatena_api_key: get(ENV_HATENA_API_KEY).unwrap_or_default(),
            hatena_user_id: get(ENV_HATENA_USER_ID).unwrap_or_default(),
            hatena_blog_id: get(ENV_HATENA_BLOG_ID).unwrap_or_default(),
            gemini_api_key: get(ENV_GEMINI_API_KEY).unwrap_or_default(),
            github_token: get(ENV_GITHUB_TOKEN),
            github_repository: get(ENV_GITHUB_REPOSITORY),
            discord_webhook_url: get(ENV_DISCORD_WEBHOOK_URL),
        })
    }

    /// Only the optional report channels. Never fails; publish secrets stay empty.
    pub fn reporting_only<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            github_token: non_blank(&lookup, ENV_GITHUB_TOKEN),
            github_repository: non_blank(&lookup, ENV_GITHUB_REPOSITORY),
            discord_webhook_url: non_blank(&lookup, ENV_DISCORD_WEBHOOK_URL),
            ..Self::default()
        }
    }
}
