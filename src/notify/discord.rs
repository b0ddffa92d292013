use super::{ReportCategory, ReportEvent, Reporter};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Embed colors: red for aborted runs, amber for skips.
const COLOR_ERROR: u32 = 0xE0_3E_3E;
const COLOR_SKIP: u32 = 0xF0_A0_20;

#[derive(Clone)]
pub struct DiscordReporter {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordReporter {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn send(&self, payload: &DiscordWebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait]
impl Reporter for DiscordReporter {
    fn name(&self) -> &str {
        "discord"
    }

    async fn report(&self, event: &ReportEvent) -> Result<()> {
        let (title, color) = match event.category {
            ReportCategory::Error => (format!("Publish run failed: {}", event.reason), COLOR_ERROR),
            ReportCategory::Skip => (format!("Publish run skipped: {}", event.reason), COLOR_SKIP),
        };
        let detail = if event.detail.is_empty() {
            "-".to_string()
        } else {
            event.detail.chars().take(1800).collect()
        };
        let description = format!(
            "**Detail:** {}\n**Time (UTC):** {}",
            detail,
            event.timestamp.to_rfc3339()
        );
        self.send(&DiscordWebhookPayload::embed(&title, &description, color))
            .await
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn embed(title: &str, description: &str, color: u32) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: title.to_string(),
                description: description.to_string(),
                color,
            }],
        }
    }
}
