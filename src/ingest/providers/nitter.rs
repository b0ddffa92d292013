//! Social posts through nitter RSS mirrors.
//!
//! For each enabled account the configured instances are tried in order; the first one
//! that yields at least one usable post wins. Posts are kept only when they are recent
//! (`hours_back`) and mention an AI keyword, and they arrive with a small pre-score the
//! popularity scorer later folds in.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use std::time::Duration;

use crate::config::{SocialAccount, SourcesConfig};
use crate::ingest::providers::feed::parse_feed;
use crate::ingest::types::{Collector, Item};
use crate::ingest::{normalize_text, truncate_chars, KeywordGate};

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_SUMMARY_CHARS: usize = 200;

const POST_BASE_SCORE: f64 = 5.0;
const POST_MAX_SCORE: f64 = 10.0;
const POST_HIGH_KEYWORDS: &[&str] = &["発表", "リリース", "新機能", "発売", "ベータ", "更新"];
const POST_MEDIUM_KEYWORDS: &[&str] = &["改善", "アップデート", "機能", "追加"];

/// `min(5 + 2·high + 1·medium, 10)` over `lower(title + " " + summary)`.
pub fn post_score(title: &str, summary: &str) -> f64 {
    let text = format!("{title} {summary}").to_lowercase();
    let high = POST_HIGH_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
    let medium = POST_MEDIUM_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
    (POST_BASE_SCORE + 2.0 * high as f64 + medium as f64).min(POST_MAX_SCORE)
}

pub struct NitterCollector {
    accounts: Vec<SocialAccount>,
    instances: Vec<String>,
    social_prefix: String,
    hours_back: u32,
    max_entries: usize,
    ai_keywords: Vec<String>,
    gate: KeywordGate,
    client: reqwest::Client,
}

impl NitterCollector {
    pub fn new(sources: &SourcesConfig, social_prefix: &str, gate: KeywordGate) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(sources.user_agent.clone())
            .timeout(Duration::from_secs(sources.request_timeout_secs))
            .build()
            .context("building nitter http client")?;
        Ok(Self {
            accounts: sources.social.iter().filter(|a| a.enabled).cloned().collect(),
            instances: sources.nitter_instances.clone(),
            social_prefix: social_prefix.to_string(),
            hours_back: sources.hours_back,
            max_entries: sources.max_entries,
            ai_keywords: sources.ai_keywords.iter().map(|k| k.to_lowercase()).collect(),
            gate,
            client,
        })
    }

    fn mentions_ai(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.ai_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Posts of one account from one feed document.
    pub fn posts_from_feed(
        &self,
        xml: &str,
        account: &SocialAccount,
        now: DateTime<Utc>,
    ) -> Result<Vec<Item>> {
        let display = account.display_name.as_deref().unwrap_or(&account.account);
        let source = format!("{}{}", self.social_prefix, display);
        let cutoff = now - ChronoDuration::hours(i64::from(self.hours_back));

        let mut out = Vec::new();
        for e in parse_feed(xml, self.max_entries)? {
            let published = e.timestamp().unwrap_or(now);
            if published < cutoff {
                continue;
            }
            let title = normalize_text(&e.title);
            let summary = normalize_text(&e.summary);
            let url = e.link.trim().to_string();
            if title.is_empty() || url.is_empty() {
                continue;
            }
            if !self.mentions_ai(&format!("{title} {summary}")) {
                continue;
            }
            let score = post_score(&title, &summary);
            out.push(
                Item::new(
                    truncate_chars(&title, MAX_TITLE_CHARS),
                    url,
                    truncate_chars(&summary, MAX_SUMMARY_CHARS),
                    source.clone(),
                )
                .with_published_at(published)
                .with_score(score),
            );
        }
        Ok(out)
    }

    async fn fetch_account(&self, account: &SocialAccount) -> AccountFetch {
        let mut answered = false;
        for base in &self.instances {
            let url = format!("{}/{}/rss", base.trim_end_matches('/'), account.account);
            let res = async {
                let rsp = self.client.get(&url).send().await.context("nitter GET")?;
                let body = rsp
                    .error_for_status()
                    .context("nitter status")?
                    .text()
                    .await
                    .context("nitter body")?;
                self.posts_from_feed(&body, account, Utc::now())
            }
            .await;

            match res {
                Ok(items) if !items.is_empty() => {
                    tracing::debug!(instance = %base, account = %account.account, count = items.len(), "posts fetched");
                    return AccountFetch::Posts(items);
                }
                Ok(_) => {
                    answered = true;
                    tracing::debug!(instance = %base, account = %account.account, "no usable posts");
                }
                Err(e) => {
                    tracing::warn!(error = ?e, instance = %base, account = %account.account, "nitter instance failed");
                }
            }
        }
        if answered || self.instances.is_empty() {
            AccountFetch::NoPosts
        } else {
            AccountFetch::AllFailed
        }
    }
}

/// Result of walking the instance list for one account.
#[derive(Debug)]
enum AccountFetch {
    Posts(Vec<Item>),
    /// At least one instance answered, nothing passed the gates.
    NoPosts,
    /// Every instance errored.
    AllFailed,
}

#[async_trait]
impl Collector for NitterCollector {
    async fn collect(&self) -> Result<Vec<Item>> {
        let mut all = Vec::new();
        for account in &self.accounts {
            match self.fetch_account(account).await {
                AccountFetch::Posts(items) => all.extend(items),
                AccountFetch::NoPosts => {}
                AccountFetch::AllFailed => {
                    tracing::warn!(account = %account.account, "all nitter instances failed");
                    counter!("ingest_source_errors_total").increment(1);
                }
            }
        }
        Ok(self.gate.apply(all))
    }

    fn name(&self) -> &str {
        "nitter"
    }
}
