//! Opens a GitHub issue per report via the REST API.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::{ReportCategory, ReportEvent, Reporter};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("ai-news-publisher/", env!("CARGO_PKG_VERSION"));

pub struct GitHubIssueReporter {
    http: reqwest::Client,
    api_base: String,
    token: String,
    repository: String,
}

#[derive(Serialize)]
struct NewIssue<'a> {
    title: String,
    body: String,
    labels: &'a [&'a str],
}

impl GitHubIssueReporter {
    /// `repository` is `owner/name`.
    pub fn new(token: &str, repository: &str) -> Result<Self> {
        if !repository.contains('/') {
            return Err(anyhow!("GITHUB_REPOSITORY must be owner/name, got {repository:?}"));
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .context("building github http client")?;
        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.to_string(),
            repository: repository.to_string(),
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }
}

pub fn labels_for(category: ReportCategory) -> &'static [&'static str] {
    match category {
        ReportCategory::Error => &["automation", "error", "high-priority"],
        ReportCategory::Skip => &["automation", "skip", "info"],
    }
}

fn issue_body(event: &ReportEvent) -> String {
    let mut body = String::new();
    body.push_str(&format!("**Category:** {}\n", event.category));
    body.push_str(&format!("**Reason:** {}\n", event.reason));
    body.push_str(&format!("**Time (UTC):** {}\n", event.timestamp.to_rfc3339()));
    if !event.detail.is_empty() {
        body.push_str("\n```\n");
        body.push_str(&event.detail);
        body.push_str("\n```\n");
    }
    body
}

#[async_trait]
impl Reporter for GitHubIssueReporter {
    fn name(&self) -> &str {
        "github"
    }

    async fn report(&self, event: &ReportEvent) -> Result<()> {
        let prefix = match event.category {
            ReportCategory::Error => "[AI News] Publish failed",
            ReportCategory::Skip => "[AI News] Publish skipped",
        };
        let date = crate::publish::jst_date(event.timestamp);
        let issue = NewIssue {
            title: format!("{prefix}: {} ({date})", event.reason),
            body: issue_body(event),
            labels: labels_for(event.category),
        };
        let rsp = self
            .http
            .post(format!("{}/repos/{}/issues", self.api_base, self.repository))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(&issue)
            .send()
            .await
            .context("creating github issue")?;
        let status = rsp.status();
        if status.as_u16() == 201 {
            tracing::info!(repository = %self.repository, "report issue created");
            Ok(())
        } else {
            let detail = rsp.text().await.unwrap_or_default();
            Err(anyhow!("github issues API answered HTTP {status}: {}", detail.trim()))
        }
    }
}
