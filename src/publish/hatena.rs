//! Hatena Blog AtomPub client.
//!
//! Entries are posted as Markdown (`text/x-markdown`) and published immediately
//! (`app:draft` = `no`). Authentication is HTTP Basic with the user id and API key.
//! The endpoint answers 201 on success with the created entry, whose
//! `link rel="alternate"` is the public URL.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use quick_xml::escape::escape;
use std::time::Duration;

use super::{PublishOutcome, Publisher};
use crate::config::Credentials;
use crate::ingest::providers::feed::parse_feed;

pub const DEFAULT_BASE_URL: &str = "https://blog.hatena.ne.jp";
const USER_AGENT: &str = concat!("ai-news-publisher/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct HatenaPublisher {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
    blog_id: String,
    api_key: String,
    category: String,
}

impl std::fmt::Debug for HatenaPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HatenaPublisher")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .field("blog_id", &self.blog_id)
            .field("category", &self.category)
            .finish()
    }
}

impl HatenaPublisher {
    pub fn new(creds: &Credentials, category: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .context("building hatena http client")?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: creds.hatena_user_id.clone(),
            blog_id: creds.hatena_blog_id.clone(),
            api_key: creds.hatena_api_key.clone(),
            category: category.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn service_url(&self) -> String {
        format!("{}/{}/{}/atom", self.base_url, self.user_id, self.blog_id)
    }

    fn entry_url(&self) -> String {
        format!("{}/entry", self.service_url())
    }
}

/// AtomPub entry document for one post.
pub fn entry_xml(title: &str, body: &str, category: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            "\n",
            r#"<entry xmlns="http://www.w3.org/2005/Atom" xmlns:app="http://www.w3.org/2007/app">"#,
            "\n  <title>{title}</title>",
            "\n  <content type=\"text/x-markdown\">{body}</content>",
            "\n  <category term=\"{category}\" />",
            "\n  <app:control><app:draft>no</app:draft></app:control>",
            "\n</entry>\n"
        ),
        title = escape(title),
        body = escape(body),
        category = escape(category),
    )
}

/// Public URL of the created entry, from its `link rel="alternate"`.
pub fn alternate_link(response: &str) -> Option<String> {
    parse_feed(response, 1)
        .ok()?
        .into_iter()
        .next()
        .map(|e| e.link)
        .filter(|l| !l.is_empty())
}

#[async_trait]
impl Publisher for HatenaPublisher {
    fn name(&self) -> &str {
        "hatena"
    }

    async fn publish(&self, title: &str, body: &str) -> Result<PublishOutcome> {
        let rsp = self
            .http
            .post(self.entry_url())
            .basic_auth(&self.user_id, Some(&self.api_key))
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(entry_xml(title, body, &self.category))
            .send()
            .await
            .context("posting hatena entry")?;

        let status = rsp.status().as_u16();
        let text = rsp.text().await.unwrap_or_default();
        if status == 201 {
            let entry_url = alternate_link(&text);
            tracing::info!(status, entry_url = entry_url.as_deref().unwrap_or("-"), "hatena entry created");
            Ok(PublishOutcome {
                success: true,
                entry_url,
                status,
                detail: None,
            })
        } else {
            tracing::warn!(status, "hatena refused the entry");
            Ok(PublishOutcome {
                success: false,
                entry_url: None,
                status,
                detail: Some(text.trim().chars().take(500).collect()),
            })
        }
    }

    async fn check_connection(&self) -> Result<()> {
        let rsp = self
            .http
            .get(self.service_url())
            .basic_auth(&self.user_id, Some(&self.api_key))
            .send()
            .await
            .context("reaching hatena service document")?;
        let status = rsp.status();
        if status.as_u16() == 200 {
            Ok(())
        } else {
            Err(anyhow!("hatena service document answered HTTP {status}"))
        }
    }
}
