// src/publish/mod.rs
pub mod hatena;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};

pub use hatena::HatenaPublisher;

/// Result of one publish attempt that reached the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub success: bool,
    /// Public URL of the new entry, when the endpoint reported one.
    pub entry_url: Option<String>,
    pub status: u16,
    /// Response body on failure, trimmed.
    pub detail: Option<String>,
}

/// Destination of the generated post. Transport errors are `Err`; a reachable endpoint
/// that refuses the post is `Ok` with `success == false`.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;
    async fn publish(&self, title: &str, body: &str) -> Result<PublishOutcome>;
    /// Cheap authenticated request used by the `check` command.
    async fn check_connection(&self) -> Result<()>;
}

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Japan Standard Time, UTC+9, no DST.
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// `YYYY/MM/DD` of `now` in JST.
pub fn jst_date(now: DateTime<Utc>) -> String {
    now.with_timezone(&jst()).format("%Y/%m/%d").to_string()
}

/// Fill `{date}` in the configured post title format.
pub fn post_title(format: &str, now: DateTime<Utc>) -> String {
    format.replace("{date}", &jst_date(now))
}
