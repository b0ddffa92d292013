//! Durable record of already-published articles, keyed by url fingerprint.
//!
//! One SQLite table, one row per fingerprint. Rows are inserted after a confirmed
//! publish, never updated, and removed only by [`HistoryStore::prune`].

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Content address of an item: lowercase hex SHA-256 of the url bytes.
pub fn fingerprint(url: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(url.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub fingerprint: String,
    pub url: String,
    pub title: String,
    pub first_seen: NaiveDate,
    pub inserted_at: DateTime<Utc>,
}

/// What the filter and the orchestrator need from the history. Errors are never
/// swallowed here; callers decide what is fatal.
#[async_trait]
pub trait PublishHistory: Send + Sync {
    async fn is_duplicate(&self, url: &str) -> Result<bool, sqlx::Error>;
    /// `true` if newly inserted, `false` if the fingerprint was already present.
    async fn record(
        &self,
        url: &str,
        title: &str,
        published: Option<NaiveDate>,
    ) -> Result<bool, sqlx::Error>;
    /// Delete rows inserted more than `older_than_days` ago; returns the number removed.
    async fn prune(&self, older_than_days: u32) -> Result<u64, sqlx::Error>;
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path.display(), "history store opened");
        Ok(store)
    }

    /// Private in-memory database; lives as long as the single pooled connection.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                first_seen_date TEXT NOT NULL,
                inserted_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_article_history_fingerprint ON article_history(fingerprint)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_article_history_inserted_at ON article_history(inserted_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert with an explicit clock. The UNIQUE constraint makes this idempotent.
    pub async fn record_at(
        &self,
        url: &str,
        title: &str,
        published: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let first_seen = published.unwrap_or_else(|| now.date_naive());
        let res = sqlx::query(
            r#"
            INSERT INTO article_history (fingerprint, url, title, first_seen_date, inserted_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(fingerprint) DO NOTHING
            "#,
        )
        .bind(fingerprint(url))
        .bind(url)
        .bind(title)
        .bind(first_seen.format("%Y-%m-%d").to_string())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;
        let inserted = res.rows_affected() == 1;
        debug!(url, inserted, "history record");
        Ok(inserted)
    }

    pub async fn prune_at(&self, older_than_days: u32, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let cutoff = now - ChronoDuration::days(i64::from(older_than_days));
        let res = sqlx::query("DELETE FROM article_history WHERE inserted_at < ?1")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await?;
        let removed = res.rows_affected();
        metrics::counter!("history_pruned_total").increment(removed);
        Ok(removed)
    }

    /// Records inserted within the last `days`, newest first.
    pub async fn recent(&self, days: u32) -> Result<Vec<HistoryRecord>, sqlx::Error> {
        self.recent_at(days, Utc::now()).await
    }

    pub async fn recent_at(&self, days: u32, now: DateTime<Utc>) -> Result<Vec<HistoryRecord>, sqlx::Error> {
        let cutoff = now - ChronoDuration::days(i64::from(days));
        let rows = sqlx::query(
            r#"
            SELECT fingerprint, url, title, first_seen_date, inserted_at
            FROM article_history
            WHERE inserted_at >= ?1
            ORDER BY inserted_at DESC, id DESC
            "#,
        )
        .bind(cutoff.timestamp())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let date_s: String = row.try_get("first_seen_date")?;
            let ts: i64 = row.try_get("inserted_at")?;
            let first_seen = NaiveDate::parse_from_str(&date_s, "%Y-%m-%d").map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: "first_seen_date".to_string(),
                    source: Box::new(e),
                }
            })?;
            out.push(HistoryRecord {
                fingerprint: row.try_get("fingerprint")?,
                url: row.try_get("url")?,
                title: row.try_get("title")?,
                first_seen,
                inserted_at: DateTime::from_timestamp(ts, 0).unwrap_or_default(),
            });
        }
        Ok(out)
    }

    pub async fn len(&self) -> Result<u64, sqlx::Error> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    pub async fn is_empty(&self) -> Result<bool, sqlx::Error> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl PublishHistory for HistoryStore {
    async fn is_duplicate(&self, url: &str) -> Result<bool, sqlx::Error> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM article_history WHERE fingerprint = ?1")
                .bind(fingerprint(url))
                .fetch_one(&self.pool)
                .await?;
        Ok(n > 0)
    }

    async fn record(
        &self,
        url: &str,
        title: &str,
        published: Option<NaiveDate>,
    ) -> Result<bool, sqlx::Error> {
        self.record_at(url, title, published, Utc::now()).await
    }

    async fn prune(&self, older_than_days: u32) -> Result<u64, sqlx::Error> {
        self.prune_at(older_than_days, Utc::now()).await
    }
}
