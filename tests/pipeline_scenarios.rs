// tests/pipeline_scenarios.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ai_news_publisher::config::{AppConfig, RateLimitConfig};
use ai_news_publisher::generate::{FallbackGenerator, GenerationRequest, Generator};
use ai_news_publisher::history::{HistoryStore, PublishHistory};
use ai_news_publisher::ingest::types::{Collector, Item};
use ai_news_publisher::notify::{ReportCategory, ReportEvent, Reporter, ReporterMux};
use ai_news_publisher::pipeline::{Pipeline, PipelineState, RunOutcome, INSUFFICIENT_ITEMS};
use ai_news_publisher::publish::{PublishOutcome, Publisher};
use ai_news_publisher::rate_limit::RateLimiter;
use ai_news_publisher::retry::{CallGuard, RetryPolicy};
use ai_news_publisher::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

// ---------- test doubles ----------

struct FixedCollector {
    items: Vec<Item>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Collector for FixedCollector {
    async fn collect(&self) -> anyhow::Result<Vec<Item>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.clone())
    }
    fn name(&self) -> &str {
        "fixed"
    }
}

struct BrokenCollector;

#[async_trait]
impl Collector for BrokenCollector {
    async fn collect(&self) -> anyhow::Result<Vec<Item>> {
        anyhow::bail!("feed unreachable")
    }
    fn name(&self) -> &str {
        "broken"
    }
}

/// Fails the first `fail_times` calls, then answers `reply`.
struct ScriptedGenerator {
    name: &'static str,
    fail_times: usize,
    reply: &'static str,
    calls: Arc<AtomicUsize>,
    seen_items: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedGenerator {
    fn new(name: &'static str, fail_times: usize, reply: &'static str) -> Self {
        Self {
            name,
            fail_times,
            reply,
            calls: Arc::new(AtomicUsize::new(0)),
            seen_items: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        self.name
    }
    async fn generate(&self, req: &GenerationRequest) -> anyhow::Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_items.lock().unwrap().push(req.items.len());
        if n < self.fail_times {
            anyhow::bail!("{} unavailable (call {})", self.name, n + 1);
        }
        Ok(self.reply.to_string())
    }
}

enum PublishMode {
    Created,
    Refused(u16),
    Transport,
    /// Endpoint check fails before anything runs.
    Unreachable,
}

struct MockPublisher {
    mode: PublishMode,
    posts: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        "mock"
    }
    async fn publish(&self, title: &str, body: &str) -> anyhow::Result<PublishOutcome> {
        self.posts.lock().unwrap().push((title.to_string(), body.to_string()));
        match self.mode {
            PublishMode::Created => Ok(PublishOutcome {
                success: true,
                entry_url: Some("https://blog.test/entry/1".into()),
                status: 201,
                detail: None,
            }),
            PublishMode::Refused(status) => Ok(PublishOutcome {
                success: false,
                entry_url: None,
                status,
                detail: Some("Internal Server Error".into()),
            }),
            PublishMode::Transport | PublishMode::Unreachable => anyhow::bail!("connection reset"),
        }
    }
    async fn check_connection(&self) -> anyhow::Result<()> {
        match self.mode {
            PublishMode::Unreachable => anyhow::bail!("HTTP 401 from atom endpoint"),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
struct RecordingReporter(Mutex<Vec<ReportEvent>>);

#[async_trait]
impl Reporter for RecordingReporter {
    fn name(&self) -> &str {
        "recording"
    }
    async fn report(&self, event: &ReportEvent) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Real store underneath; each operation can be made to fail.
struct FlakyHistory {
    inner: HistoryStore,
    fail_is_duplicate: bool,
    fail_record: bool,
    fail_prune: bool,
}

#[async_trait]
impl PublishHistory for FlakyHistory {
    async fn is_duplicate(&self, url: &str) -> Result<bool, sqlx::Error> {
        if self.fail_is_duplicate {
            return Err(sqlx::Error::PoolClosed);
        }
        self.inner.is_duplicate(url).await
    }
    async fn record(
        &self,
        url: &str,
        title: &str,
        published: Option<NaiveDate>,
    ) -> Result<bool, sqlx::Error> {
        if self.fail_record {
            return Err(sqlx::Error::PoolClosed);
        }
        self.inner.record(url, title, published).await
    }
    async fn prune(&self, older_than_days: u32) -> Result<u64, sqlx::Error> {
        if self.fail_prune {
            return Err(sqlx::Error::PoolClosed);
        }
        self.inner.prune(older_than_days).await
    }
}

// ---------- harness ----------

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap()
}

fn item(title: &str, url: &str, source: &str) -> Item {
    Item::new(
        title,
        url,
        "生成AIの最新動向について詳しく解説した記事の要約です。",
        source,
    )
}

fn guard(limiter: &Arc<RateLimiter>, resource: &str, retries: u32) -> CallGuard {
    CallGuard::new(
        limiter.clone(),
        resource,
        RateLimitConfig::default(),
        RetryPolicy::new(retries, Duration::from_millis(1)),
    )
}

struct Harness {
    collector_calls: Arc<AtomicUsize>,
    primary_calls: Arc<AtomicUsize>,
    primary_seen: Arc<Mutex<Vec<usize>>>,
    secondary_calls: Arc<AtomicUsize>,
    posts: Arc<Mutex<Vec<(String, String)>>>,
    reports: Arc<RecordingReporter>,
    pipeline: Pipeline,
}

struct Setup {
    cfg: AppConfig,
    items: Vec<Item>,
    primary: ScriptedGenerator,
    secondary: ScriptedGenerator,
    publish: PublishMode,
    history: Arc<dyn PublishHistory>,
}

impl Setup {
    fn new(items: Vec<Item>, history: Arc<dyn PublishHistory>) -> Self {
        Self {
            cfg: AppConfig::default(),
            items,
            primary: ScriptedGenerator::new("primary", 0, "# 今日のAIニュース\n本文"),
            secondary: ScriptedGenerator::new("secondary", 0, "# 代替本文"),
            publish: PublishMode::Created,
            history,
        }
    }

    fn build(self) -> Harness {
        let limiter = Arc::new(RateLimiter::new());
        let collector_calls = Arc::new(AtomicUsize::new(0));
        let posts = Arc::new(Mutex::new(Vec::new()));
        let reports = Arc::new(RecordingReporter::default());

        let primary_calls = self.primary.calls.clone();
        let primary_seen = self.primary.seen_items.clone();
        let secondary_calls = self.secondary.calls.clone();
        let generator = FallbackGenerator::new(
            Box::new(self.primary),
            guard(&limiter, "primary", 1),
            Box::new(self.secondary),
            guard(&limiter, "secondary", 1),
        );

        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(FixedCollector {
                items: self.items,
                calls: collector_calls.clone(),
            }),
            Box::new(BrokenCollector),
        ];
        let publisher = MockPublisher {
            mode: self.publish,
            posts: posts.clone(),
        };
        let pipeline = Pipeline::new(
            self.cfg,
            collectors,
            self.history,
            generator,
            Box::new(publisher),
            limiter,
            ReporterMux::new().with(reports.clone()),
        );
        Harness {
            collector_calls,
            primary_calls,
            primary_seen,
            secondary_calls,
            posts,
            reports,
            pipeline,
        }
    }
}

impl Harness {
    fn reports(&self) -> Vec<ReportEvent> {
        self.reports.0.lock().unwrap().clone()
    }
    fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

async fn store() -> HistoryStore {
    HistoryStore::in_memory().await.unwrap()
}

// ---------- scenarios ----------

#[tokio::test]
async fn single_item_is_aborted_as_insufficient_without_publish_or_record() {
    let store = store().await;
    let items = vec![item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+")];
    let h = Setup::new(items, Arc::new(store.clone())).build();

    let out = h.pipeline.run_at(now()).await;
    match &out {
        RunOutcome::Aborted { at, reason, error } => {
            assert_eq!(*at, PipelineState::Filtering);
            assert_eq!(reason, INSUFFICIENT_ITEMS);
            assert!(error.is_none());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!out.is_failure());
    assert_eq!(h.primary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.post_count(), 0);
    assert_eq!(store.len().await.unwrap(), 0);

    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].category, ReportCategory::Skip);
    assert_eq!(reports[0].reason, INSUFFICIENT_ITEMS);
}

#[tokio::test]
async fn duplicate_url_is_dropped_and_recorded_once() {
    let store = store().await;
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("同じ記事が別ソースから届きました", "https://x.com/a", "Zenn AI"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let h = Setup::new(items, Arc::new(store.clone())).build();

    let out = h.pipeline.run_at(now()).await;
    match out {
        RunOutcome::Done {
            published,
            entry_url,
            provider,
        } => {
            assert_eq!(published, 2);
            assert_eq!(entry_url.as_deref(), Some("https://blog.test/entry/1"));
            assert_eq!(provider, "primary");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(store.len().await.unwrap(), 2);
    assert!(store.is_duplicate("https://x.com/a").await.unwrap());
    assert!(h.reports().is_empty());

    let posts = h.posts.lock().unwrap().clone();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, "今日のAIニュース（2025/09/30）");
    assert!(posts[0].1.starts_with("# 今日のAIニュース"));
}

#[tokio::test]
async fn second_run_sees_everything_as_published() {
    let store = store().await;
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let h = Setup::new(items, Arc::new(store.clone())).build();

    assert!(matches!(h.pipeline.run_at(now()).await, RunOutcome::Done { .. }));
    let again = h.pipeline.run_at(now()).await;
    assert!(matches!(again, RunOutcome::Aborted { error: None, .. }));

    assert_eq!(h.collector_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.post_count(), 1);
    assert_eq!(store.len().await.unwrap(), 2);
}

#[tokio::test]
async fn only_top_ranked_items_are_generated_and_recorded() {
    let store = store().await;
    let items = vec![
        item("地味なニュースの見出しです", "https://x.com/low", "Unknown Blog"),
        item("OpenAIがChatGPTの新機能を発表", "https://x.com/top", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/mid", "Zenn AI"),
    ];
    let mut setup = Setup::new(items, Arc::new(store.clone()));
    setup.cfg.pipeline.max_items_per_post = 2;
    let h = setup.build();

    let out = h.pipeline.run_at(now()).await;
    assert!(matches!(out, RunOutcome::Done { published: 2, .. }), "{out:?}");
    assert_eq!(*h.primary_seen.lock().unwrap(), vec![2]);
    assert!(store.is_duplicate("https://x.com/top").await.unwrap());
    assert!(store.is_duplicate("https://x.com/mid").await.unwrap());
    assert!(!store.is_duplicate("https://x.com/low").await.unwrap());
}

#[tokio::test]
async fn failing_primary_falls_back_to_secondary() {
    let store = store().await;
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let mut setup = Setup::new(items, Arc::new(store.clone()));
    setup.primary = ScriptedGenerator::new("primary", usize::MAX, "");
    let h = setup.build();

    let out = h.pipeline.run_at(now()).await;
    match out {
        RunOutcome::Done { provider, .. } => assert_eq!(provider, "secondary"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    // one retry on the primary, then the secondary once
    assert_eq!(h.primary_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.secondary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.posts.lock().unwrap()[0].1, "# 代替本文");
}

#[tokio::test]
async fn empty_text_from_primary_counts_as_failure() {
    let store = store().await;
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let mut setup = Setup::new(items, Arc::new(store.clone()));
    setup.primary = ScriptedGenerator::new("primary", 0, "   ");
    let h = setup.build();

    let out = h.pipeline.run_at(now()).await;
    assert!(matches!(out, RunOutcome::Done { ref provider, .. } if provider == "secondary"));
}

#[tokio::test]
async fn both_generators_failing_aborts_with_one_error_report() {
    let store = store().await;
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let mut setup = Setup::new(items, Arc::new(store.clone()));
    setup.primary = ScriptedGenerator::new("primary", usize::MAX, "");
    setup.secondary = ScriptedGenerator::new("secondary", usize::MAX, "");
    let h = setup.build();

    let out = h.pipeline.run_at(now()).await;
    assert!(out.is_failure());
    match &out {
        RunOutcome::Aborted {
            at,
            error: Some(PipelineError::Generation { primary, secondary, .. }),
            ..
        } => {
            assert_eq!(*at, PipelineState::Generating);
            assert!(primary.contains("primary unavailable"));
            assert!(secondary.contains("secondary unavailable"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.secondary_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.post_count(), 0);
    assert_eq!(store.len().await.unwrap(), 0);

    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].category, ReportCategory::Error);
    assert_eq!(reports[0].reason, "generation");
}

#[tokio::test]
async fn refused_publish_is_not_retried_and_leaves_no_history() {
    let store = store().await;
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let mut setup = Setup::new(items, Arc::new(store.clone()));
    setup.publish = PublishMode::Refused(500);
    let h = setup.build();

    let out = h.pipeline.run_at(now()).await;
    match &out {
        RunOutcome::Aborted {
            at,
            error: Some(PipelineError::Publish(msg)),
            ..
        } => {
            assert_eq!(*at, PipelineState::Publishing);
            assert!(msg.contains("500"), "{msg}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.post_count(), 1);
    assert_eq!(store.len().await.unwrap(), 0);
    assert_eq!(h.reports().len(), 1);
}

#[tokio::test]
async fn publish_transport_error_aborts() {
    let store = store().await;
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let mut setup = Setup::new(items, Arc::new(store.clone()));
    setup.publish = PublishMode::Transport;
    let h = setup.build();

    let out = h.pipeline.run_at(now()).await;
    assert!(matches!(out, RunOutcome::Aborted { error: Some(PipelineError::Publish(_)), .. }));
    assert_eq!(store.len().await.unwrap(), 0);
    assert_eq!(h.reports()[0].reason, "publish");
}

#[tokio::test]
async fn record_failure_aborts_as_store_error() {
    let history = FlakyHistory {
        inner: store().await,
        fail_is_duplicate: false,
        fail_record: true,
        fail_prune: false,
    };
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let h = Setup::new(items, Arc::new(history)).build();

    let out = h.pipeline.run_at(now()).await;
    assert!(matches!(
        out,
        RunOutcome::Aborted {
            at: PipelineState::Recording,
            error: Some(PipelineError::Store(_)),
            ..
        }
    ));
    assert_eq!(h.post_count(), 1);
    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].reason, "store");
}

#[tokio::test]
async fn dedup_lookup_failure_aborts_before_generation() {
    let inner = store().await;
    let history = FlakyHistory {
        inner: inner.clone(),
        fail_is_duplicate: true,
        fail_record: false,
        fail_prune: false,
    };
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let h = Setup::new(items, Arc::new(history)).build();

    let out = h.pipeline.run_at(now()).await;
    assert!(out.is_failure());
    assert!(matches!(
        out,
        RunOutcome::Aborted {
            at: PipelineState::Filtering,
            error: Some(PipelineError::Store(_)),
            ..
        }
    ));
    assert_eq!(h.collector_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.primary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.secondary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.post_count(), 0);
    assert_eq!(inner.len().await.unwrap(), 0);
    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].category, ReportCategory::Error);
    assert_eq!(reports[0].reason, "store");
}

#[tokio::test]
async fn unreachable_publish_endpoint_aborts_before_collecting() {
    let store = store().await;
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let mut setup = Setup::new(items, Arc::new(store.clone()));
    setup.publish = PublishMode::Unreachable;
    let h = setup.build();

    let out = h.pipeline.run_at(now()).await;
    match &out {
        RunOutcome::Aborted {
            at,
            error: Some(PipelineError::Config(msg)),
            ..
        } => {
            assert_eq!(*at, PipelineState::Idle);
            assert!(msg.contains("401"), "{msg}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.collector_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.primary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.post_count(), 0);
    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].reason, "config");
}

#[tokio::test]
async fn prune_failure_is_not_fatal() {
    let inner = store().await;
    let history = FlakyHistory {
        inner: inner.clone(),
        fail_is_duplicate: false,
        fail_record: false,
        fail_prune: true,
    };
    let items = vec![
        item("OpenAIが新モデルを発表しました", "https://x.com/a", "ITmedia AI+"),
        item("Claudeの新機能がリリースされました", "https://x.com/b", "Zenn AI"),
    ];
    let h = Setup::new(items, Arc::new(history)).build();

    assert!(matches!(h.pipeline.run_at(now()).await, RunOutcome::Done { .. }));
    assert_eq!(inner.len().await.unwrap(), 2);
    assert!(h.reports().is_empty());
}

#[tokio::test]
async fn maintenance_mode_does_nothing_and_reports_nothing() {
    let mut setup = Setup::new(vec![], Arc::new(store().await));
    setup.cfg.control.maintenance_mode = true;
    setup.cfg.control.skip_next_publish = true;
    let h = setup.build();

    assert!(matches!(h.pipeline.run_at(now()).await, RunOutcome::Maintenance));
    assert_eq!(h.collector_calls.load(Ordering::SeqCst), 0);
    assert!(h.reports().is_empty());
}

#[tokio::test]
async fn manual_skip_sends_one_skip_report() {
    let mut setup = Setup::new(vec![], Arc::new(store().await));
    setup.cfg.control.skip_next_publish = true;
    let h = setup.build();

    let out = h.pipeline.run_at(now()).await;
    assert!(matches!(out, RunOutcome::Skipped { ref reason } if reason == "manual skip"));
    assert!(!out.is_failure());
    assert_eq!(h.collector_calls.load(Ordering::SeqCst), 0);
    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].category, ReportCategory::Skip);
}
