//! Run scheduling and fan-out.
//!
//! One run walks every registered adapter concurrently:
//!
//! 1. **Listing**: [`list_candidates`] collects candidate URLs; URLs already
//!    in the dedup index are skipped before any request is made
//! 2. **Fetching**: at most `per_source_concurrency` article fetches per
//!    adapter, all of them behind the global ceiling and the per-host gates
//! 3. **Parsing and normalizing**: synchronous, per page
//! 4. **Sealing**: the batch is handed to the [`Sink`]
//!
//! Adapter tasks report back over a channel, so a run that hits its deadline
//! still knows which URLs were in flight and can report them as timeouts.
//!
//! ```text
//! Idle ──trigger──▶ Running ──all adapters done / deadline──▶ Sealing ──▶ Idle
//! ```

use crate::config::Config;
use crate::dedup::{DedupKey, SharedDedupIndex};
use crate::error::{FetchError, RunError};
use crate::fetch::Fetch;
use crate::models::{ArticleRecord, BatchBuilder, ErrorEntry, RunBatch};
use crate::normalize::{Normalized, Normalizer, dedup_key};
use crate::outputs::Sink;
use crate::scrapers::{SourceAdapter, list_candidates};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Sealing,
}

/// Limits applied to a single run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub run_timeout: Duration,
    pub fetch_timeout: Duration,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub max_candidates: usize,
    /// Where the dedup index is persisted after each published batch.
    pub dedup_state: Option<PathBuf>,
}

impl RunSettings {
    /// Take the run limits from a validated [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            run_timeout: config.run_timeout(),
            fetch_timeout: config.fetch.timeout(),
            global_concurrency: config.global_concurrency,
            per_source_concurrency: config.per_source_concurrency,
            max_candidates: config.max_candidates_per_source,
            dedup_state: config.dedup_state.clone(),
        }
    }
}

/// Summary of a published run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub path: PathBuf,
    pub articles: usize,
    pub errors: usize,
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Another run was still in progress.
    Skipped,
}

/// Caps the number of fetches in flight across all adapters.
struct GlobalLimit {
    inner: Arc<dyn Fetch>,
    permits: Semaphore,
}

#[async_trait]
impl Fetch for GlobalLimit {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Request("global fetch limiter closed".to_string()))?;
        self.inner.fetch(url, timeout).await
    }
}

/// What happened to one candidate URL.
enum Outcome {
    Article(ArticleRecord),
    Failed(ErrorEntry),
    /// Emitted by another task of this source between listing and fetching.
    Suppressed,
}

enum Event {
    Listed {
        source: String,
        urls: Vec<Url>,
        failures: Vec<ErrorEntry>,
        suppressed: usize,
    },
    Done {
        source: String,
        url: Url,
        outcome: Outcome,
    },
}

#[derive(Debug, Default)]
struct Progress {
    listed: bool,
    in_flight: Vec<Url>,
}

/// Folds adapter events into the batch and remembers outstanding work.
struct Collector {
    builder: BatchBuilder,
    progress: BTreeMap<String, Progress>,
}

impl Collector {
    fn new(builder: BatchBuilder, sources: impl IntoIterator<Item = String>) -> Self {
        Self {
            builder,
            progress: sources
                .into_iter()
                .map(|s| (s, Progress::default()))
                .collect(),
        }
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Listed {
                source,
                urls,
                failures,
                suppressed,
            } => {
                for failure in failures {
                    self.builder.push_error(failure);
                }
                self.builder.note_suppressed(&source, suppressed);
                let progress = self.progress.entry(source).or_default();
                progress.listed = true;
                progress.in_flight = urls;
            }
            Event::Done {
                source,
                url,
                outcome,
            } => {
                if let Some(progress) = self.progress.get_mut(&source) {
                    progress.in_flight.retain(|u| u != &url);
                }
                match outcome {
                    Outcome::Article(record) => self.builder.push_article(record),
                    Outcome::Failed(entry) => self.builder.push_error(entry),
                    Outcome::Suppressed => self.builder.note_suppressed(&source, 1),
                }
            }
        }
    }

    /// Report everything still outstanding as a run timeout.
    fn expire(&mut self) {
        for (source, progress) in &mut self.progress {
            if !progress.listed {
                self.builder.push_error(ErrorEntry::run_timeout(source, None));
                continue;
            }
            for url in progress.in_flight.drain(..) {
                self.builder
                    .push_error(ErrorEntry::run_timeout(source, Some(&url)));
            }
        }
    }

    fn seal(self) -> RunBatch {
        self.builder.seal()
    }
}

/// Resets the run state to `Idle` however the run ends.
struct StateGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl StateGuard<'_> {
    fn set(&self, next: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.set(RunState::Idle);
    }
}

pub struct Orchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    fetcher: Arc<dyn Fetch>,
    sink: Arc<dyn Sink>,
    dedup: SharedDedupIndex,
    settings: RunSettings,
    state: Mutex<RunState>,
}

impl Orchestrator {
    /// Create an idle orchestrator.
    ///
    /// # Arguments
    ///
    /// * `adapters` - Sources to run, already checked for unique names
    /// * `fetcher` - Fetch stack used for listing and article pages; the
    ///   global concurrency ceiling is added on top of it per run
    /// * `sink` - Destination of every sealed batch
    /// * `dedup` - Index shared across runs
    /// * `settings` - Per-run limits
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        fetcher: Arc<dyn Fetch>,
        sink: Arc<dyn Sink>,
        dedup: SharedDedupIndex,
        settings: RunSettings,
    ) -> Self {
        Self {
            adapters,
            fetcher,
            sink,
            dedup,
            settings,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self) -> Option<StateGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != RunState::Idle {
            warn!(state = ?*state, "Run already in progress; skipping trigger");
            return None;
        }
        *state = RunState::Running;
        Some(StateGuard { state: &self.state })
    }

    /// Run one ingestion cycle unless one is already in progress.
    ///
    /// Only a sink failure is an error; every per-URL or per-adapter failure
    /// ends up in the batch instead.
    #[instrument(level = "info", skip_all, fields(sources = self.adapters.len()))]
    pub async fn trigger(&self) -> Result<RunOutcome, RunError> {
        let Some(guard) = self.begin() else {
            return Ok(RunOutcome::Skipped);
        };
        let started = Instant::now();

        let (batch, timed_out) = self.collect().await;
        guard.set(RunState::Sealing);
        log_stats(&batch);

        let path = match self.sink.write(&batch).await {
            Ok(path) => path,
            Err(e) => {
                let keys: Vec<DedupKey> = batch
                    .articles()
                    .iter()
                    .map(|a| DedupKey::new(a.source_name.as_str(), a.url.as_str()))
                    .collect();
                self.dedup.forget(&keys);
                error!(error = %e, rolled_back = keys.len(), "Feed write failed; batch discarded");
                return Err(e.into());
            }
        };

        let pruned = self.dedup.prune(Utc::now());
        if let Some(state_path) = &self.settings.dedup_state {
            if let Err(e) = self.dedup.snapshot().save(state_path).await {
                warn!(path = %state_path.display(), error = %e, "Failed to persist dedup state");
            }
        }

        let report = RunReport {
            path,
            articles: batch.articles().len(),
            errors: batch.errors().len(),
            timed_out,
        };
        info!(
            articles = report.articles,
            errors = report.errors,
            timed_out,
            pruned,
            elapsed_ms = started.elapsed().as_millis() as u64,
            path = %report.path.display(),
            "Run complete"
        );
        Ok(RunOutcome::Completed(report))
    }

    /// Fan out to every adapter and gather results until all are done or the
    /// run deadline passes.
    async fn collect(&self) -> (RunBatch, bool) {
        let builder = BatchBuilder::new(Utc::now());
        let mut collector = Collector::new(
            builder,
            self.adapters.iter().map(|a| a.source_name().to_string()),
        );

        let fetcher: Arc<dyn Fetch> = Arc::new(GlobalLimit {
            inner: self.fetcher.clone(),
            permits: Semaphore::new(self.settings.global_concurrency.max(1)),
        });
        let normalizer = Normalizer::new(self.dedup.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut tasks = JoinSet::new();
        for adapter in &self.adapters {
            tasks.spawn(run_adapter(
                adapter.clone(),
                fetcher.clone(),
                normalizer.clone(),
                self.dedup.clone(),
                self.settings.clone(),
                tx.clone(),
            ));
        }
        drop(tx);

        let deadline = tokio::time::sleep(self.settings.run_timeout);
        tokio::pin!(deadline);
        let mut timed_out = false;
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => collector.apply(event),
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            warn!(timeout = ?self.settings.run_timeout, "Run deadline reached; aborting adapters");
            tasks.abort_all();
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(error = %e, "Adapter task panicked");
                }
            }
        }
        // Every sender is gone now; pick up what finished before the abort.
        while let Some(event) = rx.recv().await {
            collector.apply(event);
        }
        if timed_out {
            collector.expire();
        }

        (collector.seal(), timed_out)
    }

    /// Trigger a run on every tick until `shutdown` resolves or a run fails
    /// to publish its feed.
    ///
    /// Runs execute as their own tasks, so a run that outlives the interval
    /// makes the next tick a logged no-op.
    #[instrument(level = "info", skip_all, fields(interval_secs = interval.as_secs()))]
    pub async fn serve(
        self: Arc<Self>,
        interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), RunError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<RunError>(1);
        let mut runs = JoinSet::new();
        tokio::pin!(shutdown);

        info!("Scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    let fatal = fatal_tx.clone();
                    runs.spawn(async move {
                        if let Err(e) = this.trigger().await {
                            let _ = fatal.send(e).await;
                        }
                    });
                }
                Some(err) = fatal_rx.recv() => {
                    error!(error = %err, "Stopping scheduler after fatal run error");
                    runs.shutdown().await;
                    return Err(err);
                }
                _ = &mut shutdown => {
                    info!(in_flight = runs.len(), "Shutdown requested; waiting for in-flight run");
                    while runs.join_next().await.is_some() {}
                    if let Ok(err) = fatal_rx.try_recv() {
                        return Err(err);
                    }
                    return Ok(());
                }
                Some(_) = runs.join_next(), if !runs.is_empty() => {}
            }
        }
    }
}

#[instrument(level = "info", skip_all, fields(source = adapter.source_name()))]
async fn run_adapter(
    adapter: Arc<dyn SourceAdapter>,
    fetcher: Arc<dyn Fetch>,
    normalizer: Normalizer,
    dedup: SharedDedupIndex,
    settings: RunSettings,
    tx: mpsc::UnboundedSender<Event>,
) {
    let source = adapter.source_name().to_string();
    let candidates = list_candidates(
        adapter.as_ref(),
        fetcher.as_ref(),
        settings.fetch_timeout,
        settings.max_candidates,
    )
    .await;

    let now = Utc::now();
    let (seen, fresh): (Vec<Url>, Vec<Url>) = candidates
        .urls
        .into_iter()
        .partition(|url| dedup.contains(&dedup_key(&source, url), now));
    if !seen.is_empty() {
        debug!(count = seen.len(), "Skipping candidates already emitted");
    }

    let _ = tx.send(Event::Listed {
        source: source.clone(),
        urls: fresh.clone(),
        failures: candidates.failures,
        suppressed: seen.len(),
    });

    stream::iter(fresh)
        .map(|url| {
            let adapter = Arc::clone(&adapter);
            let fetcher = Arc::clone(&fetcher);
            let normalizer = normalizer.clone();
            let source = source.clone();
            let tx = tx.clone();
            let timeout = settings.fetch_timeout;
            async move {
                let outcome =
                    process_url(adapter.as_ref(), fetcher.as_ref(), &normalizer, &url, timeout)
                        .await;
                // Sent in the same poll as the dedup insert so an abort
                // cannot separate the two.
                let _ = tx.send(Event::Done {
                    source,
                    url,
                    outcome,
                });
            }
        })
        .buffer_unordered(settings.per_source_concurrency.max(1))
        .collect::<Vec<()>>()
        .await;
}

async fn process_url(
    adapter: &dyn SourceAdapter,
    fetcher: &dyn Fetch,
    normalizer: &Normalizer,
    url: &Url,
    timeout: Duration,
) -> Outcome {
    let source = adapter.source_name();
    let body = match fetcher.fetch(url, timeout).await {
        Ok(body) => body,
        Err(e) => {
            warn!(source, %url, error = %e, "Article fetch failed");
            return Outcome::Failed(ErrorEntry::from_fetch(source, Some(url), &e));
        }
    };

    let raw = match adapter.parse(&body, url) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                source,
                %url,
                error = %e,
                page_preview = %truncate_for_log(&String::from_utf8_lossy(&body), 200),
                "Article parse failed"
            );
            return Outcome::Failed(ErrorEntry::from_parse(source, Some(url), &e));
        }
    };

    match normalizer.normalize(source, url, raw) {
        Ok(Normalized::Fresh(record)) => Outcome::Article(record),
        Ok(Normalized::Duplicate(_)) => Outcome::Suppressed,
        Err(e) => {
            warn!(source, %url, error = %e, "Article rejected by validation");
            Outcome::Failed(ErrorEntry::from_validation(source, url, &e))
        }
    }
}

fn log_stats(batch: &RunBatch) {
    for (source, stats) in batch.stats() {
        info!(
            source = %source,
            articles = stats.articles,
            errors = stats.errors,
            suppressed = stats.suppressed,
            "Source summary"
        );
    }
}
