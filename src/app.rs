use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::adapter::{CleanReport, ProbeContext, SourceAdapter};
use crate::cache::VersionCache;
use crate::config::{DEFAULT_CHUNK_LINES, ResolvedConfig, default_workers};
use crate::domain::{FetchDecision, LocalState, SourceKey, StaleReason};
use crate::error::EdgeError;
use crate::http::HttpTransport;
use crate::merge::{MergeEngine, MergeStats};
use crate::normalize::SortedRecordWriter;
use crate::providers;
use crate::store::Store;

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Treat every alias as stale.
    pub force: bool,
    /// Probe and decide only; nothing is downloaded or merged.
    pub dry_run: bool,
    pub skip_merge: bool,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub workers: usize,
    pub chunk_lines: usize,
    pub verify_merge: bool,
    pub merged_output: Option<Utf8PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            chunk_lines: DEFAULT_CHUNK_LINES,
            verify_merge: false,
            merged_output: None,
        }
    }
}

/// Cancellation flag shared with whoever may abort the app's runs.
///
/// The flag is one-way and lives as long as the `App` that handed it out:
/// once set, the current run and every later run on that `App` report their
/// aliases as cancelled and skip the merge. Build a new `App` to run again.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasState {
    Init,
    Probing,
    Stale,
    Fresh,
    Fetching,
    Normalizing,
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct AliasOutcome {
    pub source: String,
    pub alias: String,
    pub state: AliasState,
    pub action: String,
    pub decision: Option<FetchDecision>,
    pub version: Option<String>,
    pub records: Option<u64>,
    pub records_path: Option<String>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
}

impl AliasOutcome {
    fn new(key: &SourceKey) -> Self {
        Self {
            source: key.source.clone(),
            alias: key.alias.clone(),
            state: AliasState::Init,
            action: "pending".to_string(),
            decision: None,
            version: None,
            records: None,
            records_path: None,
            error_kind: None,
            error: None,
        }
    }

    pub fn key(&self) -> SourceKey {
        SourceKey::new(&self.source, &self.alias)
    }

    fn finish(mut self, state: AliasState, action: &str) -> Self {
        self.state = state;
        self.action = action.to_string();
        self
    }

    fn fail(mut self, err: EdgeError) -> Self {
        warn!(key = %self.key(), error = %err, "alias failed");
        self.error_kind = Some(err.kind().to_string());
        self.error = Some(err.to_string());
        self.finish(AliasState::Failed, "failed")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
    pub output: String,
    pub stats: MergeStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub items: Vec<AliasOutcome>,
    pub failed: Vec<String>,
    pub merged: Option<MergeSummary>,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

fn phase(sink: &dyn ProgressSink, key: &SourceKey, phase: &str) {
    sink.event(ProgressEvent {
        message: format!("phase={phase}; {key}"),
        elapsed: None,
    });
}

struct SourcePlan {
    adapter: Arc<dyn SourceAdapter>,
    aliases: Vec<String>,
}

pub struct App<T: HttpTransport> {
    store: Store,
    transport: T,
    settings: RunSettings,
    sources: Vec<SourcePlan>,
    cancel: CancelToken,
}

impl<T: HttpTransport> App<T> {
    pub fn new(store: Store, transport: T, settings: RunSettings) -> Self {
        Self {
            store,
            transport,
            settings,
            sources: Vec::new(),
            cancel: CancelToken::default(),
        }
    }

    pub fn from_config(
        store: Store,
        transport: T,
        config: &ResolvedConfig,
    ) -> Result<Self, EdgeError> {
        let settings = RunSettings {
            workers: config.workers,
            chunk_lines: config.chunk_lines,
            verify_merge: config.verify_merge,
            merged_output: config.merged_output.as_deref().map(Utf8PathBuf::from),
        };
        let mut app = Self::new(store, transport, settings);
        for request in &config.sources {
            app = app.with_source(providers::build(&request.name)?, request.aliases.clone())?;
        }
        Ok(app)
    }

    /// Registers an adapter; every alias must be known to its source.
    pub fn with_source(
        mut self,
        adapter: Arc<dyn SourceAdapter>,
        aliases: Vec<String>,
    ) -> Result<Self, EdgeError> {
        for alias in &aliases {
            adapter.key(alias)?;
        }
        self.sources.push(SourcePlan { adapter, aliases });
        Ok(self)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Handle to this app's cancellation flag; see [`CancelToken`].
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn merged_output(&self) -> Utf8PathBuf {
        self.settings
            .merged_output
            .clone()
            .unwrap_or_else(|| self.store.merged_path())
    }

    /// Probes, fetches and normalizes every alias, then merges.
    ///
    /// Alias failures are reported in the returned report. Only a failed
    /// merge turns into an `Err`, since a dataset missing a source must not
    /// be handed on.
    pub fn run(&self, options: &FetchOptions, sink: &dyn ProgressSink) -> Result<RunReport, EdgeError> {
        if !options.dry_run {
            self.store.ensure_data_root()?;
            self.store.ensure_cache_root()?;
        }

        let cache = VersionCache::new();
        let ctx = ProbeContext::new(&self.transport, &cache, &self.store);
        let units: Vec<(&Arc<dyn SourceAdapter>, &str)> = self
            .sources
            .iter()
            .flat_map(|plan| {
                plan.aliases
                    .iter()
                    .map(move |alias| (&plan.adapter, alias.as_str()))
            })
            .collect();

        info!(
            units = units.len(),
            workers = self.settings.workers,
            "starting ingest run"
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.workers.max(1))
            .build()
            .map_err(|err| EdgeError::Filesystem(format!("worker pool: {err}")))?;
        let items: Vec<AliasOutcome> = pool.install(|| {
            units
                .par_iter()
                .map(|&(adapter, alias)| self.process_alias(&**adapter, alias, &ctx, options, sink))
                .collect()
        });

        let failed: Vec<String> = items
            .iter()
            .filter(|item| item.state == AliasState::Failed)
            .map(|item| item.key().to_string())
            .collect();
        let cancelled = self.cancel.is_cancelled();

        let mut report = RunReport {
            items,
            failed,
            merged: None,
            cancelled,
        };
        if cancelled {
            warn!("run cancelled; skipping merge");
            return Ok(report);
        }
        if options.dry_run || options.skip_merge {
            return Ok(report);
        }

        let inputs: Vec<Utf8PathBuf> = report
            .items
            .iter()
            .filter(|item| item.state == AliasState::Done)
            .map(|item| self.store.records_path(&item.key()))
            .collect();
        let output = self.merged_output();
        sink.event(ProgressEvent {
            message: format!("phase=Merge; {} inputs", inputs.len()),
            elapsed: None,
        });
        let start = Instant::now();
        let stats = MergeEngine::new()
            .verify_sorted(self.settings.verify_merge)
            .merge(&inputs, &output)?;
        sink.event(ProgressEvent {
            message: format!("merge.done lines={}", stats.lines_written),
            elapsed: Some(start.elapsed()),
        });
        report.merged = Some(MergeSummary {
            output: output.to_string(),
            stats,
        });
        Ok(report)
    }

    /// Diagnostic probe of one registered source.
    pub fn clean(&self, source: &str) -> Result<CleanReport, EdgeError> {
        let plan = self
            .sources
            .iter()
            .find(|plan| plan.adapter.source().name() == source)
            .ok_or_else(|| EdgeError::UnknownSource(source.to_string()))?;
        let cache = VersionCache::new();
        let ctx = ProbeContext::new(&self.transport, &cache, &self.store);
        Ok(plan.adapter.clean(&ctx))
    }

    pub fn list(&self) -> Result<Vec<(SourceKey, LocalState)>, EdgeError> {
        self.store.list_local_states()
    }

    fn process_alias(
        &self,
        adapter: &dyn SourceAdapter,
        alias: &str,
        ctx: &ProbeContext<'_>,
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> AliasOutcome {
        let key = SourceKey::new(adapter.source().name(), alias);
        let mut outcome = AliasOutcome::new(&key);
        if self.cancel.is_cancelled() {
            return outcome.finish(AliasState::Cancelled, "cancelled");
        }

        outcome.state = AliasState::Probing;
        phase(sink, &key, "Probing");
        let (remote, mut decision) = match adapter.assess(ctx, alias) {
            Ok(assessment) => assessment,
            Err(err) => return outcome.fail(err),
        };
        outcome.version = Some(remote.version.clone());

        let records_path = self.store.records_path(&key);
        if !decision.stale && !records_path.as_std_path().exists() {
            decision = FetchDecision {
                stale: true,
                reason: StaleReason::NeverFetched,
            };
        }
        let stale = decision.stale || options.force;
        outcome.decision = Some(decision);

        if !stale {
            phase(sink, &key, "Fresh");
            outcome.records_path = Some(records_path.to_string());
            return outcome.finish(AliasState::Done, "fresh");
        }
        if options.dry_run {
            return outcome.finish(AliasState::Stale, "stale");
        }
        if self.cancel.is_cancelled() {
            return outcome.finish(AliasState::Cancelled, "cancelled");
        }

        outcome.state = AliasState::Fetching;
        phase(sink, &key, "Fetching");
        let start = Instant::now();
        let fetched = match self.fetch_raw(adapter, alias, &key, ctx) {
            Ok(fetched) => fetched,
            Err(err) => return outcome.fail(err),
        };
        sink.event(ProgressEvent {
            message: format!("fetch.done {key} bytes={}", fetched.bytes),
            elapsed: Some(start.elapsed()),
        });

        outcome.state = AliasState::Normalizing;
        phase(sink, &key, "Normalizing");
        let writer = SortedRecordWriter::new(&self.store.work_dir(), self.settings.chunk_lines);
        let records = match adapter
            .normalize(alias, fetched.path.as_std_path())
            .and_then(|stream| writer.write(stream, &records_path))
        {
            Ok(records) => records,
            Err(err) => return outcome.fail(err),
        };

        let state = LocalState {
            size: remote.size.or(Some(fetched.bytes)),
            fetched_at: Some(chrono::Utc::now().to_rfc3339()),
            records: Some(records),
            remote_url: Some(fetched.url),
            tool: Some(format!("kira-edges/{}", env!("CARGO_PKG_VERSION"))),
            ..LocalState::from_remote(&remote)
        };
        if let Err(err) = self.store.write_local_state(&key, &state) {
            return outcome.fail(err);
        }

        info!(key = %key, records, "alias ingested");
        outcome.records = Some(records);
        outcome.records_path = Some(records_path.to_string());
        outcome.finish(AliasState::Done, "fetched")
    }

    fn fetch_raw(
        &self,
        adapter: &dyn SourceAdapter,
        alias: &str,
        key: &SourceKey,
        ctx: &ProbeContext<'_>,
    ) -> Result<FetchedRaw, EdgeError> {
        let url = adapter.get_remote_url(ctx, alias)?;
        let raw_dir = self.store.raw_dir(key);
        Store::ensure_dir(&raw_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(".download")
            .tempdir_in(raw_dir.as_std_path())
            .map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        let file_name = adapter.file_name(alias);
        let staged = staging.path().join(&file_name);
        let bytes = self.transport.download(&url, &staged)?;

        let path = raw_dir.join(&file_name);
        fs::rename(&staged, path.as_std_path())
            .map_err(|err| EdgeError::Filesystem(format!("move download to {path}: {err}")))?;
        Ok(FetchedRaw { url, path, bytes })
    }
}

struct FetchedRaw {
    url: String,
    path: Utf8PathBuf,
    bytes: u64,
}
