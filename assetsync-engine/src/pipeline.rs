//! Replace pipeline: the canonical entrypoint used by the CLI.
//!
//! Wiring, in the order it is set up:
//!
//! 1. Validate limiter, queue and remote placement (fatal before anything
//!    starts).
//! 2. Build the raw/worker channels, metered by a foreman if rate limited.
//! 3. Hand the worker end to the remote store.
//! 4. Merge the remote's log stream into the caller's sink.
//! 5. Start the producer: a full reconciliation or the explicit file list.
//!
//! [`Completion::wait`] resolves once the remote store signals completion and
//! every log entry has been forwarded. It reports what the pipeline did, not
//! whether individual uploads succeeded; that lives in the log stream.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use assetsync_core::config::{check_remote_placement, DEFAULT_QUEUE_DEPTH};
use assetsync_core::{AssetEvent, ConfigError, LoadFailurePolicy, RateLimitConfig, RunConfig};

use crate::error::{join_err, EngineError};
use crate::foreman::{prepare_channel, ForemanReport};
use crate::limiter::LeakyBucket;
use crate::merge::merge_logs;
use crate::queue::LogSender;
use crate::reconcile::{
    load_explicit, plan_full, spawn_explicit, spawn_full, ProducerReport, SkippedFile,
};
use crate::shutdown::ShutdownSignal;
use crate::source::{LocalAssetSource, RemoteAssetSource};

/// How the event set of a run is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Remote listing diffed against a scan of the working root.
    Full,
    /// Only the named files are uploaded.
    Explicit,
}

/// Inputs of one replace run.
#[derive(Debug, Clone)]
pub struct ReplaceRequest {
    pub root: PathBuf,
    /// Empty means full reconciliation.
    pub filenames: Vec<String>,
    pub rate_limit: Option<RateLimitConfig>,
    pub on_load_failure: LoadFailurePolicy,
    pub queue_depth: usize,
    /// Directory backing the remote store, when it has one. Checked against
    /// `root` so the store can never shadow the files it mirrors.
    pub remote_root: Option<PathBuf>,
}

impl ReplaceRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            filenames: Vec::new(),
            rate_limit: None,
            on_load_failure: LoadFailurePolicy::default(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            remote_root: None,
        }
    }

    /// Request seeded from a loaded `assetsync.yaml`.
    pub fn from_config(root: impl Into<PathBuf>, config: &RunConfig) -> Self {
        Self {
            rate_limit: config.rate_limit,
            on_load_failure: config.on_load_failure,
            queue_depth: config.queue_depth(),
            remote_root: config.remote.clone(),
            ..Self::new(root)
        }
    }

    pub fn with_filenames(mut self, filenames: Vec<String>) -> Self {
        self.filenames = filenames;
        self
    }

    pub fn with_remote_root(mut self, remote_root: impl Into<PathBuf>) -> Self {
        self.remote_root = Some(remote_root.into());
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimitConfig>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn mode(&self) -> Mode {
        if self.filenames.is_empty() {
            Mode::Full
        } else {
            Mode::Explicit
        }
    }

    /// Reject settings that cannot run. Builds the run's bucket, if any.
    fn validate(&self) -> Result<Option<Arc<LeakyBucket>>, ConfigError> {
        if self.queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if let Some(remote_root) = &self.remote_root {
            check_remote_placement(&self.root, remote_root)?;
        }
        self.rate_limit
            .map(|limit| LeakyBucket::new(limit).map(Arc::new))
            .transpose()
    }
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub mode: Mode,
    pub emitted: usize,
    pub skipped: Vec<SkippedFile>,
    /// Events that passed the limiter; `None` when running unmetered.
    pub forwarded: Option<usize>,
    /// Log entries delivered to the caller's sink.
    pub logged: usize,
    pub aborted: bool,
    pub cancelled: bool,
}

/// Single completion signal of a run.
#[derive(Debug)]
pub struct Completion {
    mode: Mode,
    done: oneshot::Receiver<()>,
    producer: JoinHandle<ProducerReport>,
    foreman: Option<JoinHandle<ForemanReport>>,
    merger: JoinHandle<usize>,
}

impl Completion {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Wait for the remote store to finish and the log stream to drain.
    ///
    /// The log sink passed to [`replace`] must be drained concurrently.
    /// Awaiting this with nobody reading the sink stalls the remote once its
    /// log buffers fill, and `done` never fires.
    pub async fn wait(self) -> Result<RunReport, EngineError> {
        if self.done.await.is_err() {
            tracing::debug!("remote store dropped its completion signal");
        }
        let logged = self.merger.await.map_err(|e| join_err("log merger", e))?;
        let producer = self.producer.await.map_err(|e| join_err("producer", e))?;
        let foreman = match self.foreman {
            Some(handle) => Some(handle.await.map_err(|e| join_err("foreman", e))?),
            None => None,
        };

        let cancelled = producer.cancelled || foreman.is_some_and(|report| report.cancelled);
        let report = RunReport {
            mode: self.mode,
            emitted: producer.emitted,
            skipped: producer.skipped,
            forwarded: foreman.map(|report| report.forwarded),
            logged,
            aborted: producer.aborted,
            cancelled,
        };
        tracing::info!(
            mode = ?report.mode,
            emitted = report.emitted,
            skipped = report.skipped.len(),
            logged = report.logged,
            cancelled = report.cancelled,
            "replace finished",
        );
        Ok(report)
    }
}

/// Start a replace run and return its completion handle.
///
/// Configuration errors and failures to list either snapshot are returned
/// before any event is dispatched. Must be called within a tokio runtime.
///
/// `log_sink` receives one entry per remote attempt. Its receiver must be
/// read (or dropped) while [`Completion::wait`] is pending: entries are
/// back-pressured, so an unread sink blocks the remote store after roughly
/// two buffers' worth of entries and the run never completes.
pub async fn replace(
    request: ReplaceRequest,
    remote: Arc<dyn RemoteAssetSource>,
    local: Arc<dyn LocalAssetSource>,
    log_sink: LogSender,
    shutdown: ShutdownSignal,
) -> Result<Completion, EngineError> {
    let limiter = request.validate()?;
    let mode = request.mode();

    // Snapshots are taken before anything is wired so listing failures stay
    // fatal and no work is dispatched.
    let actions = match mode {
        Mode::Full => {
            tracing::debug!(
                root = %request.root.display(),
                "selecting all valid files from within working root",
            );
            let remote_assets = remote.list_remote_keys().await?;
            tracing::debug!(count = remote_assets.len(), "retrieved assets from remote");
            let local_assets = local.scan_directory(&request.root).await?;
            tracing::debug!(count = local_assets.len(), "retrieved files from disk");
            Some(plan_full(remote_assets, local_assets))
        }
        Mode::Explicit => None,
    };

    let channels = prepare_channel(limiter, request.queue_depth, shutdown.clone());
    let execution = remote.execute(channels.worker, shutdown.clone());
    let merger = merge_logs(log_sink, vec![execution.logs]);

    let producer = match actions {
        Some(actions) => spawn_full(actions, channels.raw, shutdown),
        None => spawn_explicit(
            local,
            request.root,
            request.filenames,
            request.on_load_failure,
            channels.raw,
            shutdown,
        ),
    };

    tracing::info!(mode = ?mode, metered = channels.foreman.is_some(), "replace started");
    Ok(Completion {
        mode,
        done: execution.done,
        producer,
        foreman: channels.foreman,
        merger,
    })
}

/// Compute the event set a run would dispatch, without dispatching it.
///
/// Full mode is sorted by key; explicit mode keeps the input order. Load
/// failures follow the request's policy, with `Abort` returning the error.
pub async fn plan(
    request: &ReplaceRequest,
    remote: &dyn RemoteAssetSource,
    local: &dyn LocalAssetSource,
) -> Result<Vec<AssetEvent>, EngineError> {
    request.validate()?;
    match request.mode() {
        Mode::Full => {
            let remote_assets = remote.list_remote_keys().await?;
            let local_assets = local.scan_directory(&request.root).await?;
            let mut events: Vec<AssetEvent> =
                plan_full(remote_assets, local_assets).into_values().collect();
            events.sort_by(|a, b| a.key().cmp(b.key()));
            Ok(events)
        }
        Mode::Explicit => {
            let mut events = Vec::with_capacity(request.filenames.len());
            for attempt in load_explicit(local, &request.root, &request.filenames).await {
                match attempt.result {
                    Ok(asset) => events.push(AssetEvent::upload(asset)),
                    Err(error) => match request.on_load_failure {
                        LoadFailurePolicy::Abort => return Err(error.into()),
                        LoadFailurePolicy::Warn => {
                            tracing::warn!(file = %attempt.filename, error = %error, "skipping file that failed to load");
                        }
                        LoadFailurePolicy::Skip => {
                            tracing::debug!(file = %attempt.filename, error = %error, "skipping file that failed to load");
                        }
                    },
                }
            }
            Ok(events)
        }
    }
}
