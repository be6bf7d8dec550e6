//! Diff engine: turns snapshots or an explicit file list into change events.
//!
//! ## Precedence
//!
//! A key present both remotely and locally must end up as an upload, never a
//! removal: local state always wins. [`plan_full`] enforces this by writing
//! every remote key as a removal first and then overwriting with an upload
//! for every local key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;

use assetsync_core::{Asset, AssetError, AssetEvent, AssetKey, LoadFailurePolicy};

use crate::queue::EventSender;
use crate::shutdown::ShutdownSignal;
use crate::source::LocalAssetSource;

/// At most one pending event per key.
pub type ActionMap = HashMap<AssetKey, AssetEvent>;

/// Build the converging event set for a full reconciliation.
pub fn plan_full(remote: Vec<Asset>, local: Vec<Asset>) -> ActionMap {
    let mut actions = ActionMap::with_capacity(remote.len() + local.len());
    generate_actions(&mut actions, remote, |asset| AssetEvent::removal(asset.key));
    // Uploads go second so they replace removal candidates for shared keys.
    generate_actions(&mut actions, local, AssetEvent::upload);
    actions
}

fn generate_actions(
    actions: &mut ActionMap,
    assets: Vec<Asset>,
    event_for: impl Fn(Asset) -> AssetEvent,
) {
    for asset in assets {
        actions.insert(asset.key.clone(), event_for(asset));
    }
}

/// Outcome of loading one explicitly named file.
#[derive(Debug)]
pub struct LoadAttempt {
    pub filename: String,
    pub result: Result<Asset, AssetError>,
}

/// Load every filename in order. Failures are returned, never swallowed.
pub async fn load_explicit(
    local: &dyn LocalAssetSource,
    root: &Path,
    filenames: &[String],
) -> Vec<LoadAttempt> {
    let mut attempts = Vec::with_capacity(filenames.len());
    for filename in filenames {
        attempts.push(LoadAttempt {
            filename: filename.clone(),
            result: local.load_asset(root, filename).await,
        });
    }
    attempts
}

/// A filename that produced no event.
#[derive(Debug)]
pub struct SkippedFile {
    pub filename: String,
    pub error: AssetError,
}

/// What a producer task emitted before closing its stream.
#[derive(Debug, Default)]
pub struct ProducerReport {
    pub emitted: usize,
    pub skipped: Vec<SkippedFile>,
    /// Stopped at a load failure under [`LoadFailurePolicy::Abort`].
    pub aborted: bool,
    pub cancelled: bool,
    /// The downstream queue closed before everything was emitted.
    pub consumer_gone: bool,
}

enum Emit {
    Sent,
    Closed,
    Cancelled,
}

async fn emit(events: &EventSender, event: AssetEvent, shutdown: &mut ShutdownSignal) -> Emit {
    tokio::select! {
        biased;
        _ = shutdown.fired() => Emit::Cancelled,
        sent = events.send(event) => match sent {
            Ok(()) => Emit::Sent,
            Err(_) => Emit::Closed,
        },
    }
}

impl ProducerReport {
    /// Record an emit outcome; returns `false` when the producer must stop.
    fn record(&mut self, outcome: Emit) -> bool {
        match outcome {
            Emit::Sent => {
                self.emitted += 1;
                true
            }
            Emit::Closed => {
                self.consumer_gone = true;
                false
            }
            Emit::Cancelled => {
                self.cancelled = true;
                false
            }
        }
    }
}

/// Emit every planned action, in map order, then close the stream.
pub fn spawn_full(
    actions: ActionMap,
    events: EventSender,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<ProducerReport> {
    tokio::spawn(async move {
        let mut report = ProducerReport::default();
        for (_, event) in actions {
            if !report.record(emit(&events, event, &mut shutdown).await) {
                break;
            }
        }
        tracing::debug!(emitted = report.emitted, "full reconciliation producer finished");
        report
    })
}

/// Load and emit each filename in input order, then close the stream.
///
/// Load failures follow `policy`: skipped with a debug or warn trace, or
/// stopping the producer at the first failure.
pub fn spawn_explicit(
    local: Arc<dyn LocalAssetSource>,
    root: PathBuf,
    filenames: Vec<String>,
    policy: LoadFailurePolicy,
    events: EventSender,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<ProducerReport> {
    tokio::spawn(async move {
        let mut report = ProducerReport::default();
        for filename in filenames {
            if shutdown.is_fired() {
                report.cancelled = true;
                break;
            }
            match local.load_asset(&root, &filename).await {
                Ok(asset) => {
                    if !report.record(emit(&events, AssetEvent::upload(asset), &mut shutdown).await)
                    {
                        break;
                    }
                }
                Err(error) => {
                    match policy {
                        LoadFailurePolicy::Skip => {
                            tracing::debug!(file = %filename, error = %error, "skipping file that failed to load");
                        }
                        LoadFailurePolicy::Warn => {
                            tracing::warn!(file = %filename, error = %error, "skipping file that failed to load");
                        }
                        LoadFailurePolicy::Abort => {
                            tracing::error!(file = %filename, error = %error, "aborting on file that failed to load");
                            report.aborted = true;
                        }
                    }
                    report.skipped.push(SkippedFile { filename, error });
                    if report.aborted {
                        break;
                    }
                }
            }
        }
        tracing::debug!(
            emitted = report.emitted,
            skipped = report.skipped.len(),
            "explicit file producer finished",
        );
        report
    })
}
