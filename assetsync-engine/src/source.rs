//! Contracts with the collaborators on either side of the pipeline.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::oneshot;

use assetsync_core::{Asset, AssetError};

use crate::error::RemoteError;
use crate::queue::{EventReceiver, LogReceiver};
use crate::shutdown::ShutdownSignal;

/// Handles returned by [`RemoteAssetSource::execute`].
#[derive(Debug)]
pub struct Execution {
    /// Resolves (or closes) once every event has been attempted and logged.
    pub done: oneshot::Receiver<()>,
    /// One entry per attempted event, success or failure.
    pub logs: LogReceiver,
}

/// The store being converged.
#[async_trait]
pub trait RemoteAssetSource: Send + Sync {
    /// Keys currently present remotely. Content is not required.
    async fn list_remote_keys(&self) -> Result<Vec<Asset>, RemoteError>;

    /// Start consuming `events`.
    ///
    /// Implementations must drain the whole stream, attempt each event, emit
    /// exactly one log entry per attempt and only then complete `done`. Must be
    /// called from within a tokio runtime.
    fn execute(&self, events: EventReceiver, shutdown: ShutdownSignal) -> Execution;
}

/// The local side: a working tree of files.
#[async_trait]
pub trait LocalAssetSource: Send + Sync {
    /// Every asset under `root`, with content.
    async fn scan_directory(&self, root: &Path) -> Result<Vec<Asset>, AssetError>;

    /// Load a single file named relative to `root`.
    async fn load_asset(&self, root: &Path, filename: &str) -> Result<Asset, AssetError>;
}
