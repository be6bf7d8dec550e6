//! Error types for assetsync-engine.

use thiserror::Error;

use assetsync_core::{AssetError, ConfigError};

/// Failure reported by a remote store outside of per-event execution,
/// e.g. while listing keys.
#[derive(Debug, Error)]
#[error("remote store error: {message}")]
pub struct RemoteError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// A blocking point gave up because the run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// All errors that stop a run before or while it is wired up.
///
/// Per-event remote failures are never reported here; they travel through the
/// log stream.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{task} task join failure: {source}")]
    Join {
        task: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

pub(crate) fn join_err(task: &'static str, source: tokio::task::JoinError) -> EngineError {
    EngineError::Join { task, source }
}
