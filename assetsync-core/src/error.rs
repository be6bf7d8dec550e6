//! Error types for assetsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning a local file into an [`Asset`](crate::Asset).
#[derive(Debug, Error)]
pub enum AssetError {
    /// The file does not exist under the working root.
    #[error("asset not found at {path}")]
    NotFound { path: PathBuf },

    /// The file exists but could not be read.
    #[error("failed to read asset at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The path cannot be expressed as a relative asset key.
    #[error("invalid asset key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

impl AssetError {
    /// Classify an I/O failure on `path` as `NotFound` or `Read`.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            AssetError::NotFound { path }
        } else {
            AssetError::Read { path, source }
        }
    }
}

/// Errors from loading or validating run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Rate limiter parameters that cannot describe a working bucket.
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),

    /// Queue depth must allow at least one in-flight event.
    #[error("queue depth must be at least 1")]
    ZeroQueueDepth,

    /// Underlying I/O failure reading the config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The remote store would overlap the local files it mirrors. Only a
    /// remote strictly inside the working root (and excluded from the scan)
    /// or fully outside it can converge.
    #[error("remote store {remote} must not be the working root {root} or one of its parents")]
    RemoteOverlapsRoot { remote: PathBuf, root: PathBuf },
}
