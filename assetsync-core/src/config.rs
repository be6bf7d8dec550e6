//! Run configuration: rate limiting, load-failure policy and queue sizing.
//!
//! Values come from an optional `assetsync.yaml` in the working root; the CLI
//! layers its flags on top before calling [`RunConfig::validate`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name looked up in the working root.
pub const CONFIG_FILE_NAME: &str = "assetsync.yaml";

/// Default depth of the event queues. One slot keeps producers in lockstep
/// with the dispatcher.
pub const DEFAULT_QUEUE_DEPTH: usize = 1;

/// Leaky bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum burst admitted before the bucket has to drain.
    pub capacity: u32,
    /// Sustained admissions per second.
    pub drain_per_second: f64,
}

impl RateLimitConfig {
    pub fn new(capacity: u32, drain_per_second: f64) -> Self {
        Self {
            capacity,
            drain_per_second,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if !self.drain_per_second.is_finite() || self.drain_per_second <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(format!(
                "drain rate must be a positive number, got {}",
                self.drain_per_second
            )));
        }
        Ok(())
    }
}

/// What to do when an explicitly named file cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadFailurePolicy {
    /// Drop the file with a debug-level note and continue.
    #[default]
    Skip,
    /// Drop the file with a warning and continue.
    Warn,
    /// Stop producing events at the first failure.
    Abort,
}

/// Contents of `assetsync.yaml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Root of the directory-backed remote store, relative to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub on_load_failure: LoadFailurePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<usize>,
}

impl RunConfig {
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(limit) = &self.rate_limit {
            limit.validate()?;
        }
        if self.queue_depth == Some(0) {
            return Err(ConfigError::ZeroQueueDepth);
        }
        Ok(())
    }
}

/// Path of the config file for a working root.
pub fn config_path_at(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Load `assetsync.yaml` from `root`.
///
/// Returns the default config if the file does not exist. A relative
/// `remote` path is resolved against `root`.
pub fn load_at(root: &Path) -> Result<RunConfig, ConfigError> {
    let path = config_path_at(root);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(RunConfig::default()),
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    let mut config: RunConfig = serde_yaml::from_str(&contents)
        .map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
    if let Some(remote) = config.remote.take() {
        config.remote = Some(if remote.is_relative() {
            root.join(remote)
        } else {
            remote
        });
    }
    Ok(config)
}

/// Reject a remote store that is `root` itself or one of its ancestors.
///
/// Either layout hides every local file from the scan while the remote still
/// lists them, so a full run would plan their removal. Both paths are
/// compared in canonical form; a remote that does not exist yet is resolved
/// through its nearest existing ancestor.
pub fn check_remote_placement(root: &Path, remote: &Path) -> Result<(), ConfigError> {
    let canonical_root = resolve_for_compare(root);
    let canonical_remote = resolve_for_compare(remote);
    if canonical_root.starts_with(&canonical_remote) {
        return Err(ConfigError::RemoteOverlapsRoot {
            remote: remote.to_path_buf(),
            root: root.to_path_buf(),
        });
    }
    Ok(())
}

fn resolve_for_compare(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();
    loop {
        if let Ok(mut resolved) = std::fs::canonicalize(&existing) {
            resolved.extend(missing.iter().rev());
            return resolved;
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = if parent.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    parent.to_path_buf()
                };
            }
            _ => return path.to_path_buf(),
        }
    }
}
