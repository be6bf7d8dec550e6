//! Directory-backed remote store.
//!
//! ## Upload protocol
//!
//! 1. Resolve the key under the store root (keys escaping the root fail).
//! 2. SHA-256 the destination if it exists.
//! 3. Compare with the asset checksum → `Unchanged` if identical.
//! 4. Write to a hidden `.<name>.assetsync.tmp` sibling.
//! 5. Rename to the final path (atomic on POSIX).
//!
//! Removal of an absent key is `Unchanged`. Every failure becomes a `Failed`
//! log entry; nothing here aborts a run.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::oneshot;

use assetsync_core::{sha256_hex, Asset, AssetEvent, AssetKey, LogEntry, Outcome};

use crate::error::RemoteError;
use crate::local::walk_files;
use crate::queue::{log_queue, EventReceiver};
use crate::shutdown::ShutdownSignal;
use crate::source::{Execution, RemoteAssetSource};

#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply a single event synchronously and describe the outcome.
    pub fn apply(&self, event: &AssetEvent) -> LogEntry {
        let outcome = match event {
            AssetEvent::Upload { asset } => self.upload(asset),
            AssetEvent::Removal { key } => self.remove(key),
        };
        match &outcome {
            Outcome::Failed { reason } => {
                tracing::warn!(key = %event.key(), action = %event.action(), reason = %reason, "remote attempt failed");
            }
            _ => {
                tracing::debug!(key = %event.key(), action = %event.action(), outcome = ?outcome, "remote attempt finished");
            }
        }
        LogEntry::new(event, outcome)
    }

    fn path_for(&self, key: &AssetKey) -> Result<PathBuf, String> {
        let relative = Path::new(key.as_str());
        AssetKey::from_relative_path(relative).map_err(|err| err.to_string())?;
        Ok(self.root.join(relative))
    }

    fn upload(&self, asset: &Asset) -> Outcome {
        let path = match self.path_for(&asset.key) {
            Ok(path) => path,
            Err(reason) => return Outcome::Failed { reason },
        };
        let digest = asset
            .checksum
            .clone()
            .unwrap_or_else(|| sha256_hex(&asset.content));

        match std::fs::read(&path) {
            Ok(existing) if sha256_hex(&existing) == digest => return Outcome::Unchanged,
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return failed(&path, err),
        }

        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                return failed(parent, err);
            }
        }
        let tmp = tmp_path(&path);
        if let Err(err) = std::fs::write(&tmp, &asset.content) {
            return failed(&tmp, err);
        }
        if let Err(err) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return failed(&path, err);
        }
        Outcome::Succeeded
    }

    fn remove(&self, key: &AssetKey) -> Outcome {
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(reason) => return Outcome::Failed { reason },
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                self.prune_empty_parents(&path);
                Outcome::Succeeded
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Outcome::Unchanged,
            Err(err) => failed(&path, err),
        }
    }

    /// Remove directories left empty by a removal, stopping at the root.
    fn prune_empty_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if std::fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    fn list_blocking(&self) -> Result<Vec<Asset>, RemoteError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let files = walk_files(&self.root, &[])
            .map_err(|err| RemoteError::with_source("failed to list remote directory", err))?;
        let mut assets = Vec::with_capacity(files.len());
        for path in files {
            let relative = path.strip_prefix(&self.root).unwrap_or(path.as_path());
            let key = AssetKey::from_relative_path(relative)
                .map_err(|err| RemoteError::with_source("unlistable remote entry", err))?;
            assets.push(Asset::key_only(key));
        }
        Ok(assets)
    }
}

fn failed(path: &Path, err: std::io::Error) -> Outcome {
    Outcome::Failed {
        reason: format!("{}: {err}", path.display()),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.assetsync.tmp"))
}

#[async_trait]
impl RemoteAssetSource for DirectoryRemote {
    async fn list_remote_keys(&self) -> Result<Vec<Asset>, RemoteError> {
        let remote = self.clone();
        tokio::task::spawn_blocking(move || remote.list_blocking())
            .await
            .map_err(|err| RemoteError::with_source("remote listing task failed", err))?
    }

    fn execute(&self, mut events: EventReceiver, mut shutdown: ShutdownSignal) -> Execution {
        let (log_tx, logs) = log_queue();
        let (done_tx, done) = oneshot::channel();
        let remote = self.clone();

        tokio::spawn(async move {
            let mut attempted = 0usize;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = shutdown.fired() => {
                        tracing::info!(attempted, "remote execution cancelled");
                        break;
                    }
                    next = events.recv() => next,
                };
                let Some(event) = next else { break };

                let key = event.key().clone();
                let action = event.action();
                let worker = remote.clone();
                let entry = tokio::task::spawn_blocking(move || worker.apply(&event))
                    .await
                    .unwrap_or_else(|err| LogEntry {
                        key,
                        action,
                        outcome: Outcome::Failed {
                            reason: format!("remote worker task failed: {err}"),
                        },
                        at: Utc::now(),
                    });
                attempted += 1;
                if log_tx.send(entry).await.is_err() {
                    tracing::debug!("log stream receiver dropped; continuing without logs");
                }
            }
            drop(log_tx);
            let _ = done_tx.send(());
        });

        Execution { done, logs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn upload(key: &str, content: &str) -> AssetEvent {
        AssetEvent::upload(Asset::new(key, content.as_bytes().to_vec()))
    }

    #[test]
    fn upload_writes_then_repeats_as_unchanged() {
        let store = assert_fs::TempDir::new().unwrap();
        let remote = DirectoryRemote::new(store.path());

        let first = remote.apply(&upload("layout/theme.liquid", "v1"));
        assert_eq!(first.outcome, Outcome::Succeeded);
        store.child("layout/theme.liquid").assert("v1");

        let again = remote.apply(&upload("layout/theme.liquid", "v1"));
        assert_eq!(again.outcome, Outcome::Unchanged);

        let changed = remote.apply(&upload("layout/theme.liquid", "v2"));
        assert_eq!(changed.outcome, Outcome::Succeeded);
        store.child("layout/theme.liquid").assert("v2");
        store
            .child("layout/.theme.liquid.assetsync.tmp")
            .assert(predicates::path::missing());
    }

    #[test]
    fn removal_is_idempotent_and_prunes_empty_dirs() {
        let store = assert_fs::TempDir::new().unwrap();
        store.child("assets/img/logo.png").write_str("png").unwrap();
        store.child("assets/app.js").write_str("js").unwrap();
        let remote = DirectoryRemote::new(store.path());

        let removed = remote.apply(&AssetEvent::removal("assets/img/logo.png"));
        assert_eq!(removed.outcome, Outcome::Succeeded);
        store.child("assets/img").assert(predicates::path::missing());
        store.child("assets/app.js").assert("js");

        let again = remote.apply(&AssetEvent::removal("assets/img/logo.png"));
        assert_eq!(again.outcome, Outcome::Unchanged);
    }

    #[test]
    fn escaping_keys_fail_without_touching_disk() {
        let store = assert_fs::TempDir::new().unwrap();
        let remote = DirectoryRemote::new(store.path().join("inner"));
        let entry = remote.apply(&upload("../outside.txt", "x"));
        assert!(entry.outcome.is_failure());
        store.child("outside.txt").assert(predicates::path::missing());
    }

    #[tokio::test]
    async fn listing_returns_key_only_assets_and_tolerates_missing_root() {
        let store = assert_fs::TempDir::new().unwrap();
        let missing = DirectoryRemote::new(store.path().join("nope"));
        assert!(missing.list_remote_keys().await.unwrap().is_empty());

        store.child("b.txt").write_str("b").unwrap();
        store.child("dir/a.txt").write_str("a").unwrap();
        let remote = DirectoryRemote::new(store.path());
        let listed = remote.list_remote_keys().await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|asset| asset.key.as_str()).collect();
        assert_eq!(keys, vec!["b.txt", "dir/a.txt"]);
        assert!(listed.iter().all(|asset| asset.checksum.is_none()));
    }

    #[tokio::test]
    async fn execute_logs_one_entry_per_event_then_signals_done() {
        let store = assert_fs::TempDir::new().unwrap();
        store.child("old.css").write_str("old").unwrap();
        let remote = DirectoryRemote::new(store.path());

        let (tx, rx) = crate::queue::event_queue(1);
        let Execution { done, mut logs } = remote.execute(rx, ShutdownSignal::never());
        tokio::spawn(async move {
            tx.send(upload("new.css", "new")).await.unwrap();
            tx.send(AssetEvent::removal("old.css")).await.unwrap();
            tx.send(AssetEvent::removal("never-existed.css")).await.unwrap();
        });

        let mut entries = Vec::new();
        while let Some(entry) = logs.recv().await {
            entries.push(entry);
        }
        done.await.expect("done signal");

        let outcomes: Vec<(&str, &Outcome)> = entries
            .iter()
            .map(|entry| (entry.key.as_str(), &entry.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("new.css", &Outcome::Succeeded),
                ("old.css", &Outcome::Succeeded),
                ("never-existed.css", &Outcome::Unchanged),
            ]
        );
        store.child("new.css").assert("new");
        store.child("old.css").assert(predicates::path::missing());
    }
}
