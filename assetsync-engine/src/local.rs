//! Filesystem-backed [`LocalAssetSource`].
//!
//! Hidden entries (leading `.`) and the root's `assetsync.yaml` are never
//! treated as assets. Extra paths can be excluded, which keeps a remote
//! directory nested inside the working root out of the scan.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use assetsync_core::config::CONFIG_FILE_NAME;
use assetsync_core::{Asset, AssetError, AssetKey};

use crate::source::LocalAssetSource;

#[derive(Debug, Clone, Default)]
pub struct FsLocalSource {
    excluded: Vec<PathBuf>,
}

impl FsLocalSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip everything at or below `path`.
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(canonical_or_planned(path.into()));
        self
    }
}

/// Canonical form of `path`, resolving the parent when the leaf does not exist yet.
fn canonical_or_planned(path: PathBuf) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(&path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or(path),
        _ => path,
    }
}

#[async_trait]
impl LocalAssetSource for FsLocalSource {
    async fn scan_directory(&self, root: &Path) -> Result<Vec<Asset>, AssetError> {
        let root = root.to_path_buf();
        let excluded = self.excluded.clone();
        tokio::task::spawn_blocking(move || scan_blocking(&root, &excluded))
            .await
            .map_err(|err| join_failure(Path::new("."), err))?
    }

    async fn load_asset(&self, root: &Path, filename: &str) -> Result<Asset, AssetError> {
        let root = root.to_path_buf();
        let filename = filename.to_string();
        tokio::task::spawn_blocking(move || load_blocking(&root, &filename))
            .await
            .map_err(|err| join_failure(Path::new("."), err))?
    }
}

fn join_failure(path: &Path, err: tokio::task::JoinError) -> AssetError {
    AssetError::Read {
        path: path.to_path_buf(),
        source: std::io::Error::other(format!("blocking task failed: {err}")),
    }
}

fn load_blocking(root: &Path, filename: &str) -> Result<Asset, AssetError> {
    let requested = Path::new(filename);
    let relative = if requested.is_absolute() {
        requested.strip_prefix(root).map_err(|_| AssetError::InvalidKey {
            key: filename.to_string(),
            reason: "path is outside the working root",
        })?
    } else {
        requested
    };
    let key = AssetKey::from_relative_path(relative)?;
    read_asset(&root.join(relative), key)
}

fn read_asset(path: &Path, key: AssetKey) -> Result<Asset, AssetError> {
    let content = fs::read(path).map_err(|e| AssetError::from_io(path, e))?;
    let asset = Asset::new(key, content);
    let modified = fs::metadata(path).and_then(|meta| meta.modified());
    Ok(match modified {
        Ok(time) => asset.with_modified_at(DateTime::<Utc>::from(time)),
        Err(_) => asset,
    })
}

fn scan_blocking(root: &Path, excluded: &[PathBuf]) -> Result<Vec<Asset>, AssetError> {
    let files = walk_files(root, excluded)?;
    let mut assets = Vec::with_capacity(files.len());
    for path in files {
        let relative = path.strip_prefix(root).unwrap_or(path.as_path());
        let key = AssetKey::from_relative_path(relative)?;
        assets.push(read_asset(&path, key)?);
    }
    Ok(assets)
}

/// Sorted list of candidate asset files under `root`, breadth-first.
///
/// Symlinks are followed, so the scan sees the same files an explicit load
/// would. Keys keep the link's path. A directory link that leads back into
/// one of its own ancestors is skipped, as is a link with no target.
pub(crate) fn walk_files(root: &Path, excluded: &[PathBuf]) -> Result<Vec<PathBuf>, AssetError> {
    let canonical_root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let mut dirs = vec![(root.to_path_buf(), vec![canonical_root])];
    let mut files = Vec::new();
    let mut cursor = 0;
    while cursor < dirs.len() {
        let (current, chain) = dirs[cursor].clone();
        cursor += 1;
        let entries = fs::read_dir(&current).map_err(|e| AssetError::from_io(&current, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| AssetError::from_io(&current, e))?;
            let path = entry.path();
            if is_hidden(&path) || is_excluded(&path, excluded) {
                continue;
            }
            if current == root && entry.file_name() == CONFIG_FILE_NAME {
                continue;
            }
            let ty = entry.file_type().map_err(|e| AssetError::from_io(&path, e))?;
            let (is_dir, is_file) = if ty.is_symlink() {
                match fs::metadata(&path) {
                    Ok(meta) => (meta.is_dir(), meta.is_file()),
                    Err(err) => {
                        tracing::debug!(path = %path.display(), error = %err, "skipping dangling symlink");
                        continue;
                    }
                }
            } else {
                (ty.is_dir(), ty.is_file())
            };
            if is_dir {
                let canonical = fs::canonicalize(&path).map_err(|e| AssetError::from_io(&path, e))?;
                if chain.contains(&canonical) {
                    tracing::debug!(path = %path.display(), "skipping symlink cycle");
                    continue;
                }
                let mut nested = chain.clone();
                nested.push(canonical);
                dirs.push((path, nested));
            } else if is_file {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn is_excluded(path: &Path, excluded: &[PathBuf]) -> bool {
    if excluded.is_empty() {
        return false;
    }
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    excluded.iter().any(|skip| canonical.starts_with(skip))
}
