//! Asset types shared by the reconciler, the local scanner and remote stores.
//!
//! Keys are always relative, `/`-separated paths regardless of host platform.

use std::fmt;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AssetError;

// ---------------------------------------------------------------------------
// AssetKey
// ---------------------------------------------------------------------------

/// Unique identifier of an asset within a snapshot, e.g. `templates/index.liquid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(pub String);

impl AssetKey {
    /// Build a key from a path relative to the working root.
    ///
    /// Rejects empty paths, absolute paths and any `..` component.
    pub fn from_relative_path(path: &Path) -> Result<Self, AssetError> {
        let display = path.to_string_lossy().to_string();
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(AssetError::InvalidKey {
                        key: display,
                        reason: "parent directory components are not allowed",
                    })
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(AssetError::InvalidKey {
                        key: display,
                        reason: "key must be relative",
                    })
                }
            }
        }
        if parts.is_empty() {
            return Err(AssetError::InvalidKey {
                key: display,
                reason: "key is empty",
            });
        }
        Ok(Self(parts.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AssetKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AssetKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A named content unit tracked for synchronization.
///
/// Remote listings only carry keys, so `content` is empty and `checksum` is
/// `None` for those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub key: AssetKey,
    #[serde(skip)]
    pub content: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Asset {
    /// Asset with full content; the SHA-256 checksum is computed eagerly.
    pub fn new(key: impl Into<AssetKey>, content: Vec<u8>) -> Self {
        let checksum = Some(sha256_hex(&content));
        Self {
            key: key.into(),
            content,
            checksum,
            modified_at: None,
        }
    }

    /// Key-only asset as returned by a remote listing.
    pub fn key_only(key: impl Into<AssetKey>) -> Self {
        Self {
            key: key.into(),
            content: Vec::new(),
            checksum: None,
            modified_at: None,
        }
    }

    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Lowercase hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}
