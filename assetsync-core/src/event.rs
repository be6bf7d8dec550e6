//! Change events and their outcomes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Asset, AssetKey};

/// Which kind of change an event or log entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Upload,
    Removal,
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventAction::Upload => write!(f, "upload"),
            EventAction::Removal => write!(f, "removal"),
        }
    }
}

/// One intended change to the remote store.
///
/// Both variants are idempotent at the destination: uploading identical
/// content again, or removing a key that is already gone, changes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetEvent {
    /// The asset should exist remotely with this content.
    Upload { asset: Asset },
    /// No asset with this key should exist remotely.
    Removal { key: AssetKey },
}

impl AssetEvent {
    pub fn upload(asset: Asset) -> Self {
        AssetEvent::Upload { asset }
    }

    pub fn removal(key: impl Into<AssetKey>) -> Self {
        AssetEvent::Removal { key: key.into() }
    }

    pub fn key(&self) -> &AssetKey {
        match self {
            AssetEvent::Upload { asset } => &asset.key,
            AssetEvent::Removal { key } => key,
        }
    }

    pub fn action(&self) -> EventAction {
        match self {
            AssetEvent::Upload { .. } => EventAction::Upload,
            AssetEvent::Removal { .. } => EventAction::Removal,
        }
    }
}

/// Result of one attempt against the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    /// The destination already matched; nothing was transferred.
    Unchanged,
    Failed { reason: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

/// Progress record emitted by a remote store, one per attempted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: AssetKey,
    pub action: EventAction,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(event: &AssetEvent, outcome: Outcome) -> Self {
        Self {
            key: event.key().clone(),
            action: event.action(),
            outcome,
            at: Utc::now(),
        }
    }

    pub fn succeeded(event: &AssetEvent) -> Self {
        Self::new(event, Outcome::Succeeded)
    }

    pub fn unchanged(event: &AssetEvent) -> Self {
        Self::new(event, Outcome::Unchanged)
    }

    pub fn failed(event: &AssetEvent, reason: impl Into<String>) -> Self {
        Self::new(
            event,
            Outcome::Failed {
                reason: reason.into(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_key_and_action() {
        let upload = AssetEvent::upload(Asset::new("layout/theme.liquid", b"x".to_vec()));
        assert_eq!(upload.key().as_str(), "layout/theme.liquid");
        assert_eq!(upload.action(), EventAction::Upload);

        let removal = AssetEvent::removal("assets/old.css");
        assert_eq!(removal.key().as_str(), "assets/old.css");
        assert_eq!(removal.action(), EventAction::Removal);
    }

    #[test]
    fn failed_log_entry_serializes_flat_status_and_reason() {
        let event = AssetEvent::removal("assets/old.css");
        let entry = LogEntry::failed(&event, "HTTP 429");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["key"], "assets/old.css");
        assert_eq!(json["action"], "removal");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "HTTP 429");
        assert!(entry.outcome.is_failure());
    }
}
