//! assetsync core library: asset and event types, run configuration, errors.
//!
//! - [`types`]: [`AssetKey`] and [`Asset`]
//! - [`event`]: [`AssetEvent`] and the [`LogEntry`] emitted per remote attempt
//! - [`config`]: `assetsync.yaml` loading and validation
//! - [`error`]: [`AssetError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use config::{LoadFailurePolicy, RateLimitConfig, RunConfig};
pub use error::{AssetError, ConfigError};
pub use event::{AssetEvent, EventAction, LogEntry, Outcome};
pub use types::{sha256_hex, Asset, AssetKey};
