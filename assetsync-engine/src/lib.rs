//! # assetsync-engine
//!
//! Reconciliation and throttled dispatch of asset events.
//!
//! Call [`pipeline::replace`] to push a working root to a remote store, or
//! [`pipeline::plan`] to preview the events without sending any. The pieces
//! it wires together are usable on their own:
//!
//! - [`reconcile`]: full snapshot diff and explicit file producers
//! - [`limiter`]: the [`LeakyBucket`] admission gate
//! - [`foreman`]: meters a raw event stream through the bucket
//! - [`merge`]: fans remote log streams into one sink
//! - [`source`]: collaborator traits, with [`FsLocalSource`] and
//!   [`DirectoryRemote`] as the bundled implementations

pub mod error;
pub mod foreman;
pub mod limiter;
pub mod local;
pub mod merge;
pub mod pipeline;
pub mod queue;
pub mod reconcile;
pub mod remote;
pub mod shutdown;
pub mod source;

pub use error::{Cancelled, EngineError, RemoteError};
pub use foreman::{prepare_channel, Channels, Foreman, ForemanReport};
pub use limiter::LeakyBucket;
pub use local::FsLocalSource;
pub use merge::merge_logs;
pub use pipeline::{plan, replace, Completion, Mode, ReplaceRequest, RunReport};
pub use reconcile::{plan_full, ActionMap, LoadAttempt, ProducerReport, SkippedFile};
pub use remote::DirectoryRemote;
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use source::{Execution, LocalAssetSource, RemoteAssetSource};
