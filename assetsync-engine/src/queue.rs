//! Event and log streams.
//!
//! Every stream has exactly one owning writer. Closing is dropping the
//! sender, so a write after close cannot be expressed.

use tokio::sync::mpsc;

use assetsync_core::{AssetEvent, LogEntry};

/// Buffer size of log streams between a remote store and the merger.
pub const LOG_QUEUE_DEPTH: usize = 64;

pub type EventSender = mpsc::Sender<AssetEvent>;
pub type EventReceiver = mpsc::Receiver<AssetEvent>;
pub type LogSender = mpsc::Sender<LogEntry>;
pub type LogReceiver = mpsc::Receiver<LogEntry>;

/// Bounded event stream. `depth` is clamped to at least one slot.
pub fn event_queue(depth: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(depth.max(1))
}

pub fn log_queue() -> (LogSender, LogReceiver) {
    mpsc::channel(LOG_QUEUE_DEPTH)
}
