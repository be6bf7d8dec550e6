//! Fan-in of log streams into the caller's log sink.

use tokio::task::{JoinHandle, JoinSet};

use crate::queue::{LogReceiver, LogSender};

/// Forward every entry from every source into `sink`.
///
/// One forwarder task runs per source, so entries from a single source keep
/// their order while sources interleave by arrival. The returned task
/// completes after every source has closed (immediately for no sources) and
/// yields the number of entries forwarded. If the sink is dropped, remaining
/// entries are drained and discarded so sources never block.
pub fn merge_logs(sink: LogSender, sources: Vec<LogReceiver>) -> JoinHandle<usize> {
    let mut forwarders = JoinSet::new();
    for mut source in sources {
        let sink = sink.clone();
        forwarders.spawn(async move {
            let mut forwarded = 0usize;
            let mut sink_open = true;
            while let Some(entry) = source.recv().await {
                if sink_open {
                    if sink.send(entry).await.is_ok() {
                        forwarded += 1;
                    } else {
                        tracing::debug!("log sink closed; discarding remaining entries");
                        sink_open = false;
                    }
                }
            }
            forwarded
        });
    }
    drop(sink);

    tokio::spawn(async move {
        let mut total = 0usize;
        while let Some(joined) = forwarders.join_next().await {
            match joined {
                Ok(forwarded) => total += forwarded,
                Err(err) => tracing::error!(error = %err, "log forwarder task failed"),
            }
        }
        total
    })
}
