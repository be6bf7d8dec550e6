//! Throttled dispatcher between the reconciler and the remote store.
//!
//! With a limiter configured, a [`Foreman`] task pulls events from the raw
//! queue, waits for the bucket to admit each one and forwards it to the worker
//! queue. Without one, the raw and worker ends are the same channel.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::limiter::LeakyBucket;
use crate::queue::{event_queue, EventReceiver, EventSender};
use crate::shutdown::ShutdownSignal;

/// What a foreman did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForemanReport {
    pub forwarded: usize,
    /// Stopped because the run was cancelled.
    pub cancelled: bool,
    /// Stopped because the worker queue's consumer went away.
    pub consumer_gone: bool,
}

/// Producer and consumer ends of a (possibly metered) event pipeline.
#[derive(Debug)]
pub struct Channels {
    /// Where the reconciler writes.
    pub raw: EventSender,
    /// What the remote store drains.
    pub worker: EventReceiver,
    /// The metering task, if a limiter is configured.
    pub foreman: Option<JoinHandle<ForemanReport>>,
}

/// Build the event channels for one run.
pub fn prepare_channel(
    limiter: Option<Arc<LeakyBucket>>,
    depth: usize,
    shutdown: ShutdownSignal,
) -> Channels {
    let (raw, raw_rx) = event_queue(depth);
    let Some(limiter) = limiter else {
        return Channels {
            raw,
            worker: raw_rx,
            foreman: None,
        };
    };

    tracing::debug!(
        capacity = limiter.capacity(),
        drain_per_second = limiter.drain_per_second(),
        "metering dispatch"
    );
    let (worker_tx, worker) = event_queue(depth);
    let foreman = Foreman::new(limiter, shutdown).issue_work(raw_rx, worker_tx);
    Channels {
        raw,
        worker,
        foreman: Some(foreman),
    }
}

/// Meters events from a job queue onto a worker queue.
#[derive(Debug)]
pub struct Foreman {
    limiter: Arc<LeakyBucket>,
    shutdown: ShutdownSignal,
}

impl Foreman {
    pub fn new(limiter: Arc<LeakyBucket>, shutdown: ShutdownSignal) -> Self {
        Self { limiter, shutdown }
    }

    /// Spawn the metering loop.
    ///
    /// The worker queue is closed exactly once, when the task ends: after the
    /// job queue is exhausted and every event forwarded, or earlier on
    /// cancellation.
    pub fn issue_work(self, jobs: EventReceiver, workers: EventSender) -> JoinHandle<ForemanReport> {
        tokio::spawn(self.run(jobs, workers))
    }

    async fn run(mut self, mut jobs: EventReceiver, workers: EventSender) -> ForemanReport {
        let mut report = ForemanReport::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.fired() => {
                    report.cancelled = true;
                    break;
                }
                next = jobs.recv() => next,
            };
            let Some(event) = next else { break };

            if self.limiter.wait(&mut self.shutdown).await.is_err() {
                report.cancelled = true;
                break;
            }

            let key = event.key().clone();
            tokio::select! {
                biased;
                _ = self.shutdown.fired() => {
                    report.cancelled = true;
                    break;
                }
                sent = workers.send(event) => {
                    if sent.is_err() {
                        tracing::warn!(key = %key, "worker queue closed before event was dispatched");
                        report.consumer_gone = true;
                        break;
                    }
                }
            }
            report.forwarded += 1;
            tracing::trace!(key = %key, level = self.limiter.level(), "event admitted");
        }

        tracing::debug!(
            forwarded = report.forwarded,
            cancelled = report.cancelled,
            "foreman finished",
        );
        report
    }
}
