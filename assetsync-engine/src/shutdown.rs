//! Cancellation signal threaded through every blocking point of a run.
//!
//! Backed by a `watch` channel so a signal cloned after the trigger fired
//! still observes the cancellation.

use tokio::sync::watch;

/// Fires the shutdown. Dropping the trigger without firing does not cancel.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Cheap, cloneable view of the shutdown state.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Option<watch::Receiver<bool>>,
}

/// Create a connected trigger/signal pair.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx: Some(rx) })
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: Some(self.tx.subscribe()),
        }
    }
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_fired(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolve once the trigger fires. Pends forever if the trigger is dropped
    /// without firing.
    pub async fn fired(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_observes_fire_before_and_after_clone() {
        let (trigger, mut signal) = channel();
        assert!(!signal.is_fired());
        trigger.fire();
        signal.fired().await;
        let mut late = trigger.signal();
        assert!(late.is_fired());
        late.fired().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trigger_never_fires() {
        let (trigger, mut signal) = channel();
        drop(trigger);
        let waited = tokio::time::timeout(Duration::from_secs(5), signal.fired()).await;
        assert!(waited.is_err(), "dropping the trigger must not cancel");
    }
}
