//! Cooperative shutdown signalling.

use tokio::sync::watch;

/// Creates a linked trigger and listener pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Sending half of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Tells every linked [`Shutdown`] to stop.
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left.
        self.tx.send_replace(true);
    }

    /// Returns a new listener for this trigger.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half of the shutdown signal.
///
/// Cheap to clone; every connection task holds one.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Completes once shutdown has been triggered.
    ///
    /// Dropping the [`ShutdownTrigger`] also counts as shutdown.
    pub async fn wait(&mut self) {
        // wait_for errors only when the sender is gone.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Returns true if shutdown has been triggered or the trigger dropped.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}
