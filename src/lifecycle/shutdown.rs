//! Shutdown coordination.

use tokio::sync::broadcast;

use crate::lifecycle::signals::wait_for_signal;

/// Broadcasts a single shutdown notification to every subscribed task.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let notified = self.tx.send(()).unwrap_or(0);
        tracing::debug!(subscribers = notified, "Shutdown triggered");
    }

    /// Trigger shutdown when the process receives SIGINT/SIGTERM.
    pub fn trigger_on_signal(&self) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            this.trigger();
        })
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once `rx` fires or its sender is gone.
pub async fn recv_shutdown(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}
