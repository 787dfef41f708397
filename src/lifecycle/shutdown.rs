//! Shutdown coordination for the proxy.
//!
//! A single trigger fans out to the HTTP server and to anything else that
//! holds a [`ShutdownSignal`]. The triggered flag is sticky, so a signal
//! subscribed after the trigger still resolves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    /// Create a coordinator that has not fired yet.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A future-producing handle that resolves once shutdown is triggered.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
            triggered: Arc::clone(&self.triggered),
        }
    }

    /// Fire the shutdown. Only the first call notifies subscribers.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            tracing::debug!(subscribers = self.tx.receiver_count(), "Shutdown triggered");
            let _ = self.tx.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Number of signals still waiting.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to the server.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: broadcast::Receiver<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Wait for the trigger. Also returns if the coordinator is dropped.
    pub async fn recv(&mut self) {
        if self.triggered.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.rx.recv().await;
    }
}
