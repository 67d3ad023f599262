//! Shared shutdown signal for the long-lived workers.
//!
//! The RADIUS loop, the bot poller, and the file watcher each hold a
//! subscription and check it in their `tokio::select!` loops. Signalling
//! is idempotent; late subscribers observe an already-sent stop.

use tokio::sync::watch;

pub struct ShutdownToken {
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        ShutdownToken { stop_tx, stop_rx }
    }

    /// A receiver for one worker's `select!` loop.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Signal every subscriber to stop. Safe to call more than once.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}
