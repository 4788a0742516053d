//! Shutdown coordination for listeners and the outbox relay.
//!
//! A [`Shutdown`] owns a `watch` channel. Every long-running loop holds a
//! receiver and selects on [`wait_for`] next to its work.

use tokio::sync::watch;

/// Broadcasts a one-shot stop request to every subscribed loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create a signal that has not fired.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// A receiver for one loop.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Ask every loop to stop.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// Whether [`Shutdown::trigger`] has been called.
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Resolve once shutdown is requested or the signal is dropped.
pub async fn wait_for(rx: &mut watch::Receiver<bool>) {
    // An error means the sender is gone, which also means stop.
    let _ = rx.wait_for(|stop| *stop).await;
}
