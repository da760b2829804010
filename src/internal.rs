//! # Summary
//!
//! This module abstracts over internal connections to other tasks.
//!
//! Currently backed by `tokio::sync::mpsc` unbounded channels. The only way
//! for a send to fail is if the receiving end has been dropped. Every
//! receiver here can legitimately go away (a stalled handler, a broken peer
//! connection, an observer that stopped listening), so senders get a flag
//! back and decide for themselves what a closed channel means.

use tokio::sync::mpsc;

/// Intra-process receiving channel.
#[derive(Debug)]
pub struct Rx<T>(mpsc::UnboundedReceiver<T>);

/// Intra-process transmission channel. All clones send to the same receiving end.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
#[derive(Debug)]
pub struct Tx<T>(mpsc::UnboundedSender<T>);

/// Create a new pair of linked receiving and transmitting channels.
pub fn new<T>() -> (Rx<T>, Tx<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Rx(rx), Tx(tx))
}

impl<T> Tx<T> {
    /// Attempt to send a message through the channel.
    /// Returns false if the receiving end has been dropped.
    pub fn try_send(&self, message: T) -> bool {
        self.0.send(message).is_ok()
    }
}

impl<T> Rx<T> {
    /// Waits for the next message, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.0.recv().await
    }

    /// Takes a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.0.try_recv().ok()
    }
}
