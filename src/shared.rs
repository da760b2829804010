//! # Summary
//!
//! This module implements a central hub for outbound token forwarding.
//! We wrap the central `State` type with Arc<RwLock<T>> to share the
//! peer connections between the handler and the connection tasks, which
//! register and unregister themselves as they come and go.

use std::sync::Arc;

use hashbrown::HashMap as Map;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::oneshot;

use crate::error;
use crate::internal::Tx;
use crate::message::{Ack, Token};
use crate::thread::peer;
use crate::transport::Transport;

/// Thread-safe wrapper around `State` forwarding hub.
#[derive(Clone)]
pub struct Shared(Arc<RwLock<State>>);

impl Shared {

    /// Initializes an empty hub for member `id`.
    pub fn new(id: usize) -> Self {
        Shared(Arc::new(RwLock::new(State::new(id))))
    }

    /// Acquires a read lock on the underlying state.
    pub fn read(&self) -> RwLockReadGuard<State> {
        self.0.read()
    }

    /// Acquires a write lock on the underlying state.
    pub fn write(&self) -> RwLockWriteGuard<State> {
        self.0.write()
    }
}

/// Outbound channels to every other ring member.
pub struct State {
    id: usize,
    peer_txs: Map<usize, Tx<peer::In>>,
}

impl State {

    pub fn new(id: usize) -> Self {
        State {
            id,
            peer_txs: Map::default(),
        }
    }

    /// Registers the provided peer channel with this hub.
    pub fn connect_peer(&mut self, id: usize, tx: Tx<peer::In>) {
        self.peer_txs.insert(id, tx);
    }

    /// Disconnects the provided peer from this hub.
    pub fn disconnect_peer(&mut self, id: usize) {
        self.peer_txs.remove(&id);
    }

    /// Queues a token on the connection to `to`.
    /// Returns false if there is no live connection.
    fn send(&self, to: usize, message: peer::In) -> bool {
        match self.peer_txs.get(&to) {
        | Some(tx) => tx.try_send(message),
        | None => {
            warn!("{} has no channel to {}", self.id, to);
            false
        }
        }
    }
}

#[async_trait::async_trait]
impl Transport for Shared {
    async fn send(&self, to: usize, token: Token) -> Result<Ack, error::Forward> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = self.read().send(to, peer::In::Token(token, reply_tx));
        if !queued {
            return Err(error::Forward::Unreachable)
        }
        reply_rx.await.unwrap_or(Err(error::Forward::Closed))
    }
}
