//! # Summary
//!
//! The token handler's only view of the network: hand a token to a named
//! member and learn whether it took ownership. `Shared` implements this over
//! TCP peer connections; `Local` routes straight into handlers running in
//! the same process, which is how whole rings are simulated.

use std::sync::Arc;

use hashbrown::HashMap as Map;
use parking_lot::RwLock;
use tokio::sync::oneshot;

use crate::error;
use crate::internal::Tx;
use crate::message::{Ack, Reply, Token};
use crate::thread::handler;

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `token` to member `to`. Ownership moves only on `Ok`.
    async fn send(&self, to: usize, token: Token) -> Result<Ack, error::Forward>;
}

/// Converts a member's reply into the sender's outcome.
pub(crate) fn settle(reply: Reply) -> Result<Ack, error::Forward> {
    match reply {
    | Reply::Ack(ack) => Ok(ack),
    | Reply::Rejected(reason) => Err(error::Forward::Rejected(reason)),
    | Reply::Stopped => Err(error::Forward::Stopped),
    }
}

/// In-process transport between handlers sharing one runtime.
#[derive(Clone, Default)]
pub struct Local(Arc<RwLock<Map<usize, Tx<handler::In>>>>);

impl Local {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the inbound channel of member `id`.
    pub fn connect(&self, id: usize, tx: Tx<handler::In>) {
        self.0.write().insert(id, tx);
    }

    /// Removes member `id`; later sends to it fail as unreachable.
    pub fn disconnect(&self, id: usize) {
        self.0.write().remove(&id);
    }
}

#[async_trait::async_trait]
impl Transport for Local {
    async fn send(&self, to: usize, token: Token) -> Result<Ack, error::Forward> {
        let tx = self.0.read().get(&to).cloned();
        let tx = tx.ok_or(error::Forward::Unreachable)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        if !tx.try_send(handler::In::Token(token, reply_tx)) {
            return Err(error::Forward::Stopped)
        }
        reply_rx.await
            .map_err(|_| error::Forward::Stopped)
            .and_then(settle)
    }
}
