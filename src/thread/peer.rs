//! # Summary
//!
//! Outbound connection to one other ring member. Tokens are sent as
//! synchronous requests: the next token is not written until the previous
//! one has been acknowledged or rejected.

use tokio::net::TcpStream;
use tokio::sync::oneshot;

use crate::error;
use crate::external;
use crate::internal;
use crate::message::{Ack, Reply, Request, Token};
use crate::shared::Shared;
use crate::transport;

#[derive(Debug)]
pub enum In {
    Token(Token, oneshot::Sender<Result<Ack, error::Forward>>),
}

pub struct Peer {
    self_id: usize,
    peer_id: usize,
    rx: internal::Rx<In>,
    peer_rx: external::Rx<TcpStream, Reply>,
    peer_tx: external::Tx<TcpStream, Request>,
    shared_tx: Shared,
}

impl Peer {
    /// Wraps an established connection and registers it with the hub.
    pub fn new(
        self_id: usize,
        peer_id: usize,
        stream: TcpStream,
        shared_tx: Shared,
    ) -> Self {
        let (peer_rx, peer_tx) = external::new(stream);
        let (rx, tx) = internal::new();
        shared_tx.write().connect_peer(peer_id, tx);
        info!("{} connected to {}", self_id, peer_id);
        Peer {
            self_id,
            peer_id,
            rx,
            peer_rx,
            peer_tx,
            shared_tx,
        }
    }

    /// Forwards queued tokens until the connection breaks.
    pub async fn run(mut self) {
        while let Some(In::Token(token, reply)) = self.rx.recv().await {
            trace!("{} sending {:?} to {}", self.self_id, token, self.peer_id);
            let outcome = self.request(token).await;
            let broken = matches!(
                outcome,
                Err(error::Forward::Wire(_)) | Err(error::Forward::Closed)
            );
            reply.send(outcome).ok();
            if broken {
                break
            }
        }
    }

    async fn request(&mut self, token: Token) -> Result<Ack, error::Forward> {
        self.peer_tx.send(&Request::Token(token)).await?;
        match self.peer_rx.recv().await {
        | Some(reply) => transport::settle(reply?),
        | None => Err(error::Forward::Closed),
        }
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        info!("{} disconnected from {}", self.self_id, self.peer_id);
        self.shared_tx.write().disconnect_peer(self.peer_id);
    }
}
