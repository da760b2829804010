//! # Summary
//!
//! Accepts connections from predecessors and turns every token request into
//! a delivery to the local handler. The reply written back to the sender is
//! whatever the handler decides, so the sender only learns it has given up
//! the token once the handler has actually taken it.

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::external;
use crate::internal::Tx;
use crate::message::{Reply, Request};
use crate::thread::handler;

/// Serves every incoming connection until the listener fails.
pub async fn serve(id: usize, listener: TcpListener, handler_tx: Tx<handler::In>) {
    loop {
        match listener.accept().await {
        | Ok((stream, addr)) => {
            debug!("{} accepted connection from {}", id, addr);
            tokio::spawn(connection(id, stream, handler_tx.clone()));
        }
        | Err(error) => {
            error!("{} stopped accepting connections: {}", id, error);
            return
        }
        }
    }
}

async fn connection(id: usize, stream: TcpStream, handler_tx: Tx<handler::In>) {
    let (mut rx, mut tx) = external::new::<_, Request, Reply>(stream);
    while let Some(request) = rx.recv().await {
        let reply = match request {
        | Ok(Request::Token(token)) => {
            trace!("{} received {:?}", id, token);
            let (reply_tx, reply_rx) = oneshot::channel();
            if handler_tx.try_send(handler::In::Token(token, reply_tx)) {
                reply_rx.await.unwrap_or(Reply::Stopped)
            } else {
                Reply::Stopped
            }
        }
        | Err(error) => {
            warn!("{} dropping connection: {}", id, error);
            return
        }
        };
        if let Err(error) = tx.send(&reply).await {
            warn!("{} failed to reply: {}", id, error);
            return
        }
    }
}
