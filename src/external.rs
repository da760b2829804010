//! # Summary
//!
//! This module abstracts over external connections to peer processes.
//!
//! Wraps `tokio-util`'s length-delimited codec around each half of a byte
//! stream and encodes every frame with `bincode`. This allows us to send
//! and receive Rust structs through a TCP connection with minimal
//! boilerplate on the sending and receiving ends.

use std::marker::PhantomData;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{self, AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error;

/// External receiving channel. Expects length-delimited, bincode-encoded
/// Rust data of type `R`.
pub struct Rx<S, R> {
    inner: FramedRead<io::ReadHalf<S>, LengthDelimitedCodec>,
    _marker: PhantomData<R>,
}

/// External transmission channel. Sends length-delimited, bincode-encoded
/// Rust data of type `T`.
pub struct Tx<S, T> {
    inner: FramedWrite<io::WriteHalf<S>, LengthDelimitedCodec>,
    _marker: PhantomData<T>,
}

/// Split a byte stream into a pair of receiving and transmitting
/// channels capable of reading and writing bincode-encoded data.
pub fn new<S, R, T>(stream: S) -> (Rx<S, R>, Tx<S, T>)
where S: AsyncRead + AsyncWrite,
      R: serde::de::DeserializeOwned,
      T: serde::Serialize,
{
    let (rx, tx) = io::split(stream);
    let rx = Rx {
        inner: FramedRead::new(rx, LengthDelimitedCodec::new()),
        _marker: PhantomData,
    };
    let tx = Tx {
        inner: FramedWrite::new(tx, LengthDelimitedCodec::new()),
        _marker: PhantomData,
    };
    (rx, tx)
}

impl<S: AsyncRead, R: serde::de::DeserializeOwned> Rx<S, R> {
    /// Reads the next frame. Returns `None` once the peer closes the stream.
    pub async fn recv(&mut self) -> Option<Result<R, error::Wire>> {
        let frame = match self.inner.next().await? {
        | Ok(frame) => frame,
        | Err(error) => return Some(Err(error.into())),
        };
        Some(bincode::deserialize(&frame).map_err(error::Wire::from))
    }
}

impl<S: AsyncWrite, T: serde::Serialize> Tx<S, T> {
    /// Encodes and flushes a single frame.
    pub async fn send(&mut self, message: &T) -> Result<(), error::Wire> {
        let frame = bincode::serialize(message)?;
        self.inner.send(Bytes::from(frame)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Ack, Reply, Request, Token};

    #[tokio::test]
    async fn request_and_reply_cross_stream() {
        let (left, right) = io::duplex(1024);
        let (mut client_rx, mut client_tx) = new::<_, Reply, Request>(left);
        let (mut server_rx, mut server_tx) = new::<_, Request, Reply>(right);

        let token = Token { holder: 2, sequence: 9 };
        client_tx.send(&Request::Token(token)).await.unwrap();
        match server_rx.recv().await {
        | Some(Ok(Request::Token(received))) => assert_eq!(received, token),
        | _ => panic!("unexpected frame"),
        }

        server_tx.send(&Reply::Ack(Ack::received())).await.unwrap();
        server_tx.send(&Reply::Stopped).await.unwrap();
        match client_rx.recv().await {
        | Some(Ok(Reply::Ack(ack))) => assert_eq!(ack, Ack::received()),
        | _ => panic!("unexpected frame"),
        }
        match client_rx.recv().await {
        | Some(Ok(Reply::Stopped)) => (),
        | _ => panic!("unexpected frame"),
        }
    }

    #[tokio::test]
    async fn closed_stream_ends_receiver() {
        let (left, right) = io::duplex(64);
        let (mut rx, _tx) = new::<_, Request, Reply>(right);
        drop(left);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn garbage_frame_is_codec_error() {
        let (left, right) = io::duplex(64);
        let (_, mut raw) = new::<_, (), u32>(left);
        let (mut rx, _tx) = new::<_, Request, Reply>(right);
        // Variant index outside `Request`
        raw.send(&7).await.unwrap();
        drop(raw);
        match rx.recv().await {
        | Some(Err(error::Wire::Codec(_))) => (),
        | _ => panic!("expected codec error"),
        }
    }
}
