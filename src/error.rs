//! # Summary
//!
//! Failures are split by where they happen: before the ring starts
//! (`Bootstrap`), while handing the token to a successor (`Forward`), and
//! when the protocol itself is broken (`Violation`). A violation means a
//! duplicated token or a bad topology, never a network fault, so it is kept
//! apart from transport errors.

use std::net::SocketAddr;

use crate::message::Token;
use crate::state::Status;

/// Top-level error returned by a ring member.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Bootstrap(#[from] Bootstrap),

    #[error("failed to forward token to {to}: {cause}")]
    Forward { to: usize, cause: Forward },

    #[error(transparent)]
    Violation(#[from] Violation),

    #[error(transparent)]
    Topology(#[from] Topology),
}

/// Startup failures. Fatal: peers are expected to start together.
#[derive(Debug, thiserror::Error)]
pub enum Bootstrap {
    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("no port for member {id} above base {base}")]
    Port {
        id: usize,
        base: u16,
    },

    #[error("could not connect to peer {id} at {addr}: {source}")]
    Connect {
        id: usize,
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Outcome of a failed `Transport::send`.
#[derive(Debug, thiserror::Error)]
pub enum Forward {
    #[error("no channel to peer")]
    Unreachable,

    #[error("connection closed before acknowledgement")]
    Closed,

    #[error("successor is not running")]
    Stopped,

    #[error("token rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Wire(#[from] Wire),
}

/// Token delivered to a member that was not idle.
#[derive(Debug, thiserror::Error)]
#[error("member {id} received {token:?} while {status:?}")]
pub struct Violation {
    pub id: usize,
    pub status: Status,
    pub token: Token,
}

/// Invalid ring construction or lookup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Topology {
    #[error("ring has no members")]
    Empty,

    #[error("{0} is not a member of the ring")]
    Unknown(usize),
}

/// Framing and serialization failures on a socket.
#[derive(Debug, thiserror::Error)]
pub enum Wire {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] bincode::Error),
}
