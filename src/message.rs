use serde_derive::{Deserialize, Serialize};

/// Permission to enter the critical section. Exactly one is live in the ring.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    /// Last member to hold the token
    pub holder: usize,

    /// Number of hops taken so far. Not used for any protocol decision.
    pub sequence: u64,
}

impl Token {
    /// Mints the ring's only token at the origin.
    pub fn new(origin: usize) -> Self {
        Token {
            holder: origin,
            sequence: 0,
        }
    }

    /// Stamps the token for its next hop away from `holder`.
    pub fn pass(self, holder: usize) -> Self {
        Token {
            holder,
            sequence: self.sequence.wrapping_add(1),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ack {
    pub message: String,
}

impl Ack {
    pub fn received() -> Self {
        Ack { message: "Process received token!".to_string() }
    }
}

/// Requests a member accepts from its predecessor.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug)]
pub enum Request {
    Token(Token),
}

/// Responses a member sends back to its predecessor.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Ack(Ack),

    /// Token refused as a second live token
    Rejected(String),

    /// Member is up but its token handler has exited
    Stopped,
}
