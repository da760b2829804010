//! # Summary
//!
//! This module contains the concurrently running tasks of a ring member.
//!
//! `intent` and `handler` are the two protocol activities; `listener` and
//! `peer` carry tokens in and out of the process over TCP.

/// Critical-section desire.
pub mod intent;

/// Token state machine.
pub mod handler;

/// Inbound predecessor connections.
pub(crate) mod listener;

/// Outbound peer connections.
pub(crate) mod peer;
