//! Shared types for the session hub.
//!
//! This module defines:
//! - `ConnectionId`: a lightweight handle for open sockets
//! - `Inbound` / `Outbound`: transport-neutral frames in each direction
//! - channel aliases between a connection and its writer task

use simulo_protocol::{CloseCode, Frame};
use tokio::sync::mpsc;

/// Identifier for an open socket.
///
/// Unique over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// A frame received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    /// The peer closed the socket or the transport failed.
    Closed,
}

/// A frame queued for the peer.
///
/// Every write to a socket goes through its single writer task, so
/// frames from the keepalive and the handlers never interleave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    Ping,
    /// Send a close frame and stop writing.
    Close(CloseCode),
}

pub type OutboundTx = mpsc::UnboundedSender<Outbound>;
pub type OutboundRx = mpsc::UnboundedReceiver<Outbound>;
