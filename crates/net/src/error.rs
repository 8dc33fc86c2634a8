use std::io;

use crate::catalog::MessageType;
use crate::net::PacketError;
use crate::peer::{PeerEvent, PeerState};

pub type Result<T> = std::result::Result<T, NetError>;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("unknown message type {0}")]
    UnknownMessageType(MessageType),
    #[error("message type {0} registered twice")]
    DuplicateMessageType(MessageType),
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("peer is not connected")]
    NotConnected,
    #[error("unknown peer")]
    UnknownPeer,
    #[error("send queue full")]
    SendQueueFull,
    #[error("encoded message of {0} bytes does not fit in one packet")]
    MessageTooLarge(usize),
    #[error("invalid transition from {from:?} on {event:?}")]
    InvalidTransition { from: PeerState, event: PeerEvent },
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
    #[error("failed to bind transport: {0}")]
    Bind(#[source] io::Error),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}
