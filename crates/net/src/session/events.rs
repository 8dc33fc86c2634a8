use std::net::SocketAddr;

use super::handler::ClientSlot;
use crate::peer::FailureReason;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ClientConnected {
        slot: ClientSlot,
        addr: SocketAddr,
        client_id: u64,
    },
    ClientDisconnected {
        slot: ClientSlot,
        reason: DisconnectReason,
    },
    ConnectionDenied {
        addr: SocketAddr,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected { slot: ClientSlot },
    Disconnected { reason: DisconnectReason },
    ConnectionFailed { reason: FailureReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
    Kicked,
    Stopped,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::Stopped => "stopped",
        }
    }
}
