//! Per-connection lifecycle.
//!
//! ```text
//! Disconnected --InitiateConnect--> Connecting --HandshakeSucceeded--> Connected
//!                                   Connecting --HandshakeTimedOut/Rejected--> Failed
//! Connected --RemoteDisconnect/TimedOut/Disconnect--> Disconnected
//! ```
//!
//! `Failed` is terminal for the attempt. A retry needs a fresh machine.

use crate::error::{NetError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    InitiateConnect,
    HandshakeSucceeded,
    HandshakeTimedOut,
    HandshakeRejected,
    RemoteDisconnect,
    TimedOut,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    HandshakeTimeout,
    HandshakeRejected(String),
}

impl FailureReason {
    pub fn to_error(&self) -> NetError {
        match self {
            FailureReason::HandshakeTimeout => NetError::HandshakeTimeout,
            FailureReason::HandshakeRejected(reason) => NetError::HandshakeRejected(reason.clone()),
        }
    }
}

#[derive(Debug, Default)]
pub struct PeerStateMachine {
    state: PeerState,
    failure: Option<FailureReason>,
}

impl PeerStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }

    #[inline]
    pub fn is_connecting(&self) -> bool {
        self.state == PeerState::Connecting
    }

    #[inline]
    pub fn has_failed(&self) -> bool {
        self.state == PeerState::Failed
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    /// Applies `event`, refusing anything outside the transition table.
    pub fn apply(&mut self, event: PeerEvent) -> Result<PeerState> {
        use PeerEvent::*;
        use PeerState::*;

        let next = match (self.state, event) {
            (Disconnected, InitiateConnect) => Connecting,
            (Connecting, HandshakeSucceeded) => Connected,
            (Connecting, HandshakeTimedOut | HandshakeRejected) => Failed,
            // Abandoning an attempt in flight.
            (Connecting, Disconnect) => Disconnected,
            (Connected, RemoteDisconnect | TimedOut | Disconnect) => Disconnected,
            (from, event) => return Err(NetError::InvalidTransition { from, event }),
        };

        log::debug!("peer {:?} --{:?}--> {:?}", self.state, event, next);
        self.state = next;
        Ok(next)
    }

    pub fn initiate_connect(&mut self) -> Result<()> {
        self.apply(PeerEvent::InitiateConnect).map(|_| ())
    }

    pub fn handshake_succeeded(&mut self) -> Result<()> {
        self.apply(PeerEvent::HandshakeSucceeded).map(|_| ())
    }

    pub fn fail(&mut self, reason: FailureReason) -> Result<()> {
        let event = match reason {
            FailureReason::HandshakeTimeout => PeerEvent::HandshakeTimedOut,
            FailureReason::HandshakeRejected(_) => PeerEvent::HandshakeRejected,
        };
        self.apply(event)?;
        self.failure = Some(reason);
        Ok(())
    }

    /// Idempotent. Returns true only when the state actually changed.
    pub fn disconnect(&mut self) -> bool {
        match self.state {
            PeerState::Connecting | PeerState::Connected => {
                self.apply(PeerEvent::Disconnect).is_ok()
            }
            PeerState::Disconnected | PeerState::Failed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_passes_through_connecting() {
        let mut peer = PeerStateMachine::new();
        assert_eq!(peer.state(), PeerState::Disconnected);

        assert!(peer.handshake_succeeded().is_err());
        assert_eq!(peer.state(), PeerState::Disconnected);

        peer.initiate_connect().unwrap();
        assert!(peer.is_connecting());
        peer.handshake_succeeded().unwrap();
        assert!(peer.is_connected());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut peer = PeerStateMachine::new();
        peer.initiate_connect().unwrap();
        peer.handshake_succeeded().unwrap();

        assert!(peer.disconnect());
        let once = peer.state();
        assert!(!peer.disconnect());
        assert_eq!(peer.state(), once);
        assert_eq!(once, PeerState::Disconnected);
    }

    #[test]
    fn failed_is_terminal() {
        let mut peer = PeerStateMachine::new();
        peer.initiate_connect().unwrap();
        peer.fail(FailureReason::HandshakeTimeout).unwrap();

        assert!(peer.has_failed());
        assert_eq!(peer.failure(), Some(&FailureReason::HandshakeTimeout));
        assert!(!peer.disconnect());
        assert!(peer.has_failed());
        assert!(matches!(
            peer.initiate_connect(),
            Err(NetError::InvalidTransition {
                from: PeerState::Failed,
                event: PeerEvent::InitiateConnect,
            })
        ));
    }

    #[test]
    fn connected_cannot_fail_handshake() {
        let mut peer = PeerStateMachine::new();
        peer.initiate_connect().unwrap();
        peer.handshake_succeeded().unwrap();

        assert!(peer.fail(FailureReason::HandshakeRejected("late".into())).is_err());
        assert!(peer.is_connected());
        assert!(peer.failure().is_none());

        assert_eq!(peer.apply(PeerEvent::TimedOut).unwrap(), PeerState::Disconnected);
    }
}
