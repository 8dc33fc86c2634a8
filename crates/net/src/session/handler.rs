use crate::catalog::Message;

/// Server-side client slot index.
pub type ClientSlot = usize;

/// Who a dispatched message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerHandle {
    Client(ClientSlot),
    Server,
}

/// Receives every delivered message exactly once. The message is borrowed
/// for the duration of the call only.
pub trait MessageHandler {
    fn handle(&mut self, from: PeerHandle, message: &Message);
}

impl<F> MessageHandler for F
where
    F: FnMut(PeerHandle, &Message),
{
    fn handle(&mut self, from: PeerHandle, message: &Message) {
        self(from, message)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl MessageHandler for NullHandler {
    fn handle(&mut self, _from: PeerHandle, _message: &Message) {}
}
