//! Time-stepped session loop.
//!
//! [`Server`] and [`Client`] each own a [`SimClock`] advanced by a fixed
//! delta per `tick`. A tick flushes outbound packets, receives and
//! dispatches whatever arrived, advances the clock and then runs timeout and
//! telemetry bookkeeping against the new time.

mod client;
mod events;
mod handler;
mod server;
mod time;
mod traffic;

pub use client::Client;
pub use events::{ClientEvent, DisconnectReason, ServerEvent};
pub use handler::{ClientSlot, MessageHandler, NullHandler, PeerHandle};
pub use server::Server;
pub use time::{FixedTimestep, FrameStats, SimClock};
pub use traffic::{SendThrottle, TestTraffic};

use crate::catalog::MessageCatalog;
use crate::net::Connection;

/// Decodes every message the connection has ready and hands each to
/// `handler` once. Undecodable messages are dropped.
fn dispatch<H: MessageHandler + ?Sized>(
    catalog: &MessageCatalog,
    connection: &mut Connection,
    from: PeerHandle,
    handler: &mut H,
) {
    for received in connection.drain_received() {
        match catalog.decode(&received.data, received.message_type) {
            Ok(message) => handler.handle(from, &message),
            Err(e) => log::warn!(
                "{}: discarding message of type {}: {}",
                connection.addr,
                received.message_type,
                e
            ),
        }
    }
}
