use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use super::events::{DisconnectReason, ServerEvent};
use super::handler::{ClientSlot, MessageHandler, PeerHandle};
use super::time::SimClock;
use crate::catalog::{Message, MessageCatalog};
use crate::config::ServerConfig;
use crate::error::{NetError, Result};
use crate::net::{
    Connection, ConnectionManager, Datagram, NetworkEndpoint, PacketType, Transport,
    parse_address,
};
use crate::peer::PeerEvent;
use crate::telemetry::TelemetryRecord;

/// Authoritative side of a session: up to `max_clients` slots, each with
/// its own connection and state machine.
pub struct Server {
    endpoint: NetworkEndpoint,
    connections: ConnectionManager,
    catalog: Arc<MessageCatalog>,
    config: ServerConfig,
    clock: SimClock,
    running: bool,
    pending_events: VecDeque<ServerEvent>,
}

impl Server {
    /// Binds the transport and returns a running server. Nothing is
    /// returned when the bind fails.
    pub fn start(bind_addr: &str, config: ServerConfig, catalog: Arc<MessageCatalog>) -> Result<Self> {
        let addr = parse_address(bind_addr)?;
        let endpoint = NetworkEndpoint::bind(addr, &config.net)?;
        log::info!(
            "server listening on {} ({} slots)",
            endpoint.local_addr(),
            config.max_clients
        );
        Ok(Self::with_endpoint(endpoint, config, catalog))
    }

    pub fn with_transport(
        transport: Box<dyn Transport>,
        config: ServerConfig,
        catalog: Arc<MessageCatalog>,
    ) -> Self {
        let endpoint = NetworkEndpoint::new(transport, config.net.protocol_id);
        Self::with_endpoint(endpoint, config, catalog)
    }

    fn with_endpoint(
        endpoint: NetworkEndpoint,
        config: ServerConfig,
        catalog: Arc<MessageCatalog>,
    ) -> Self {
        Self {
            endpoint,
            connections: ConnectionManager::new(config.max_clients),
            catalog,
            clock: SimClock::new(config.net.start_time, config.net.tick_delta),
            running: true,
            pending_events: VecDeque::new(),
            config,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn time(&self) -> f64 {
        self.clock.now()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn catalog(&self) -> &Arc<MessageCatalog> {
        &self.catalog
    }

    pub fn max_clients(&self) -> usize {
        self.connections.max_clients()
    }

    pub fn connected_count(&self) -> usize {
        self.connections.connected_count()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    /// One fixed step: flush, receive and dispatch, advance the clock, then
    /// timeouts and telemetry. A stopped server does nothing. Errors are
    /// reserved for the endpoint; a peer that cannot be reached is left to
    /// time out.
    pub fn tick<H: MessageHandler + ?Sized>(&mut self, handler: &mut H) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        self.send_packets();

        for datagram in self.endpoint.receive()? {
            let addr = datagram.addr;
            if let Err(e) = self.handle_datagram(datagram, handler) {
                log::warn!("dropping packet from {}: {}", addr, e);
            }
        }

        let now = self.clock.advance();
        self.endpoint.advance_time(now);
        self.update_connections(now);

        Ok(())
    }

    fn send_packets(&mut self) {
        let now = self.clock.now();
        let keepalive = self.config.net.keepalive_interval;

        for slot in self.connections.occupied_slots() {
            let Some(client) = self.connections.get_mut(slot) else {
                continue;
            };
            if !client.is_connected() {
                continue;
            }
            let Some(packet) = client.poll_outgoing(now, keepalive) else {
                continue;
            };
            match self.endpoint.send_to(&packet, client.addr) {
                Ok(size) => client.on_packet_sent(packet.header.sequence, size, now),
                Err(e) => {
                    log::warn!("slot {}: send to {} failed: {}", slot, client.addr, e);
                    client.on_send_failed(now);
                }
            }
        }
    }

    fn send_control_to(&mut self, payload: PacketType, addr: SocketAddr) {
        if let Err(e) = self.endpoint.send_control(payload, addr) {
            log::warn!("control packet to {} failed: {}", addr, e);
        }
    }

    fn handle_datagram<H: MessageHandler + ?Sized>(
        &mut self,
        datagram: Datagram,
        handler: &mut H,
    ) -> Result<()> {
        let Datagram { packet, addr, size } = datagram;
        let now = self.clock.now();

        match packet.payload {
            PacketType::ConnectionRequest { client_id, key } => {
                self.handle_connection_request(addr, client_id, key)?;
            }
            PacketType::Disconnect => {
                if let Some(slot) = self.connections.slot_for_addr(&addr) {
                    if let Some(client) = self.connections.get_mut(slot) {
                        client.peer_mut().apply(PeerEvent::RemoteDisconnect)?;
                    }
                    self.remove_client(slot, DisconnectReason::Graceful);
                }
            }
            PacketType::KeepAlive | PacketType::Payload { .. } => {
                let Some(slot) = self.connections.slot_for_addr(&addr) else {
                    log::debug!("packet from unknown address {}", addr);
                    return Ok(());
                };
                let Some(client) = self.connections.get_mut(slot) else {
                    return Ok(());
                };
                if let Some(PacketType::Payload { messages }) = client.process_packet(packet, size, now)
                {
                    client.receive_frames(messages);
                }
                super::dispatch(&self.catalog, client, PeerHandle::Client(slot), handler);
            }
            PacketType::ConnectionAccepted { .. } | PacketType::ConnectionDenied { .. } => {
                log::debug!("ignoring client-bound packet from {}", addr);
            }
        }

        Ok(())
    }

    fn handle_connection_request(
        &mut self,
        addr: SocketAddr,
        client_id: u64,
        key: [u8; crate::net::KEY_BYTES],
    ) -> Result<()> {
        let now = self.clock.now();

        let denial = if key != self.config.net.private_key {
            Some("invalid key")
        } else if let Some(slot) = self.connections.slot_for_addr(&addr) {
            let same_client = self
                .connections
                .get(slot)
                .is_some_and(|c| c.client_id == client_id);
            if !same_client {
                Some("address already connected")
            } else {
                // Our accept was lost; the client is still asking.
                if let Some(client) = self.connections.get_mut(slot) {
                    client.touch(now);
                }
                self.send_control_to(
                    PacketType::ConnectionAccepted {
                        client_slot: slot as u32,
                    },
                    addr,
                );
                return Ok(());
            }
        } else if self.connections.slot_for_client_id(client_id).is_some() {
            Some("client id already connected")
        } else if self.connections.free_slot().is_none() {
            Some("server full")
        } else {
            None
        };

        if let Some(reason) = denial {
            log::warn!("denying connection from {}: {}", addr, reason);
            self.send_control_to(
                PacketType::ConnectionDenied {
                    reason: reason.to_string(),
                },
                addr,
            );
            self.pending_events.push_back(ServerEvent::ConnectionDenied {
                addr,
                reason: reason.to_string(),
            });
            return Ok(());
        }

        let Some(slot) = self.connections.free_slot() else {
            return Ok(());
        };

        let mut client = Connection::new(addr, client_id, &self.config.net, now);
        client.peer_mut().initiate_connect()?;
        client.peer_mut().handshake_succeeded()?;
        client.mark_connected(now);
        if !self.connections.insert(slot, client) {
            return Ok(());
        }

        self.send_control_to(
            PacketType::ConnectionAccepted {
                client_slot: slot as u32,
            },
            addr,
        );

        log::info!("client {:#x} connected from {} in slot {}", client_id, addr, slot);
        self.pending_events.push_back(ServerEvent::ClientConnected {
            slot,
            addr,
            client_id,
        });

        Ok(())
    }

    fn update_connections(&mut self, now: f64) {
        let timeout = self.config.net.timeout;
        let mut timed_out = Vec::new();

        for slot in self.connections.occupied_slots() {
            let Some(client) = self.connections.get_mut(slot) else {
                continue;
            };
            client.advance_time(now);
            if client.is_timed_out(now, timeout) {
                if let Err(e) = client.peer_mut().apply(PeerEvent::TimedOut) {
                    log::debug!("slot {}: {}", slot, e);
                }
                timed_out.push(slot);
            }
        }

        for slot in timed_out {
            self.remove_client(slot, DisconnectReason::Timeout);
        }
    }

    fn remove_client(&mut self, slot: ClientSlot, reason: DisconnectReason) {
        if let Some(client) = self.connections.remove(slot) {
            log::info!(
                "client {:#x} in slot {} {}",
                client.client_id,
                slot,
                reason.as_str()
            );
            self.pending_events
                .push_back(ServerEvent::ClientDisconnected { slot, reason });
        }
    }

    fn send_disconnect(&mut self, addr: SocketAddr) {
        for _ in 0..self.config.net.disconnect_packets {
            if let Err(e) = self.endpoint.send_control(PacketType::Disconnect, addr) {
                log::warn!("failed to send disconnect to {}: {}", addr, e);
                break;
            }
        }
    }

    /// Queues `message` for the client in `slot`.
    pub fn send_message(&mut self, slot: ClientSlot, message: &Message) -> Result<()> {
        let client = self
            .connections
            .get_mut(slot)
            .ok_or(NetError::NotConnected)?;
        client.send_message(&self.catalog, message)
    }

    /// Queues `message` for every connected client. Returns how many
    /// accepted it.
    pub fn broadcast_message(&mut self, message: &Message) -> usize {
        let mut sent = 0;
        for slot in self.connections.occupied_slots() {
            match self.send_message(slot, message) {
                Ok(()) => sent += 1,
                Err(e) => log::debug!("broadcast to slot {} skipped: {}", slot, e),
            }
        }
        sent
    }

    /// Drops the client in `slot` and tells it so.
    pub fn disconnect_client(&mut self, slot: ClientSlot) -> Result<()> {
        let client = self.connections.get_mut(slot).ok_or(NetError::UnknownPeer)?;
        client.peer_mut().disconnect();
        let addr = client.addr;

        self.send_disconnect(addr);
        self.remove_client(slot, DisconnectReason::Kicked);
        Ok(())
    }

    /// Disconnects every client and stops ticking. Calling it again does
    /// nothing.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }

        for slot in self.connections.occupied_slots() {
            let Some(client) = self.connections.get_mut(slot) else {
                continue;
            };
            client.peer_mut().disconnect();
            let addr = client.addr;
            self.send_disconnect(addr);
            self.remove_client(slot, DisconnectReason::Stopped);
        }

        self.running = false;
        log::info!("server stopped");
    }

    /// Last tick's telemetry for `slot`.
    pub fn snapshot(&self, slot: ClientSlot) -> Result<TelemetryRecord> {
        self.connections.telemetry(slot)
    }

    pub fn connections(&self) -> Vec<(ClientSlot, SocketAddr, bool)> {
        self.connections
            .iter()
            .map(|(slot, client)| (slot, client.addr, client.is_connected()))
            .collect()
    }

    pub fn client_id(&self, slot: ClientSlot) -> Option<u64> {
        self.connections.get(slot).map(|c| c.client_id)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
