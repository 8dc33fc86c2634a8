use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use super::events::{ClientEvent, DisconnectReason};
use super::handler::{ClientSlot, MessageHandler, PeerHandle};
use super::time::SimClock;
use crate::catalog::{Message, MessageCatalog, MessageType};
use crate::config::ClientConfig;
use crate::error::{NetError, Result};
use crate::net::{Connection, Datagram, NetworkEndpoint, PacketType, Transport, parse_address};
use crate::peer::{FailureReason, PeerEvent, PeerState};
use crate::telemetry::TelemetryRecord;

/// Handshake progress while `Connecting`.
#[derive(Debug, Clone, Copy)]
struct Handshake {
    started: f64,
    last_request: Option<f64>,
}

/// Client side of a session. Holds at most one peer, the server.
pub struct Client {
    endpoint: NetworkEndpoint,
    catalog: Arc<MessageCatalog>,
    config: ClientConfig,
    clock: SimClock,
    client_id: u64,
    connection: Option<Connection>,
    handshake: Option<Handshake>,
    slot: Option<ClientSlot>,
    stopped: bool,
    pending_events: VecDeque<ClientEvent>,
}

impl Client {
    /// Binds the client's transport on `config.bind_addr`.
    pub fn start(config: ClientConfig, catalog: Arc<MessageCatalog>) -> Result<Self> {
        let addr = parse_address(&config.bind_addr)?;
        let endpoint = NetworkEndpoint::bind(addr, &config.net)?;
        log::debug!("client bound to {}", endpoint.local_addr());
        Ok(Self::with_endpoint(endpoint, config, catalog))
    }

    pub fn with_transport(
        transport: Box<dyn Transport>,
        config: ClientConfig,
        catalog: Arc<MessageCatalog>,
    ) -> Self {
        let endpoint = NetworkEndpoint::new(transport, config.net.protocol_id);
        Self::with_endpoint(endpoint, config, catalog)
    }

    fn with_endpoint(
        endpoint: NetworkEndpoint,
        config: ClientConfig,
        catalog: Arc<MessageCatalog>,
    ) -> Self {
        Self {
            endpoint,
            catalog,
            clock: SimClock::new(config.net.start_time, config.net.tick_delta),
            client_id: rand::random(),
            connection: None,
            handshake: None,
            slot: None,
            stopped: false,
            pending_events: VecDeque::new(),
            config,
        }
    }

    /// Starts a fresh connection attempt to `addr`. Any current connection
    /// is dropped first.
    pub fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        self.disconnect();

        let now = self.clock.now();
        let mut connection = Connection::new(addr, self.client_id, &self.config.net, now);
        connection.peer_mut().initiate_connect()?;

        log::info!("connecting to {} as {:#x}", addr, self.client_id);
        self.connection = Some(connection);
        self.handshake = Some(Handshake {
            started: now,
            last_request: None,
        });
        self.slot = None;
        self.stopped = false;
        Ok(())
    }

    /// `host:port`, or a bare host on the default port.
    pub fn connect_to(&mut self, server: &str) -> Result<()> {
        let addr = parse_address(server)?;
        self.connect(addr)
    }

    pub fn state(&self) -> PeerState {
        self.connection
            .as_ref()
            .map_or(PeerState::Disconnected, Connection::state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == PeerState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == PeerState::Connecting
    }

    pub fn has_failed(&self) -> bool {
        self.state() == PeerState::Failed
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.connection.as_ref().and_then(|c| c.peer().failure())
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Slot the server assigned on accept.
    pub fn slot(&self) -> Option<ClientSlot> {
        self.slot
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().map(|c| c.addr)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn time(&self) -> f64 {
        self.clock.now()
    }

    pub fn catalog(&self) -> &Arc<MessageCatalog> {
        &self.catalog
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ClientEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn create_message(&self, type_id: MessageType) -> Result<Message> {
        self.catalog.create(type_id)
    }

    pub fn send_message(&mut self, message: &Message) -> Result<()> {
        let connection = self.connection.as_mut().ok_or(NetError::NotConnected)?;
        connection.send_message(&self.catalog, message)
    }

    /// Telemetry for the server link as of the last tick. A link that was
    /// never established has none.
    pub fn snapshot(&self) -> Result<TelemetryRecord> {
        self.connection
            .as_ref()
            .filter(|c| c.session_start().is_some())
            .map(Connection::telemetry)
            .ok_or(NetError::UnknownPeer)
    }

    /// One fixed step. Does nothing unless a connection is in progress or
    /// established.
    pub fn tick<H: MessageHandler + ?Sized>(&mut self, handler: &mut H) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        let active = self
            .connection
            .as_ref()
            .is_some_and(|c| matches!(c.state(), PeerState::Connecting | PeerState::Connected));
        if !active {
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
        self.update_connection(now)
    }

    /// A failed send is logged and left to the handshake or keep-alive
    /// timeout.
    fn send_packets(&mut self) {
        let now = self.clock.now();
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        match connection.state() {
            PeerState::Connecting => {
                let Some(handshake) = self.handshake.as_mut() else {
                    return;
                };
                let due = handshake
                    .last_request
                    .is_none_or(|sent| now - sent >= self.config.net.connection_request_interval);
                if due {
                    handshake.last_request = Some(now);
                    let request = PacketType::ConnectionRequest {
                        client_id: self.client_id,
                        key: self.config.net.private_key,
                    };
                    if let Err(e) = self.endpoint.send_control(request, connection.addr) {
                        log::warn!("connection request to {} failed: {}", connection.addr, e);
                    }
                }
            }
            PeerState::Connected => {
                if let Some(packet) = connection.poll_outgoing(now, self.config.net.keepalive_interval)
                {
                    match self.endpoint.send_to(&packet, connection.addr) {
                        Ok(size) => connection.on_packet_sent(packet.header.sequence, size, now),
                        Err(e) => {
                            log::warn!("send to {} failed: {}", connection.addr, e);
                            connection.on_send_failed(now);
                        }
                    }
                }
            }
            PeerState::Disconnected | PeerState::Failed => {}
        }
    }

    fn handle_datagram<H: MessageHandler + ?Sized>(
        &mut self,
        datagram: Datagram,
        handler: &mut H,
    ) -> Result<()> {
        let Datagram { packet, addr, size } = datagram;
        let now = self.clock.now();

        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };
        if addr != connection.addr {
            log::debug!("ignoring packet from {}, not our server", addr);
            return Ok(());
        }

        match packet.payload {
            PacketType::ConnectionAccepted { client_slot } => {
                if connection.state() != PeerState::Connecting {
                    return Ok(());
                }
                connection.peer_mut().handshake_succeeded()?;
                connection.mark_connected(now);

                let slot = client_slot as ClientSlot;
                self.handshake = None;
                self.slot = Some(slot);
                log::info!("connected to {} in slot {}", addr, slot);
                self.pending_events.push_back(ClientEvent::Connected { slot });
            }
            PacketType::ConnectionDenied { reason } => {
                if connection.state() != PeerState::Connecting {
                    return Ok(());
                }
                log::warn!("connection to {} denied: {}", addr, reason);
                let reason = FailureReason::HandshakeRejected(reason);
                connection.peer_mut().fail(reason.clone())?;
                self.handshake = None;
                self.pending_events
                    .push_back(ClientEvent::ConnectionFailed { reason });
            }
            PacketType::Disconnect => {
                if connection.state() != PeerState::Connected {
                    return Ok(());
                }
                connection.peer_mut().apply(PeerEvent::RemoteDisconnect)?;
                connection.mark_disconnected();
                log::info!("server {} closed the connection", addr);
                self.pending_events.push_back(ClientEvent::Disconnected {
                    reason: DisconnectReason::Graceful,
                });
            }
            PacketType::KeepAlive | PacketType::Payload { .. } => {
                if connection.state() != PeerState::Connected {
                    return Ok(());
                }
                if let Some(PacketType::Payload { messages }) =
                    connection.process_packet(packet, size, now)
                {
                    connection.receive_frames(messages);
                }
                super::dispatch(&self.catalog, connection, PeerHandle::Server, handler);
            }
            PacketType::ConnectionRequest { .. } => {
                log::debug!("ignoring server-bound packet from {}", addr);
            }
        }

        Ok(())
    }

    fn update_connection(&mut self, now: f64) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };

        match connection.state() {
            PeerState::Connecting => {
                let started = self.handshake.map_or(now, |h| h.started);
                if now - started >= self.config.net.connect_timeout {
                    log::warn!("connection to {} timed out", connection.addr);
                    connection.peer_mut().fail(FailureReason::HandshakeTimeout)?;
                    self.handshake = None;
                    self.pending_events.push_back(ClientEvent::ConnectionFailed {
                        reason: FailureReason::HandshakeTimeout,
                    });
                }
            }
            PeerState::Connected => {
                connection.advance_time(now);
                if connection.is_timed_out(now, self.config.net.timeout) {
                    log::warn!("server {} timed out", connection.addr);
                    connection.peer_mut().apply(PeerEvent::TimedOut)?;
                    connection.mark_disconnected();
                    self.pending_events.push_back(ClientEvent::Disconnected {
                        reason: DisconnectReason::Timeout,
                    });
                }
            }
            PeerState::Disconnected | PeerState::Failed => {}
        }

        Ok(())
    }

    fn close(&mut self, reason: DisconnectReason) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let was_connected = connection.is_connected();
        if !connection.peer_mut().disconnect() {
            return;
        }
        self.handshake = None;
        connection.mark_disconnected();

        if was_connected {
            let addr = connection.addr;
            for _ in 0..self.config.net.disconnect_packets {
                if let Err(e) = self.endpoint.send_control(PacketType::Disconnect, addr) {
                    log::warn!("failed to send disconnect to {}: {}", addr, e);
                    break;
                }
            }
            log::info!("disconnected from {}", addr);
            self.pending_events
                .push_back(ClientEvent::Disconnected { reason });
        }
    }

    /// Leaves the current connection or abandons an attempt in flight.
    /// Calling it again does nothing.
    pub fn disconnect(&mut self) {
        self.close(DisconnectReason::Graceful);
    }

    /// Disconnects and stops ticking until the next `connect`.
    pub fn stop(&mut self) {
        self.close(DisconnectReason::Stopped);
        self.stopped = true;
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close(DisconnectReason::Stopped);
    }
}
