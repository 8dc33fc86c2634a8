use std::net::SocketAddr;

use super::protocol::{MAX_PACKET_SIZE, Packet, PacketHeader, PacketType};
use super::simulator::ConditionedTransport;
use super::transport::{Transport, UdpTransport};
use crate::config::ClientServerConfig;
use crate::error::{NetError, Result};

/// A received packet together with its sender and on-wire size.
#[derive(Debug)]
pub struct Datagram {
    pub packet: Packet,
    pub addr: SocketAddr,
    pub size: usize,
}

/// Packet framing over a transport: serialization, MTU checks and
/// protocol id filtering.
pub struct NetworkEndpoint {
    transport: Box<dyn Transport>,
    protocol_id: u64,
    recv_buffer: [u8; MAX_PACKET_SIZE],
    datagrams_rejected: u64,
}

impl NetworkEndpoint {
    pub fn new(transport: Box<dyn Transport>, protocol_id: u64) -> Self {
        Self {
            transport,
            protocol_id,
            recv_buffer: [0u8; MAX_PACKET_SIZE],
            datagrams_rejected: 0,
        }
    }

    /// Binds a UDP socket, wrapped in a link conditioner when the config
    /// asks for one. Bind failures come back as [`NetError::Bind`].
    pub fn bind(addr: SocketAddr, config: &ClientServerConfig) -> Result<Self> {
        let udp = UdpTransport::bind(addr).map_err(NetError::Bind)?;

        let transport: Box<dyn Transport> = match &config.link_conditions {
            Some(sim) if sim.enabled => {
                log::info!("link conditioner active on {}: {:?}", udp.local_addr(), sim);
                Box::new(ConditionedTransport::new(udp, sim.clone(), config.link_seed))
            }
            _ => Box::new(udp),
        };

        Ok(Self::new(transport, config.protocol_id))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn protocol_id(&self) -> u64 {
        self.protocol_id
    }

    pub fn datagrams_rejected(&self) -> u64 {
        self.datagrams_rejected
    }

    /// Header for packets outside any connection's sequence space.
    pub fn control_header(&self) -> PacketHeader {
        PacketHeader::new(self.protocol_id, 0, 0, 0)
    }

    pub fn send_control(&mut self, payload: PacketType, addr: SocketAddr) -> Result<usize> {
        let packet = Packet::new(self.control_header(), payload);
        self.send_to(&packet, addr)
    }

    pub fn send_to(&mut self, packet: &Packet, addr: SocketAddr) -> Result<usize> {
        let data = packet.serialize()?;
        Ok(self.transport.send_to(&data, addr)?)
    }

    /// Drains every datagram currently available. Undecodable datagrams and
    /// datagrams with a foreign protocol id are dropped.
    pub fn receive(&mut self) -> Result<Vec<Datagram>> {
        let mut datagrams = Vec::new();

        while let Some((size, addr)) = self.transport.recv_from(&mut self.recv_buffer)? {
            match Packet::deserialize(&self.recv_buffer[..size]) {
                Ok(packet) if packet.header.is_valid(self.protocol_id) => {
                    datagrams.push(Datagram { packet, addr, size });
                }
                Ok(packet) => {
                    self.datagrams_rejected += 1;
                    log::debug!(
                        "dropping datagram from {} with protocol id {:#x}",
                        addr,
                        packet.header.protocol_id
                    );
                }
                Err(e) => {
                    self.datagrams_rejected += 1;
                    log::debug!("dropping undecodable datagram from {}: {}", addr, e);
                }
            }
        }

        Ok(datagrams)
    }

    pub fn advance_time(&mut self, time: f64) {
        self.transport.advance_time(time);
    }
}
