use std::collections::HashMap;
use std::net::SocketAddr;

use super::channel::{ChannelKind, ReceivedMessage, ReliableOrderedChannel, UnreliableChannel};
use super::protocol::{MAX_PACKET_SIZE, MessageFrame, Packet, PacketHeader, PacketType};
use super::stats::NetworkStats;
use super::tracking::{AckTracker, ReceiveTracker};
use crate::catalog::{Message, MessageCatalog, MessageType};
use crate::config::ClientServerConfig;
use crate::error::{NetError, Result};
use crate::peer::{PeerState, PeerStateMachine};
use crate::telemetry::TelemetryRecord;

/// Room left in a payload packet after the header and framing overhead.
const PAYLOAD_BUDGET: usize = MAX_PACKET_SIZE - 128;

/// One remote peer: lifecycle, sequencing, acks, channels and counters.
/// Times are on the owning side's simulation clock.
#[derive(Debug)]
pub struct Connection {
    pub addr: SocketAddr,
    pub client_id: u64,
    peer: PeerStateMachine,
    protocol_id: u64,
    session_start: Option<f64>,
    time: f64,
    last_receive_time: f64,
    last_send_time: Option<f64>,
    send_sequence: u32,
    ack_tracker: AckTracker,
    receive_tracker: ReceiveTracker,
    reliable: ReliableOrderedChannel,
    unreliable: UnreliableChannel,
    in_flight_messages: HashMap<u32, Vec<u16>>,
    stats: NetworkStats,
    telemetry: TelemetryRecord,
    loss_window: f64,
    smoothing: f32,
}

impl Connection {
    pub fn new(addr: SocketAddr, client_id: u64, config: &ClientServerConfig, now: f64) -> Self {
        Self {
            addr,
            client_id,
            peer: PeerStateMachine::new(),
            protocol_id: config.protocol_id,
            session_start: None,
            time: now,
            last_receive_time: now,
            last_send_time: None,
            send_sequence: 0,
            ack_tracker: AckTracker::new(config.ack_window),
            receive_tracker: ReceiveTracker::new(),
            reliable: ReliableOrderedChannel::new(
                config.message_send_queue_size,
                config.message_resend_time,
            ),
            unreliable: UnreliableChannel::new(config.message_send_queue_size),
            in_flight_messages: HashMap::new(),
            stats: NetworkStats::default(),
            telemetry: TelemetryRecord::default(),
            loss_window: config.loss_window,
            smoothing: config.bandwidth_smoothing_factor,
        }
    }

    pub fn peer(&self) -> &PeerStateMachine {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut PeerStateMachine {
        &mut self.peer
    }

    pub fn state(&self) -> PeerState {
        self.peer.state()
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_connected()
    }

    /// Marks the start of the session once the handshake completes.
    pub fn mark_connected(&mut self, now: f64) {
        self.session_start = Some(now);
        self.last_receive_time = now;
        self.telemetry.connected = true;
    }

    /// Keeps the last record readable but flags it as no longer live.
    pub fn mark_disconnected(&mut self) {
        self.telemetry.connected = false;
    }

    pub fn session_start(&self) -> Option<f64> {
        self.session_start
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn telemetry(&self) -> TelemetryRecord {
        self.telemetry
    }

    /// Encodes `message` and queues it on the channel its type is registered on.
    pub fn send_message(&mut self, catalog: &MessageCatalog, message: &Message) -> Result<()> {
        if !self.peer.is_connected() {
            return Err(NetError::NotConnected);
        }

        let message_type = message.type_id();
        let channel = catalog.channel_for(message_type)?;
        let data = catalog.encode(message)?;
        self.queue_encoded(channel, message_type, data)
    }

    /// Messages are never split across packets. One that cannot fit a
    /// payload packet on its own is refused.
    fn queue_encoded(
        &mut self,
        channel: ChannelKind,
        message_type: MessageType,
        data: Vec<u8>,
    ) -> Result<()> {
        if MessageFrame::OVERHEAD + data.len() > PAYLOAD_BUDGET {
            return Err(NetError::MessageTooLarge(data.len()));
        }

        match channel {
            ChannelKind::ReliableOrdered => self.reliable.enqueue(message_type, data),
            ChannelKind::UnreliableUnordered => self.unreliable.enqueue(message_type, data),
        }
    }

    fn next_packet(&mut self, payload: PacketType) -> Packet {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);

        let (ack, ack_bitfield) = self.receive_tracker.ack_data();
        let header = PacketHeader::new(self.protocol_id, sequence, ack, ack_bitfield);

        Packet::new(header, payload)
    }

    /// Next outgoing packet for this tick: queued messages if any are due,
    /// otherwise a keep-alive once `keepalive_interval` has passed since the
    /// last send.
    pub fn poll_outgoing(&mut self, now: f64, keepalive_interval: f64) -> Option<Packet> {
        let mut budget = PAYLOAD_BUDGET;
        let mut frames: Vec<MessageFrame> = self.reliable.collect_frames(now, &mut budget);
        let reliable_ids: Vec<u16> = frames.iter().map(|f| f.message_id).collect();
        frames.extend(self.unreliable.collect_frames(&mut budget));

        if !frames.is_empty() {
            let packet = self.next_packet(PacketType::Payload { messages: frames });
            if !reliable_ids.is_empty() {
                self.in_flight_messages
                    .insert(packet.header.sequence, reliable_ids);
            }
            return Some(packet);
        }

        let idle = self
            .last_send_time
            .is_none_or(|sent| now - sent >= keepalive_interval);
        idle.then(|| self.next_packet(PacketType::KeepAlive))
    }

    pub fn on_packet_sent(&mut self, sequence: u32, bytes: usize, now: f64) {
        self.ack_tracker.track_packet(sequence, bytes, now);
        self.stats.record_sent(bytes);
        self.last_send_time = Some(now);
    }

    /// The packet never left. Its sequence number is spent and its reliable
    /// messages resend on the channel timer; the keep-alive cadence carries
    /// on as if it had been sent.
    pub fn on_send_failed(&mut self, now: f64) {
        self.last_send_time = Some(now);
    }

    /// Runs a sequenced packet through duplicate filtering and ack
    /// processing. Returns the payload, or `None` for a duplicate.
    pub fn process_packet(&mut self, packet: Packet, size: usize, now: f64) -> Option<PacketType> {
        if !self.receive_tracker.record_received(packet.header.sequence) {
            return None;
        }

        self.stats.record_received(size);
        self.last_receive_time = now;

        let acked = self
            .ack_tracker
            .process_ack(packet.header.ack, packet.header.ack_bitfield, now);
        for acked_packet in acked {
            self.stats.record_acked(acked_packet.bytes);
            if let Some(ids) = self.in_flight_messages.remove(&acked_packet.sequence) {
                self.reliable.on_acked(&ids);
            }
        }

        Some(packet.payload)
    }

    /// Any packet from the peer proves it is alive, sequenced or not.
    pub fn touch(&mut self, now: f64) {
        self.last_receive_time = now;
    }

    pub fn receive_frames(&mut self, frames: Vec<MessageFrame>) {
        for frame in frames {
            match ChannelKind::from_index(frame.channel) {
                Some(ChannelKind::ReliableOrdered) => self.reliable.receive(frame),
                Some(ChannelKind::UnreliableUnordered) => self.unreliable.receive(frame),
                None => log::debug!("{}: frame on unknown channel {}", self.addr, frame.channel),
            }
        }
    }

    /// Messages ready for dispatch, reliable channel first.
    pub fn drain_received(&mut self) -> Vec<ReceivedMessage> {
        let mut messages = self.reliable.drain_ready();
        messages.extend(self.unreliable.drain_ready());
        messages
    }

    pub fn is_timed_out(&self, now: f64, timeout: f64) -> bool {
        now - self.last_receive_time > timeout
    }

    /// Pushes the new clock value: expires lost packets and refreshes the
    /// telemetry record.
    pub fn advance_time(&mut self, now: f64) {
        self.time = now;

        self.ack_tracker.expire(now, self.loss_window);
        let lost = self.ack_tracker.take_lost();
        if lost > 0 {
            self.stats.record_lost(lost);
        }
        // Packets that can no longer be acked; their messages resend on the
        // channel's own timer.
        let tracker = &self.ack_tracker;
        self.in_flight_messages
            .retain(|&seq, _| tracker.is_pending(seq));

        self.stats.update(
            now,
            self.ack_tracker.srtt(),
            self.ack_tracker.rtt_var(),
            self.smoothing,
        );
        self.telemetry = TelemetryRecord::from_stats(&self.stats, self.peer.is_connected());
    }

    /// Reliable messages still waiting for an ack.
    pub fn unacked_messages(&self) -> usize {
        self.reliable.unacked_count()
    }
}

/// Fixed set of server-side client slots. A slot that disconnects keeps its
/// last telemetry record until the slot is reused.
#[derive(Debug)]
pub struct ConnectionManager {
    slots: Vec<Option<Connection>>,
    last_telemetry: Vec<Option<TelemetryRecord>>,
    clients_by_addr: HashMap<SocketAddr, usize>,
    clients_by_id: HashMap<u64, usize>,
}

impl ConnectionManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            slots: (0..max_clients).map(|_| None).collect(),
            last_telemetry: vec![None; max_clients],
            clients_by_addr: HashMap::new(),
            clients_by_id: HashMap::new(),
        }
    }

    pub fn max_clients(&self) -> usize {
        self.slots.len()
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn slot_for_addr(&self, addr: &SocketAddr) -> Option<usize> {
        self.clients_by_addr.get(addr).copied()
    }

    pub fn slot_for_client_id(&self, client_id: u64) -> Option<usize> {
        self.clients_by_id.get(&client_id).copied()
    }

    /// Places `connection` in `slot`. The slot must be free and neither the
    /// address nor the client id may already be tracked.
    pub fn insert(&mut self, slot: usize, connection: Connection) -> bool {
        let free = self.slots.get(slot).is_some_and(Option::is_none);
        if !free
            || self.clients_by_addr.contains_key(&connection.addr)
            || self.clients_by_id.contains_key(&connection.client_id)
        {
            return false;
        }

        self.clients_by_addr.insert(connection.addr, slot);
        self.clients_by_id.insert(connection.client_id, slot);
        self.last_telemetry[slot] = None;
        self.slots[slot] = Some(connection);
        true
    }

    pub fn get(&self, slot: usize) -> Option<&Connection> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Connection> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, slot: usize) -> Option<Connection> {
        let connection = self.slots.get_mut(slot)?.take()?;
        self.clients_by_addr.remove(&connection.addr);
        self.clients_by_id.remove(&connection.client_id);

        let mut record = connection.telemetry();
        record.connected = false;
        self.last_telemetry[slot] = Some(record);
        Some(connection)
    }

    /// Drops every connection and every retained record.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.last_telemetry.iter_mut().for_each(|t| *t = None);
        self.clients_by_addr.clear();
        self.clients_by_id.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Connection)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, c)| c.as_ref().map(|c| (slot, c)))
    }

    pub fn occupied_slots(&self) -> Vec<usize> {
        self.iter().map(|(slot, _)| slot).collect()
    }

    pub fn connected_count(&self) -> usize {
        self.iter().filter(|(_, c)| c.is_connected()).count()
    }

    pub fn telemetry(&self, slot: usize) -> Result<TelemetryRecord> {
        if let Some(connection) = self.get(slot) {
            return Ok(connection.telemetry());
        }
        self.last_telemetry
            .get(slot)
            .copied()
            .flatten()
            .ok_or(NetError::UnknownPeer)
    }
}
