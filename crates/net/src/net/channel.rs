//! Delivery classes for messages.
//!
//! Reliable-ordered messages are resent until the packet carrying them is
//! acked and are handed out in send order exactly once. Unreliable messages
//! go out once and are handed out as they arrive.

use std::collections::{HashMap, VecDeque};

use super::protocol::MessageFrame;
use crate::catalog::MessageType;
use crate::error::{NetError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    ReliableOrdered,
    UnreliableUnordered,
}

impl ChannelKind {
    pub fn index(self) -> u8 {
        match self {
            ChannelKind::ReliableOrdered => 0,
            ChannelKind::UnreliableUnordered => 1,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(ChannelKind::ReliableOrdered),
            1 => Some(ChannelKind::UnreliableUnordered),
            _ => None,
        }
    }
}

/// Encoded message handed up from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_type: MessageType,
    pub data: Vec<u8>,
}

#[inline]
fn message_id_less(a: u16, b: u16) -> bool {
    a != b && b.wrapping_sub(a) < 0x8000
}

#[derive(Debug)]
struct OutgoingMessage {
    id: u16,
    message_type: MessageType,
    data: Vec<u8>,
    last_sent: Option<f64>,
}

#[derive(Debug)]
pub struct ReliableOrderedChannel {
    send_queue: VecDeque<OutgoingMessage>,
    next_send_id: u16,
    receive_buffer: HashMap<u16, ReceivedMessage>,
    next_receive_id: u16,
    capacity: usize,
    resend_interval: f64,
}

impl ReliableOrderedChannel {
    pub fn new(capacity: usize, resend_interval: f64) -> Self {
        Self {
            send_queue: VecDeque::new(),
            next_send_id: 0,
            receive_buffer: HashMap::new(),
            next_receive_id: 0,
            capacity,
            resend_interval,
        }
    }

    pub fn enqueue(&mut self, message_type: MessageType, data: Vec<u8>) -> Result<()> {
        if self.send_queue.len() >= self.capacity {
            return Err(NetError::SendQueueFull);
        }

        let id = self.next_send_id;
        self.next_send_id = self.next_send_id.wrapping_add(1);
        self.send_queue.push_back(OutgoingMessage {
            id,
            message_type,
            data,
            last_sent: None,
        });
        Ok(())
    }

    /// Frames due for (re)sending, oldest first, while they fit in `budget`.
    pub fn collect_frames(&mut self, now: f64, budget: &mut usize) -> Vec<MessageFrame> {
        let mut frames = Vec::new();
        let channel = ChannelKind::ReliableOrdered.index();

        for message in &mut self.send_queue {
            let due = message
                .last_sent
                .is_none_or(|sent| now - sent >= self.resend_interval);
            if !due {
                continue;
            }

            let frame = MessageFrame {
                channel,
                message_id: message.id,
                message_type: message.message_type,
                data: message.data.clone(),
            };
            if frame.wire_size() > *budget {
                break;
            }
            *budget -= frame.wire_size();
            message.last_sent = Some(now);
            frames.push(frame);
        }

        frames
    }

    pub fn on_acked(&mut self, message_ids: &[u16]) {
        self.send_queue.retain(|m| !message_ids.contains(&m.id));
    }

    /// Buffers an incoming frame. Duplicates and frames too far ahead are
    /// dropped.
    pub fn receive(&mut self, frame: MessageFrame) {
        let id = frame.message_id;
        if message_id_less(id, self.next_receive_id) {
            return;
        }
        if usize::from(id.wrapping_sub(self.next_receive_id)) >= self.capacity {
            log::debug!("reliable message {} outside receive window", id);
            return;
        }
        self.receive_buffer.entry(id).or_insert(ReceivedMessage {
            message_type: frame.message_type,
            data: frame.data,
        });
    }

    /// Messages now deliverable in order.
    pub fn drain_ready(&mut self) -> Vec<ReceivedMessage> {
        let mut ready = Vec::new();
        while let Some(message) = self.receive_buffer.remove(&self.next_receive_id) {
            ready.push(message);
            self.next_receive_id = self.next_receive_id.wrapping_add(1);
        }
        ready
    }

    pub fn unacked_count(&self) -> usize {
        self.send_queue.len()
    }
}

#[derive(Debug)]
pub struct UnreliableChannel {
    send_queue: VecDeque<ReceivedMessage>,
    received: Vec<ReceivedMessage>,
    capacity: usize,
}

impl UnreliableChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            send_queue: VecDeque::new(),
            received: Vec::new(),
            capacity,
        }
    }

    pub fn enqueue(&mut self, message_type: MessageType, data: Vec<u8>) -> Result<()> {
        if self.send_queue.len() >= self.capacity {
            return Err(NetError::SendQueueFull);
        }
        self.send_queue.push_back(ReceivedMessage { message_type, data });
        Ok(())
    }

    /// Takes queued messages that fit in `budget`; the rest wait for the
    /// next packet.
    pub fn collect_frames(&mut self, budget: &mut usize) -> Vec<MessageFrame> {
        let mut frames = Vec::new();
        let channel = ChannelKind::UnreliableUnordered.index();

        while let Some(next) = self.send_queue.front() {
            let frame = MessageFrame {
                channel,
                message_id: 0,
                message_type: next.message_type,
                data: next.data.clone(),
            };
            if frame.wire_size() > *budget {
                break;
            }
            *budget -= frame.wire_size();
            self.send_queue.pop_front();
            frames.push(frame);
        }

        frames
    }

    pub fn receive(&mut self, frame: MessageFrame) {
        self.received.push(ReceivedMessage {
            message_type: frame.message_type,
            data: frame.data,
        });
    }

    pub fn drain_ready(&mut self) -> Vec<ReceivedMessage> {
        std::mem::take(&mut self.received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u16, byte: u8) -> MessageFrame {
        MessageFrame {
            channel: 0,
            message_id: id,
            message_type: 0,
            data: vec![byte],
        }
    }

    #[test]
    fn reliable_resends_until_acked() {
        let mut channel = ReliableOrderedChannel::new(16, 0.1);
        channel.enqueue(0, vec![1]).unwrap();

        let mut budget = 1000;
        assert_eq!(channel.collect_frames(0.0, &mut budget).len(), 1);
        assert!(channel.collect_frames(0.05, &mut budget).is_empty());
        assert_eq!(channel.collect_frames(0.1, &mut budget).len(), 1);

        channel.on_acked(&[0]);
        assert!(channel.collect_frames(0.5, &mut budget).is_empty());
        assert_eq!(channel.unacked_count(), 0);
    }

    #[test]
    fn reliable_respects_budget() {
        let mut channel = ReliableOrderedChannel::new(16, 0.1);
        channel.enqueue(0, vec![0; 100]).unwrap();
        channel.enqueue(0, vec![0; 100]).unwrap();

        let mut budget = 150;
        assert_eq!(channel.collect_frames(0.0, &mut budget).len(), 1);
        let mut budget = 150;
        let frames = channel.collect_frames(0.0, &mut budget);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message_id, 1);
    }

    #[test]
    fn reliable_delivers_in_order_once() {
        let mut channel = ReliableOrderedChannel::new(16, 0.1);

        channel.receive(frame(1, 11));
        assert!(channel.drain_ready().is_empty());

        channel.receive(frame(0, 10));
        channel.receive(frame(0, 10));
        let ready: Vec<u8> = channel.drain_ready().iter().map(|m| m.data[0]).collect();
        assert_eq!(ready, vec![10, 11]);

        channel.receive(frame(1, 11));
        assert!(channel.drain_ready().is_empty());
    }

    #[test]
    fn reliable_send_queue_is_bounded() {
        let mut channel = ReliableOrderedChannel::new(2, 0.1);
        channel.enqueue(0, vec![]).unwrap();
        channel.enqueue(0, vec![]).unwrap();
        assert!(matches!(
            channel.enqueue(0, vec![]),
            Err(NetError::SendQueueFull)
        ));
    }

    #[test]
    fn message_ids_wrap() {
        assert!(message_id_less(u16::MAX, 0));
        assert!(!message_id_less(0, u16::MAX));
        assert!(message_id_less(3, 4));
        assert!(!message_id_less(4, 4));
    }

    #[test]
    fn unreliable_sends_once() {
        let mut channel = UnreliableChannel::new(8);
        channel.enqueue(1, vec![1, 2]).unwrap();

        let mut budget = 1000;
        assert_eq!(channel.collect_frames(&mut budget).len(), 1);
        assert!(channel.collect_frames(&mut budget).is_empty());
    }

    #[test]
    fn channel_index_round_trip() {
        for kind in [ChannelKind::ReliableOrdered, ChannelKind::UnreliableUnordered] {
            assert_eq!(ChannelKind::from_index(kind.index()), Some(kind));
        }
        assert_eq!(ChannelKind::from_index(9), None);
    }
}
