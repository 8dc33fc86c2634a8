use super::bits::{BitReader, BitWriter};
use super::{Message, MessageCodec, MessageType};
use crate::error::{NetError, Result};

pub const TEST_MESSAGE: MessageType = 0;
pub const INTERACT_MESSAGE: MessageType = 1;

/// Nominal payload size classes, indexed by `sequence % 21`. Order matters:
/// recorded traces depend on these exact values.
const PAYLOAD_BITS: [u32; 21] = [
    1, 320, 120, 4, 256, 45, 11, 13, 101, 100, 84, 95, 203, 2, 3, 8, 512, 5, 3, 7, 50,
];

/// Synthetic padding carried by a test message with this sequence number.
#[inline]
pub fn payload_bits(sequence: u16) -> u32 {
    PAYLOAD_BITS[sequence as usize % PAYLOAD_BITS.len()]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestMessage {
    pub sequence: u16,
    pub hitpoints: u32,
}

impl TestMessage {
    pub fn new(sequence: u16, hitpoints: u32) -> Self {
        Self {
            sequence,
            hitpoints,
        }
    }

    /// Encoded size in bits, padding included.
    pub fn bit_len(&self) -> u32 {
        16 + 32 + payload_bits(self.sequence)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractMessage {
    pub entity_id: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TestMessageCodec;

impl MessageCodec for TestMessageCodec {
    fn create(&self) -> Message {
        Message::Test(TestMessage::default())
    }

    fn encode(&self, message: &Message, writer: &mut BitWriter) -> Result<()> {
        let Message::Test(msg) = message else {
            return Err(NetError::MalformedMessage("payload does not match codec"));
        };
        writer.write_bits(u32::from(msg.sequence), 16);
        writer.write_bits(msg.hitpoints, 32);
        writer.write_padding(payload_bits(msg.sequence));
        Ok(())
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> Result<Message> {
        let sequence = reader.read_bits(16)? as u16;
        let hitpoints = reader.read_bits(32)?;
        reader.read_padding(payload_bits(sequence))?;
        Ok(Message::Test(TestMessage {
            sequence,
            hitpoints,
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InteractMessageCodec;

impl MessageCodec for InteractMessageCodec {
    fn create(&self) -> Message {
        Message::Interact(InteractMessage::default())
    }

    fn encode(&self, message: &Message, writer: &mut BitWriter) -> Result<()> {
        let Message::Interact(msg) = message else {
            return Err(NetError::MalformedMessage("payload does not match codec"));
        };
        writer.write_bits(msg.entity_id, 32);
        Ok(())
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> Result<Message> {
        let entity_id = reader.read_bits(32)?;
        Ok(Message::Interact(InteractMessage { entity_id }))
    }
}
