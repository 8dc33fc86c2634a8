use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_ID: u64 = 0x0011_2233_4455_6677;
pub const DEFAULT_PORT: u16 = 40000;
pub const KEY_BYTES: usize = 32;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub protocol_id: u64,
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
}

impl PacketHeader {
    pub fn new(protocol_id: u64, sequence: u32, ack: u32, ack_bitfield: u32) -> Self {
        Self {
            protocol_id,
            sequence,
            ack,
            ack_bitfield,
        }
    }

    pub fn is_valid(&self, protocol_id: u64) -> bool {
        self.protocol_id == protocol_id
    }
}

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum PacketType {
    /// Insecure connect: the key is compared, never used for encryption.
    ConnectionRequest {
        client_id: u64,
        key: [u8; KEY_BYTES],
    },
    ConnectionAccepted {
        client_slot: u32,
    },
    ConnectionDenied {
        reason: String,
    },
    KeepAlive,
    Payload {
        messages: Vec<MessageFrame>,
    },
    Disconnect,
}

/// One encoded message inside a payload packet.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct MessageFrame {
    pub channel: u8,
    pub message_id: u16,
    pub message_type: u16,
    pub data: Vec<u8>,
}

impl MessageFrame {
    /// Per-frame framing cost on top of the encoded message.
    pub const OVERHEAD: usize = 16;

    /// Rough wire cost, used to budget packets under the MTU.
    pub fn wire_size(&self) -> usize {
        Self::OVERHEAD + self.data.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: PacketType,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("packet of {0} bytes exceeds MTU")]
    TooLarge(usize),
}

impl Packet {
    pub fn new(header: PacketHeader, payload: PacketType) -> Self {
        Self { header, payload }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let data = rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)?;

        if data.len() > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge(data.len()));
        }
        Ok(data)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        // Receive buffers carry no alignment guarantee.
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(PacketError::Deserialize)
    }
}
