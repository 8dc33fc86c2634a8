mod channel;
mod connection;
mod endpoint;
mod protocol;
mod simulator;
mod stats;
mod tracking;
mod transport;

pub use channel::{ChannelKind, ReceivedMessage, ReliableOrderedChannel, UnreliableChannel};
pub use connection::{Connection, ConnectionManager};
pub use endpoint::{Datagram, NetworkEndpoint};
pub use protocol::{ArchivedPacket, sequence_greater_than};
pub use protocol::{
    DEFAULT_PORT, KEY_BYTES, MAX_PACKET_SIZE, MessageFrame, PROTOCOL_ID, Packet, PacketError,
    PacketHeader, PacketType,
};
pub use simulator::{ConditionedTransport, PacketLossSimulation};
pub use stats::NetworkStats;
pub use tracking::{AckTracker, AckedPacket, PendingPacket, ReceiveTracker};
pub use transport::{Transport, UdpTransport, parse_address};
