pub mod catalog;
pub mod config;
pub mod error;
pub mod net;
pub mod peer;
pub mod session;
pub mod telemetry;

pub use catalog::{
    BitReader, BitWriter, CatalogBuilder, INTERACT_MESSAGE, InteractMessage, Message,
    MessageCatalog, MessageCodec, MessageType, TEST_MESSAGE, TestMessage, payload_bits,
};
pub use config::{ClientConfig, ClientServerConfig, ServerConfig};
pub use error::{NetError, Result};
pub use net::{
    ChannelKind, ConditionedTransport, DEFAULT_PORT, KEY_BYTES, MAX_PACKET_SIZE, NetworkStats,
    PROTOCOL_ID, PacketLossSimulation, Transport, UdpTransport, parse_address,
};
pub use peer::{FailureReason, PeerEvent, PeerState, PeerStateMachine};
pub use session::{
    Client, ClientEvent, ClientSlot, DisconnectReason, FixedTimestep, FrameStats, MessageHandler,
    NullHandler, PeerHandle, SendThrottle, Server, ServerEvent, SimClock, TestTraffic,
};
pub use telemetry::TelemetryRecord;
