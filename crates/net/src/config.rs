use crate::net::{KEY_BYTES, PROTOCOL_ID, PacketLossSimulation};

/// Settings both sides must agree on, plus per-connection tuning. Times are
/// in simulation time units (seconds of the owning side's clock).
#[derive(Debug, Clone)]
pub struct ClientServerConfig {
    pub protocol_id: u64,
    /// Pre-shared key for insecure connect. All zeros means no
    /// authentication at all.
    pub private_key: [u8; KEY_BYTES],
    pub start_time: f64,
    pub tick_delta: f64,
    pub connect_timeout: f64,
    pub connection_request_interval: f64,
    pub timeout: f64,
    pub keepalive_interval: f64,
    pub message_resend_time: f64,
    pub message_send_queue_size: usize,
    pub ack_window: usize,
    pub loss_window: f64,
    pub bandwidth_smoothing_factor: f32,
    pub disconnect_packets: usize,
    pub link_conditions: Option<PacketLossSimulation>,
    pub link_seed: u64,
}

impl Default for ClientServerConfig {
    fn default() -> Self {
        Self {
            protocol_id: PROTOCOL_ID,
            private_key: [0u8; KEY_BYTES],
            start_time: 100.0,
            tick_delta: 0.01,
            connect_timeout: 5.0,
            connection_request_interval: 0.1,
            timeout: 10.0,
            keepalive_interval: 0.1,
            message_resend_time: 0.1,
            message_send_queue_size: 1024,
            ack_window: 256,
            loss_window: 1.0,
            bandwidth_smoothing_factor: 0.1,
            disconnect_packets: 3,
            link_conditions: None,
            link_seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub net: ClientServerConfig,
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            net: ClientServerConfig::default(),
            max_clients: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub net: ClientServerConfig,
    pub bind_addr: String,
    /// Minimum simulation time between two synthetic test messages.
    pub send_interval: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            net: ClientServerConfig::default(),
            bind_addr: "0.0.0.0:0".to_string(),
            send_interval: 0.2,
        }
    }
}
