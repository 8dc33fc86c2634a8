use clap::Parser;
use raynet::{ClientConfig, ClientServerConfig, PacketLossSimulation, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "raynet-demo")]
#[command(about = "Runs a local server and client side by side")]
pub struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    pub bind: String,

    #[arg(short, long, default_value_t = raynet::DEFAULT_PORT)]
    pub port: u16,

    #[arg(short, long, default_value_t = 10.0, help = "Simulated seconds to run")]
    pub seconds: f64,

    #[arg(long, help = "Stop after this many frames instead")]
    pub frames: Option<u64>,

    #[arg(long, help = "Cap on synthetic test messages")]
    pub max_messages: Option<u16>,

    #[arg(long, default_value_t = 0.2, help = "Simulated seconds between test messages")]
    pub send_interval: f64,

    #[arg(long, default_value_t = 1.0, help = "Simulated seconds between telemetry lines")]
    pub report_interval: f64,

    #[arg(long, help = "Pace ticks against the wall clock")]
    pub realtime: bool,

    #[arg(long, default_value_t = 64)]
    pub max_clients: usize,

    #[arg(long, help = "Enable packet loss simulation on both sides")]
    pub simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    pub loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    pub min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    pub max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    pub jitter: u32,
}

impl Args {
    fn host(&self) -> String {
        if self.bind.contains(':') && !self.bind.starts_with('[') {
            format!("[{}]", self.bind)
        } else {
            self.bind.clone()
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host(), self.port)
    }

    fn link_conditions(&self) -> Option<PacketLossSimulation> {
        self.simulate_packet_loss.then(|| PacketLossSimulation {
            enabled: true,
            loss_percent: self.loss_percent.clamp(0.0, 100.0),
            min_latency_ms: self.min_latency,
            max_latency_ms: self.max_latency.max(self.min_latency),
            jitter_ms: self.jitter,
        })
    }

    fn net(&self) -> ClientServerConfig {
        ClientServerConfig {
            link_conditions: self.link_conditions(),
            ..Default::default()
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            net: self.net(),
            max_clients: self.max_clients,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            net: ClientServerConfig {
                link_seed: self.net().link_seed.wrapping_add(1),
                ..self.net()
            },
            bind_addr: format!("{}:0", self.host()),
            send_interval: self.send_interval,
        }
    }
}
