mod config;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use config::Args;
use raynet::{
    Client, ClientEvent, FixedTimestep, FrameStats, Message, MessageCatalog, NullHandler,
    PeerHandle, SendThrottle, Server, ServerEvent, TelemetryRecord, TestTraffic,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let catalog = Arc::new(MessageCatalog::standard());

    let server_addr = args.server_addr();
    let mut server = Server::start(&server_addr, args.server_config(), Arc::clone(&catalog))
        .with_context(|| format!("failed to start server on {}", server_addr))?;

    let client_config = args.client_config();
    let send_interval = client_config.send_interval;
    let mut client = Client::start(client_config, Arc::clone(&catalog))
        .context("failed to start client")?;
    client.connect(reachable(server.local_addr()))?;

    let mut traffic = TestTraffic::new(send_interval, args.max_messages);
    let mut report = SendThrottle::new(args.report_interval);
    let mut timestep = FixedTimestep::new(args.server_config().net.tick_delta);
    let mut frame = FrameStats::default();
    let mut received = 0u64;

    let start = client.time();
    let mut last_frame = Instant::now();

    loop {
        let frame_dt = if args.realtime {
            let now = Instant::now();
            let dt = now.duration_since(last_frame).as_secs_f64();
            last_frame = now;
            dt
        } else {
            timestep.dt()
        };

        for _ in 0..frame.begin_frame(&mut timestep, frame_dt) {
            if client.is_connected() {
                if let Some(message) = traffic.poll(client.time()) {
                    client.send_message(&message)?;
                }
            }

            client.tick(&mut NullHandler)?;
            server.tick(&mut |from: PeerHandle, message: &Message| {
                received += 1;
                log::debug!("{:?} -> {:?}", from, message);
            })?;
        }

        for event in server.drain_events() {
            log_server_event(&event);
        }
        for event in client.drain_events() {
            log_client_event(&event);
        }

        if let Some(reason) = client.failure() {
            return Err(anyhow::Error::new(reason.to_error()).context("connection failed"));
        }

        if report.try_acquire(client.time()) {
            if let Ok(record) = client.snapshot() {
                log_telemetry("client", &record);
            }
            for (slot, addr, _) in server.connections() {
                if let Ok(record) = server.snapshot(slot) {
                    log_telemetry(&format!("server[{} {}]", slot, addr), &record);
                }
            }
            log::debug!(
                "frame {}: accumulator {:.4}, dt {:.4}",
                frame.tick,
                frame.tick_accumulator,
                frame.frame_dt
            );
        }

        let done = match args.frames {
            Some(frames) => frame.tick >= frames,
            None => client.time() - start >= args.seconds,
        };
        if done {
            break;
        }

        if args.realtime {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    log::info!(
        "sent {} test messages, server handled {}",
        traffic.sent(),
        received
    );

    client.stop();
    server.stop();
    for event in server.drain_events() {
        log_server_event(&event);
    }
    for event in client.drain_events() {
        log_client_event(&event);
    }

    Ok(())
}

/// Wildcard binds are not a destination; talk to loopback instead.
fn reachable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

fn log_server_event(event: &ServerEvent) {
    match event {
        ServerEvent::ClientConnected {
            slot,
            addr,
            client_id,
        } => log::info!("server: client {:#x} connected from {} (slot {})", client_id, addr, slot),
        ServerEvent::ClientDisconnected { slot, reason } => {
            log::info!("server: slot {} {}", slot, reason.as_str())
        }
        ServerEvent::ConnectionDenied { addr, reason } => {
            log::warn!("server: denied {}: {}", addr, reason)
        }
    }
}

fn log_client_event(event: &ClientEvent) {
    match event {
        ClientEvent::Connected { slot } => log::info!("client: connected in slot {}", slot),
        ClientEvent::Disconnected { reason } => log::info!("client: {}", reason.as_str()),
        ClientEvent::ConnectionFailed { reason } => {
            log::warn!("client: connection failed: {}", reason.to_error())
        }
    }
}

fn log_telemetry(label: &str, record: &TelemetryRecord) {
    log::info!(
        "{}: rtt {:.1}ms loss {:.1}% sent {:.1}kbps recv {:.1}kbps acked {:.1}kbps packets {}/{}/{}",
        label,
        record.rtt_ms,
        record.packet_loss_percent,
        record.sent_kbps,
        record.received_kbps,
        record.acked_kbps,
        record.packets_sent,
        record.packets_received,
        record.packets_acked,
    );
}
