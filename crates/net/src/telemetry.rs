//! Read-only connection quality records for external consumers (debug
//! overlays, logs). Records are refreshed once per tick and never touch the
//! network when read.

use crate::net::NetworkStats;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryRecord {
    pub rtt_ms: f32,
    pub packet_loss_percent: f32,
    pub sent_kbps: f32,
    pub received_kbps: f32,
    pub acked_kbps: f32,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_acked: u64,
    pub connected: bool,
}

impl TelemetryRecord {
    pub fn from_stats(stats: &NetworkStats, connected: bool) -> Self {
        Self {
            rtt_ms: stats.rtt_ms,
            packet_loss_percent: stats.packet_loss_percent,
            sent_kbps: stats.sent_kbps,
            received_kbps: stats.received_kbps,
            acked_kbps: stats.acked_kbps,
            packets_sent: stats.packets_sent,
            packets_received: stats.packets_received,
            packets_acked: stats.packets_acked,
            connected,
        }
    }
}
