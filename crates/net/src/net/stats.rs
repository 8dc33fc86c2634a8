/// Per-connection counters plus smoothed rates. Rates are per second of the
/// owner's simulation clock.
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_acked: u64,
    pub packets_lost: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub bytes_acked: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
    pub packet_loss_percent: f32,
    pub sent_kbps: f32,
    pub received_kbps: f32,
    pub acked_kbps: f32,
    interval: IntervalCounters,
    last_update: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct IntervalCounters {
    bytes_sent: u64,
    bytes_received: u64,
    bytes_acked: u64,
    packets_acked: u64,
    packets_lost: u64,
}

fn kbps(bytes: u64, seconds: f64) -> f32 {
    (bytes as f64 * 8.0 / 1000.0 / seconds) as f32
}

fn smooth(current: &mut f32, sample: f32, factor: f32) {
    *current += (sample - *current) * factor;
}

impl NetworkStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
        self.interval.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
        self.interval.bytes_received += bytes as u64;
    }

    pub fn record_acked(&mut self, bytes: usize) {
        self.packets_acked += 1;
        self.bytes_acked += bytes as u64;
        self.interval.bytes_acked += bytes as u64;
        self.interval.packets_acked += 1;
    }

    pub fn record_lost(&mut self, count: u64) {
        self.packets_lost += count;
        self.interval.packets_lost += count;
    }

    /// Folds the counters gathered since the previous update into the
    /// smoothed rates.
    pub fn update(&mut self, now: f64, rtt_ms: f32, rtt_variance: f32, smoothing: f32) {
        self.rtt_ms = rtt_ms;
        self.rtt_variance = rtt_variance;

        let Some(last) = self.last_update.replace(now) else {
            self.interval = IntervalCounters::default();
            return;
        };
        let elapsed = now - last;
        if elapsed <= 0.0 {
            return;
        }

        let interval = std::mem::take(&mut self.interval);
        smooth(&mut self.sent_kbps, kbps(interval.bytes_sent, elapsed), smoothing);
        smooth(
            &mut self.received_kbps,
            kbps(interval.bytes_received, elapsed),
            smoothing,
        );
        smooth(&mut self.acked_kbps, kbps(interval.bytes_acked, elapsed), smoothing);

        let resolved = interval.packets_acked + interval.packets_lost;
        if resolved > 0 {
            let loss = interval.packets_lost as f32 / resolved as f32 * 100.0;
            smooth(&mut self.packet_loss_percent, loss, smoothing);
        }
        self.packet_loss_percent = self.packet_loss_percent.clamp(0.0, 100.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_follow_traffic() {
        let mut stats = NetworkStats::default();
        stats.update(0.0, 0.0, 0.0, 1.0);

        stats.record_sent(125);
        stats.record_received(250);
        stats.record_acked(125);
        stats.update(0.01, 20.0, 1.0, 1.0);

        // 125 bytes in 10ms is 100 kbps
        assert!((stats.sent_kbps - 100.0).abs() < 0.01);
        assert!((stats.received_kbps - 200.0).abs() < 0.01);
        assert!((stats.acked_kbps - 100.0).abs() < 0.01);
        assert_eq!(stats.rtt_ms, 20.0);
        assert_eq!(stats.packets_sent, 1);
    }

    #[test]
    fn loss_is_a_percentage() {
        let mut stats = NetworkStats::default();
        stats.update(0.0, 0.0, 0.0, 1.0);

        stats.record_acked(10);
        stats.record_lost(3);
        stats.update(0.01, 0.0, 0.0, 1.0);
        assert!((stats.packet_loss_percent - 75.0).abs() < 0.01);

        stats.update(0.02, 0.0, 0.0, 1.0);
        assert!((stats.packet_loss_percent - 75.0).abs() < 0.01);
    }

    #[test]
    fn smoothing_moves_partially() {
        let mut stats = NetworkStats::default();
        stats.update(0.0, 0.0, 0.0, 0.1);
        stats.record_sent(125);
        stats.update(0.01, 0.0, 0.0, 0.1);
        assert!((stats.sent_kbps - 10.0).abs() < 0.01);
    }
}
