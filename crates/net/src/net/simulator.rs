use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::transport::Transport;

/// Link conditions applied to outgoing datagrams. Latencies are in
/// milliseconds of the owner's simulation clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    /// 0..=100
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl PacketLossSimulation {
    pub fn should_drop(&self, rng: &mut impl Rng) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rng.gen_range(0.0..100.0) < self.loss_percent
    }

    pub fn delay_ms(&self, rng: &mut impl Rng) -> u32 {
        if !self.enabled || self.max_latency_ms == 0 {
            return 0;
        }
        let base = self.min_latency_ms;
        let range = self.max_latency_ms.saturating_sub(self.min_latency_ms);
        let jitter = if self.jitter_ms > 0 {
            rng.gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        base + rng.gen_range(0..=range) + jitter
    }
}

#[derive(Debug)]
struct DelayedDatagram {
    release_time: f64,
    order: u64,
    data: Vec<u8>,
    addr: SocketAddr,
}

impl PartialEq for DelayedDatagram {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DelayedDatagram {}

impl PartialOrd for DelayedDatagram {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedDatagram {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_time
            .total_cmp(&self.release_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Wraps a transport and drops or delays outgoing datagrams.
pub struct ConditionedTransport<T> {
    inner: T,
    default: PacketLossSimulation,
    configs: HashMap<SocketAddr, PacketLossSimulation>,
    outbound: BinaryHeap<DelayedDatagram>,
    rng: StdRng,
    time: f64,
    order: u64,
    dropped: u64,
}

impl<T: Transport> ConditionedTransport<T> {
    pub fn new(inner: T, default: PacketLossSimulation, seed: u64) -> Self {
        Self {
            inner,
            default,
            configs: HashMap::new(),
            outbound: BinaryHeap::new(),
            rng: StdRng::seed_from_u64(seed),
            time: 0.0,
            order: 0,
            dropped: 0,
        }
    }

    /// Overrides the default conditions for one destination.
    pub fn set_config(&mut self, addr: SocketAddr, config: PacketLossSimulation) {
        self.configs.insert(addr, config);
    }

    pub fn clear_config(&mut self, addr: &SocketAddr) {
        self.configs.remove(addr);
    }

    fn config_for(&self, addr: &SocketAddr) -> &PacketLossSimulation {
        self.configs.get(addr).unwrap_or(&self.default)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn in_flight(&self) -> usize {
        self.outbound.len()
    }

    fn flush_due(&mut self) -> io::Result<()> {
        while self
            .outbound
            .peek()
            .is_some_and(|d| d.release_time <= self.time)
        {
            if let Some(delayed) = self.outbound.pop() {
                self.inner.send_to(&delayed.data, delayed.addr)?;
            }
        }
        Ok(())
    }
}

impl<T: Transport> Transport for ConditionedTransport<T> {
    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        let config = self.config_for(&addr).clone();
        if config.should_drop(&mut self.rng) {
            self.dropped += 1;
            return Ok(data.len());
        }

        let delay_ms = config.delay_ms(&mut self.rng);
        if delay_ms == 0 {
            return self.inner.send_to(data, addr);
        }

        self.order += 1;
        self.outbound.push(DelayedDatagram {
            release_time: self.time + f64::from(delay_ms) / 1000.0,
            order: self.order,
            data: data.to_vec(),
            addr,
        });
        Ok(data.len())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        self.inner.recv_from(buf)
    }

    fn advance_time(&mut self, time: f64) {
        self.time = time;
        if let Err(e) = self.flush_due() {
            log::warn!("link conditioner failed to release datagram: {}", e);
        }
        self.inner.advance_time(time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<Vec<u8>>,
    }

    impl Transport for Recorder {
        fn local_addr(&self) -> SocketAddr {
            "127.0.0.1:1".parse().unwrap()
        }

        fn send_to(&mut self, data: &[u8], _addr: SocketAddr) -> io::Result<usize> {
            self.sent.push(data.to_vec());
            Ok(data.len())
        }

        fn recv_from(&mut self, _buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
            Ok(None)
        }
    }

    fn dest() -> SocketAddr {
        "127.0.0.1:2".parse().unwrap()
    }

    #[test]
    fn disabled_conditions_pass_through() {
        let mut link = ConditionedTransport::new(Recorder::default(), Default::default(), 1);
        link.send_to(b"a", dest()).unwrap();
        assert_eq!(link.inner.sent.len(), 1);
    }

    #[test]
    fn total_loss_drops_everything() {
        let sim = PacketLossSimulation {
            enabled: true,
            loss_percent: 100.0,
            ..Default::default()
        };
        let mut link = ConditionedTransport::new(Recorder::default(), sim, 1);
        for _ in 0..10 {
            link.send_to(b"a", dest()).unwrap();
        }
        assert!(link.inner.sent.is_empty());
        assert_eq!(link.dropped(), 10);
    }

    #[test]
    fn latency_holds_until_clock_passes() {
        let sim = PacketLossSimulation {
            enabled: true,
            min_latency_ms: 50,
            max_latency_ms: 50,
            ..Default::default()
        };
        let mut link = ConditionedTransport::new(Recorder::default(), sim, 1);
        link.advance_time(1.0);
        link.send_to(b"a", dest()).unwrap();
        link.send_to(b"b", dest()).unwrap();
        assert_eq!(link.in_flight(), 2);

        link.advance_time(1.04);
        assert!(link.inner.sent.is_empty());

        link.advance_time(1.06);
        assert_eq!(link.inner.sent, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn per_address_override() {
        let mut link = ConditionedTransport::new(Recorder::default(), Default::default(), 1);
        link.set_config(
            dest(),
            PacketLossSimulation {
                enabled: true,
                loss_percent: 100.0,
                ..Default::default()
            },
        );
        link.send_to(b"a", dest()).unwrap();
        link.send_to(b"a", "127.0.0.1:3".parse().unwrap()).unwrap();
        assert_eq!(link.inner.sent.len(), 1);

        link.clear_config(&dest());
        link.send_to(b"a", dest()).unwrap();
        assert_eq!(link.inner.sent.len(), 2);
    }
}
