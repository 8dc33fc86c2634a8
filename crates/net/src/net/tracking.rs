use std::collections::VecDeque;

use super::protocol::sequence_greater_than;

/// Sent packet awaiting acknowledgement. Times are on the sender's
/// simulation clock.
#[derive(Debug, Clone)]
pub struct PendingPacket {
    pub sequence: u32,
    pub send_time: f64,
    pub bytes: usize,
    pub acked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckedPacket {
    pub sequence: u32,
    pub bytes: usize,
}

#[derive(Debug)]
pub struct AckTracker {
    pending: VecDeque<PendingPacket>,
    max_pending: usize,
    srtt: Option<f32>,
    rtt_var: f32,
    lost: u64,
}

impl AckTracker {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending),
            max_pending,
            srtt: None,
            rtt_var: 0.0,
            lost: 0,
        }
    }

    pub fn track_packet(&mut self, sequence: u32, bytes: usize, now: f64) {
        while self.pending.len() >= self.max_pending {
            if let Some(evicted) = self.pending.pop_front() {
                if !evicted.acked {
                    self.lost += 1;
                }
            }
        }

        self.pending.push_back(PendingPacket {
            sequence,
            send_time: now,
            bytes,
            acked: false,
        });
    }

    pub fn process_ack(&mut self, ack: u32, ack_bitfield: u32, now: f64) -> Vec<AckedPacket> {
        let mut acked = Vec::new();
        let mut rtt_samples = Vec::new();

        for pending in &mut self.pending {
            if pending.acked {
                continue;
            }

            let is_acked = if pending.sequence == ack {
                true
            } else if sequence_greater_than(ack, pending.sequence) {
                let diff = ack.wrapping_sub(pending.sequence);
                if diff <= 32 {
                    (ack_bitfield & (1 << (diff - 1))) != 0
                } else {
                    false
                }
            } else {
                false
            };

            if is_acked {
                pending.acked = true;
                acked.push(AckedPacket {
                    sequence: pending.sequence,
                    bytes: pending.bytes,
                });

                let rtt = ((now - pending.send_time).max(0.0) * 1000.0) as f32;
                rtt_samples.push(rtt);
            }
        }

        for rtt in rtt_samples {
            self.update_rtt(rtt);
        }

        while self.pending.front().is_some_and(|p| p.acked) {
            self.pending.pop_front();
        }

        acked
    }

    /// Drops packets that went unacked for longer than `window` and counts
    /// them as lost.
    pub fn expire(&mut self, now: f64, window: f64) {
        let before = self.pending.len();
        let mut lost = 0;
        self.pending.retain(|p| {
            let expired = now - p.send_time > window;
            if expired && !p.acked {
                lost += 1;
            }
            !expired
        });
        if self.pending.len() != before {
            self.lost += lost;
        }
    }

    /// Packets declared lost since the previous call.
    pub fn take_lost(&mut self) -> u64 {
        std::mem::take(&mut self.lost)
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let Some(srtt) = self.srtt else {
            self.srtt = Some(rtt);
            self.rtt_var = rtt / 2.0;
            return;
        };

        let diff = (rtt - srtt).abs();
        self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
        self.srtt = Some((1.0 - ALPHA) * srtt + ALPHA * rtt);
    }

    pub fn srtt(&self) -> f32 {
        self.srtt.unwrap_or(0.0)
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn unacked_count(&self) -> usize {
        self.pending.iter().filter(|p| !p.acked).count()
    }

    pub fn is_pending(&self, sequence: u32) -> bool {
        self.pending
            .iter()
            .any(|p| p.sequence == sequence && !p.acked)
    }
}

/// Ack sent before anything has arrived. Sequences start at 0, so it
/// matches no packet still in the peer's ack window.
pub const NO_ACK: u32 = u32::MAX;

#[derive(Debug)]
pub struct ReceiveTracker {
    last_received: u32,
    received_bitfield: u32,
    recent_sequences: VecDeque<u32>,
    max_recent: usize,
    received_any: bool,
}

impl Default for ReceiveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self {
            last_received: 0,
            received_bitfield: 0,
            recent_sequences: VecDeque::with_capacity(128),
            max_recent: 128,
            received_any: false,
        }
    }

    /// Returns false for duplicates.
    pub fn record_received(&mut self, sequence: u32) -> bool {
        if self.recent_sequences.contains(&sequence) {
            return false;
        }

        if self.recent_sequences.len() >= self.max_recent {
            self.recent_sequences.pop_front();
        }
        self.recent_sequences.push_back(sequence);

        if !self.received_any {
            self.received_any = true;
            self.last_received = sequence;
            self.received_bitfield = 0;
            return true;
        }

        if sequence_greater_than(sequence, self.last_received) {
            let diff = sequence.wrapping_sub(self.last_received);
            if diff < 32 {
                self.received_bitfield = (self.received_bitfield << diff) | (1 << (diff - 1));
            } else if diff == 32 {
                self.received_bitfield = 1 << 31;
            } else {
                self.received_bitfield = 0;
            }
            self.last_received = sequence;
        } else {
            let diff = self.last_received.wrapping_sub(sequence);
            if diff > 0 && diff <= 32 {
                self.received_bitfield |= 1 << (diff - 1);
            }
        }

        true
    }

    /// `(ack, bitfield)` where bit `n` acks `ack - n - 1`. Acks nothing
    /// until the first packet arrives.
    pub fn ack_data(&self) -> (u32, u32) {
        if !self.received_any {
            return (NO_ACK, 0);
        }
        (self.last_received, self.received_bitfield)
    }

    pub fn has_received(&self) -> bool {
        self.received_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_tracker_bitfield() {
        let mut tracker = ReceiveTracker::new();

        tracker.record_received(1);
        tracker.record_received(2);
        tracker.record_received(3);

        let (ack, bitfield) = tracker.ack_data();
        assert_eq!(ack, 3);
        assert_eq!(bitfield, 0b11);
    }

    #[test]
    fn test_receive_tracker_out_of_order() {
        let mut tracker = ReceiveTracker::new();

        tracker.record_received(3);
        tracker.record_received(1);
        tracker.record_received(2);

        let (ack, bitfield) = tracker.ack_data();
        assert_eq!(ack, 3);
        assert_eq!(bitfield, 0b11);
    }

    #[test]
    fn test_receive_tracker_gap() {
        let mut tracker = ReceiveTracker::new();

        tracker.record_received(0);
        tracker.record_received(2);

        let (ack, bitfield) = tracker.ack_data();
        assert_eq!(ack, 2);
        assert_eq!(bitfield, 0b10);
    }

    #[test]
    fn test_fresh_tracker_acks_nothing() {
        let receiver = ReceiveTracker::new();
        assert!(!receiver.has_received());

        let mut sender = AckTracker::new(32);
        sender.track_packet(0, 10, 0.0);
        sender.track_packet(1, 10, 0.0);

        let (ack, bitfield) = receiver.ack_data();
        assert!(sender.process_ack(ack, bitfield, 0.05).is_empty());
        assert_eq!(sender.unacked_count(), 2);
        assert!(sender.is_pending(0));
    }

    #[test]
    fn test_first_packet_acks_only_itself() {
        let mut receiver = ReceiveTracker::new();
        receiver.record_received(1);

        let mut sender = AckTracker::new(32);
        sender.track_packet(0, 10, 0.0);
        sender.track_packet(1, 10, 0.0);

        let (ack, bitfield) = receiver.ack_data();
        let acked = sender.process_ack(ack, bitfield, 0.05);
        assert_eq!(acked, vec![AckedPacket { sequence: 1, bytes: 10 }]);
        assert!(sender.is_pending(0));
    }

    #[test]
    fn test_duplicate_detection() {
        let mut tracker = ReceiveTracker::new();

        assert!(tracker.record_received(1));
        assert!(!tracker.record_received(1));
        assert!(tracker.record_received(2));
    }

    #[test]
    fn test_ack_tracker_rtt() {
        let mut tracker = AckTracker::new(32);

        tracker.track_packet(1, 100, 10.0);
        let acked = tracker.process_ack(1, 0, 10.05);

        assert_eq!(acked, vec![AckedPacket { sequence: 1, bytes: 100 }]);
        assert!((tracker.srtt() - 50.0).abs() < 0.01);
        assert_eq!(tracker.unacked_count(), 0);
    }

    #[test]
    fn test_ack_tracker_bitfield_acks() {
        let mut tracker = AckTracker::new(32);
        for seq in 0..4 {
            tracker.track_packet(seq, 10, 0.0);
        }

        // ack 3, plus 2 and 0 via bitfield
        let acked = tracker.process_ack(3, 0b101, 0.02);
        let sequences: Vec<u32> = acked.iter().map(|a| a.sequence).collect();
        assert_eq!(sequences, vec![0, 2, 3]);
        assert_eq!(tracker.unacked_count(), 1);
    }

    #[test]
    fn test_expired_packets_count_as_lost() {
        let mut tracker = AckTracker::new(32);
        tracker.track_packet(0, 10, 0.0);
        tracker.track_packet(1, 10, 0.5);

        tracker.expire(1.2, 1.0);
        assert_eq!(tracker.take_lost(), 1);
        assert_eq!(tracker.take_lost(), 0);
        assert_eq!(tracker.unacked_count(), 1);
    }

    #[test]
    fn test_eviction_counts_as_lost() {
        let mut tracker = AckTracker::new(2);
        tracker.track_packet(0, 10, 0.0);
        tracker.track_packet(1, 10, 0.0);
        tracker.track_packet(2, 10, 0.0);
        assert_eq!(tracker.take_lost(), 1);
    }
}
