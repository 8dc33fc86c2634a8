use crate::catalog::{Message, TestMessage};

/// At most one send per `interval` of the owner's clock.
#[derive(Debug, Clone)]
pub struct SendThrottle {
    interval: f64,
    last_send: Option<f64>,
}

impl SendThrottle {
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            last_send: None,
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn is_ready(&self, now: f64) -> bool {
        self.last_send
            .is_none_or(|last| now - last >= self.interval)
    }

    /// Claims the slot for `now` if it is free.
    pub fn try_acquire(&mut self, now: f64) -> bool {
        if !self.is_ready(now) {
            return false;
        }
        self.last_send = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_send = None;
    }
}

/// Synthetic test stream: message `n` carries `sequence = n` and
/// `hitpoints = 100 - n`.
#[derive(Debug, Clone)]
pub struct TestTraffic {
    throttle: SendThrottle,
    next_sequence: u16,
    limit: Option<u16>,
}

impl TestTraffic {
    pub fn new(interval: f64, limit: Option<u16>) -> Self {
        Self {
            throttle: SendThrottle::new(interval),
            next_sequence: 0,
            limit,
        }
    }

    pub fn sent(&self) -> u16 {
        self.next_sequence
    }

    pub fn is_finished(&self) -> bool {
        self.limit.is_some_and(|limit| self.next_sequence >= limit)
    }

    /// Next message if the throttle allows one at `now`.
    pub fn poll(&mut self, now: f64) -> Option<Message> {
        if self.is_finished() || !self.throttle.try_acquire(now) {
            return None;
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let hitpoints = 100u32.saturating_sub(u32::from(sequence));
        Some(Message::Test(TestMessage::new(sequence, hitpoints)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_allows_one_per_interval() {
        let mut throttle = SendThrottle::new(0.2);
        assert!(throttle.try_acquire(100.0));
        assert!(!throttle.try_acquire(100.1));
        assert!(throttle.try_acquire(100.2));
        assert!(!throttle.is_ready(100.3));
    }

    #[test]
    fn traffic_counts_down_hitpoints() {
        let mut traffic = TestTraffic::new(0.0, Some(3));
        let messages: Vec<Message> = (0..10).filter_map(|i| traffic.poll(f64::from(i))).collect();

        assert_eq!(
            messages,
            vec![
                Message::Test(TestMessage::new(0, 100)),
                Message::Test(TestMessage::new(1, 99)),
                Message::Test(TestMessage::new(2, 98)),
            ]
        );
        assert!(traffic.is_finished());
    }

    #[test]
    fn hitpoints_saturate_at_zero() {
        let mut traffic = TestTraffic::new(0.0, None);
        let last = (0..=120).filter_map(|i| traffic.poll(f64::from(i))).last();
        assert_eq!(last, Some(Message::Test(TestMessage::new(120, 0))));
    }
}
