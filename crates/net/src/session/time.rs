/// Monotonic simulation clock of one side. Server and client each own one
/// and they are never reconciled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimClock {
    now: f64,
    delta: f64,
}

impl SimClock {
    pub fn new(start: f64, delta: f64) -> Self {
        Self { now: start, delta }
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn advance(&mut self) -> f64 {
        self.now += self.delta;
        self.now
    }
}

/// Wall-clock accumulator for the external driver: turns frame times into
/// a whole number of fixed ticks.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    dt: f64,
    accumulator: f64,
    max_frame: f64,
}

impl FixedTimestep {
    pub fn new(dt: f64) -> Self {
        Self {
            dt,
            accumulator: 0.0,
            max_frame: 0.25,
        }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn accumulate(&mut self, delta: f64) {
        self.accumulator += delta.min(self.max_frame);
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    pub fn alpha(&self) -> f64 {
        self.accumulator / self.dt
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

/// Driver state read by an overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub tick: u64,
    pub tick_accumulator: f64,
    pub frame_dt: f64,
}

impl FrameStats {
    /// Feeds one frame into `timestep` and returns how many ticks are due.
    pub fn begin_frame(&mut self, timestep: &mut FixedTimestep, frame_dt: f64) -> u32 {
        self.frame_dt = frame_dt;
        timestep.accumulate(frame_dt);

        let mut ticks = 0;
        while timestep.consume_tick() {
            ticks += 1;
        }
        self.tick += u64::from(ticks);
        self.tick_accumulator = timestep.accumulator();
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_at_origin_and_steps() {
        let mut clock = SimClock::new(100.0, 0.01);
        assert_eq!(clock.now(), 100.0);
        clock.advance();
        clock.advance();
        assert!((clock.now() - 100.02).abs() < 1e-9);
    }

    #[test]
    fn fixed_timestep_accumulation() {
        let mut ts = FixedTimestep::new(1.0 / 60.0);

        ts.accumulate(1.0 / 30.0);
        assert!(ts.consume_tick());
        assert!(ts.consume_tick());
        assert!(!ts.consume_tick());
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut ts = FixedTimestep::new(0.01);
        ts.accumulate(10.0);
        assert!((ts.accumulator() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn frame_stats_track_ticks() {
        let mut ts = FixedTimestep::new(0.01);
        let mut stats = FrameStats::default();

        assert_eq!(stats.begin_frame(&mut ts, 0.025), 2);
        assert_eq!(stats.tick, 2);
        assert!((stats.tick_accumulator - 0.005).abs() < 1e-9);
        assert_eq!(stats.frame_dt, 0.025);
    }
}
