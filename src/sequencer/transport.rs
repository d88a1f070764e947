/// Step clock - decides when the next sixteenth-note step is due
///
/// Deadlines advance additively from the start time (`deadline += step`), never from
/// the moment a tick happened to be observed, so late polling never accumulates drift.
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Running,
}

/// Slowest tempo the clock will run at; anything below (or NaN) is raised to it.
pub const MIN_BPM: f32 = 1.0;

/// Length of one sixteenth note at `bpm`.
pub fn step_duration(bpm: f32) -> Duration {
    let steps_per_beat = 4.0; // 16th notes
    let secs = 60.0 / f64::from(bpm.max(MIN_BPM)) / steps_per_beat;
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    current_step: usize,
    step_count: usize,
    bpm: f32,
    next_deadline: Duration,
}

impl Transport {
    pub fn new(step_count: usize, bpm: f32) -> Self {
        Self {
            state: TransportState::Stopped,
            current_step: 0,
            step_count: step_count.max(1),
            bpm,
            next_deadline: Duration::ZERO,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TransportState::Running
    }

    /// Index of the step the next tick will play.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    /// Takes effect when the next deadline is computed.
    pub fn set_bpm(&mut self, bpm: f32) {
        self.bpm = bpm;
    }

    pub fn step_duration(&self) -> Duration {
        step_duration(self.bpm)
    }

    pub fn next_deadline(&self) -> Duration {
        self.next_deadline
    }

    /// Restart from step 0 with the first step due immediately.
    pub fn start(&mut self, now: Duration) {
        self.state = TransportState::Running;
        self.current_step = 0;
        self.next_deadline = now;
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    /// Returns the step to play if its deadline has passed, advancing the playhead.
    /// Calling again before the next deadline returns `None`.
    pub fn tick(&mut self, now: Duration) -> Option<usize> {
        if !self.is_running() || now < self.next_deadline {
            return None;
        }

        let step = self.current_step;
        self.current_step = (self.current_step + 1) % self.step_count;
        self.next_deadline += self.step_duration();
        Some(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_duration_ms() {
        for bpm in [40.0_f32, 90.0, 120.0, 133.0, 240.0] {
            let expected = 60000.0 / f64::from(bpm) / 4.0;
            let actual = step_duration(bpm).as_secs_f64() * 1000.0;
            assert!((actual - expected).abs() < 1e-6, "bpm {bpm}");
        }
        assert_eq!(step_duration(120.0), Duration::from_millis(125));
    }

    #[test]
    fn test_step_duration_never_panics() {
        let slowest = step_duration(MIN_BPM);
        assert_eq!(slowest, Duration::from_secs(15));
        for bpm in [0.0_f32, -120.0, 1e-30, f32::NAN, f32::NEG_INFINITY] {
            assert_eq!(step_duration(bpm), slowest, "bpm {bpm}");
        }
        assert_eq!(step_duration(f32::INFINITY), Duration::ZERO);

        let mut transport = Transport::new(4, 0.0);
        transport.start(Duration::ZERO);
        assert_eq!(transport.tick(Duration::ZERO), Some(0));
        assert_eq!(transport.next_deadline(), slowest);
    }

    #[test]
    fn test_deadlines_do_not_drift() {
        for bpm in [97.0_f32, 120.0, 173.0] {
            let start = Duration::from_millis(1234);
            let mut transport = Transport::new(16, bpm);
            transport.start(start);

            let step = step_duration(bpm);
            let ticks = 1000u32;
            // poll late every time; deadlines must not pick up the lateness
            let mut now = start;
            for _ in 0..ticks {
                assert!(transport.tick(now + Duration::from_millis(3)).is_some());
                now = transport.next_deadline();
            }
            assert_eq!(transport.next_deadline(), start + step * ticks);
        }
    }

    #[test]
    fn test_tick_is_idempotent_before_deadline() {
        let mut transport = Transport::new(16, 120.0);
        transport.start(Duration::ZERO);
        assert_eq!(transport.tick(Duration::ZERO), Some(0));
        assert_eq!(transport.tick(Duration::ZERO), None);
        assert_eq!(transport.tick(Duration::from_millis(124)), None);
        assert_eq!(transport.current_step(), 1);
        assert_eq!(transport.tick(Duration::from_millis(125)), Some(1));
    }

    #[test]
    fn test_wraps_after_step_count() {
        for step_count in 1..=32 {
            let mut transport = Transport::new(step_count, 120.0);
            transport.start(Duration::ZERO);
            for _ in 0..step_count {
                let now = transport.next_deadline();
                transport.tick(now);
            }
            assert_eq!(transport.current_step(), 0);
        }
    }

    #[test]
    fn test_stopped_transport_never_ticks() {
        let mut transport = Transport::new(16, 120.0);
        assert_eq!(transport.tick(Duration::from_secs(10)), None);
        transport.start(Duration::ZERO);
        transport.stop();
        assert_eq!(transport.tick(Duration::from_secs(10)), None);
    }

    #[test]
    fn test_tempo_change_applies_from_next_boundary() {
        let mut transport = Transport::new(16, 120.0);
        transport.start(Duration::ZERO);
        transport.tick(Duration::ZERO);
        assert_eq!(transport.next_deadline(), Duration::from_millis(125));

        transport.set_bpm(60.0);
        // already-scheduled deadline is untouched
        assert_eq!(transport.next_deadline(), Duration::from_millis(125));
        transport.tick(Duration::from_millis(125));
        assert_eq!(transport.next_deadline(), Duration::from_millis(375));
    }

    #[test]
    fn test_restart_resets_position() {
        let mut transport = Transport::new(16, 120.0);
        transport.start(Duration::ZERO);
        transport.tick(Duration::ZERO);
        transport.tick(Duration::from_millis(125));
        transport.stop();
        transport.start(Duration::from_secs(5));
        assert_eq!(transport.current_step(), 0);
        assert_eq!(transport.next_deadline(), Duration::from_secs(5));
    }
}
