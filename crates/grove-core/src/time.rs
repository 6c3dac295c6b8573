use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::WorldConfig;

const NANOS_PER_SEC: u64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// SimTime
// ---------------------------------------------------------------------------

/// Simulated time, counted in whole nanoseconds.
///
/// Sub-steps are integer nanosecond quanta so that frame deltas which sum to
/// the same total produce the same number of sub-steps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SimTime {
    nanos: u64,
}

impl SimTime {
    pub const ZERO: Self = Self { nanos: 0 };

    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Negative and non-finite inputs clamp to zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_secs(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self {
            nanos: (secs * NANOS_PER_SEC as f64).round() as u64,
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_duration(duration: Duration) -> Self {
        Self {
            nanos: duration.as_nanos() as u64,
        }
    }

    #[must_use]
    pub const fn nanos(&self) -> u64 {
        self.nanos
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn secs_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_SEC as f64
    }

    #[must_use]
    pub const fn to_duration(&self) -> Duration {
        Duration::from_nanos(self.nanos)
    }

    pub const fn advance(&mut self, delta_nanos: u64) {
        self.nanos = self.nanos.saturating_add(delta_nanos);
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.nanos / NANOS_PER_SEC;
        let micros = (self.nanos % NANOS_PER_SEC) / 1_000;
        write!(f, "{secs}.{micros:06}s")
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Fixed-step accumulator.
///
/// Frame time is banked and dispensed as fixed sub-steps, at most `max_steps`
/// per frame. Time that does not fit is kept for the next frame.
#[derive(Debug, Clone)]
pub struct Accumulator {
    banked: u64,
    step_nanos: u64,
    max_steps: u32,
    steps_this_frame: u32,
}

impl Accumulator {
    /// Sub-step of `1 / rate_hz` seconds. A zero rate is treated as 1 Hz.
    #[must_use]
    pub fn from_rate_hz(rate_hz: u32, max_steps: u32) -> Self {
        Self {
            banked: 0,
            step_nanos: (NANOS_PER_SEC / u64::from(rate_hz.max(1))).max(1),
            max_steps: max_steps.max(1),
            steps_this_frame: 0,
        }
    }

    /// Bank one frame's worth of time and open a new frame.
    pub const fn accumulate(&mut self, delta: SimTime) {
        self.banked = self.banked.saturating_add(delta.nanos());
        self.steps_this_frame = 0;
    }

    /// Consume one sub-step if enough time is banked and the frame cap allows.
    pub const fn should_step(&mut self) -> bool {
        if self.steps_this_frame >= self.max_steps || self.banked < self.step_nanos {
            return false;
        }
        self.banked -= self.step_nanos;
        self.steps_this_frame += 1;
        true
    }

    /// Fraction of the next sub-step already banked, clamped to `[0, 1]`.
    ///
    /// Exceeds the sub-step only when the frame cap was hit, hence the clamp.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn alpha(&self) -> f32 {
        (self.banked as f64 / self.step_nanos as f64).min(1.0) as f32
    }

    #[must_use]
    pub const fn step_nanos(&self) -> u64 {
        self.step_nanos
    }

    #[must_use]
    pub const fn banked(&self) -> SimTime {
        SimTime::from_nanos(self.banked)
    }

    pub const fn reset(&mut self) {
        self.banked = 0;
        self.steps_this_frame = 0;
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Simulation clock: elapsed simulated time plus the fixed-step accumulator.
///
/// ```ignore
/// clock.tick(frame_delta);
/// while clock.should_step() {
///     world_substep(clock.timestep());
///     clock.advance();
/// }
/// let alpha = clock.alpha();
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    time: SimTime,
    substeps: u64,
    accumulator: Accumulator,
}

impl Clock {
    #[must_use]
    pub fn new(rate_hz: u32, max_substeps: u32) -> Self {
        Self {
            time: SimTime::ZERO,
            substeps: 0,
            accumulator: Accumulator::from_rate_hz(rate_hz, max_substeps),
        }
    }

    /// Clock for a validated [`WorldConfig`].
    #[must_use]
    pub fn from_config(config: &WorldConfig) -> Self {
        let rate = u32::try_from(config.update_rate_hz).unwrap_or(1);
        Self::new(rate, config.max_substeps)
    }

    pub const fn tick(&mut self, delta: SimTime) {
        self.accumulator.accumulate(delta);
    }

    pub const fn should_step(&mut self) -> bool {
        self.accumulator.should_step()
    }

    /// Record one completed sub-step.
    pub const fn advance(&mut self) {
        self.time.advance(self.accumulator.step_nanos());
        self.substeps += 1;
    }

    /// Sub-step length in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn timestep(&self) -> f32 {
        self.accumulator.step_nanos() as f32 / NANOS_PER_SEC as f32
    }

    #[must_use]
    pub const fn time(&self) -> SimTime {
        self.time
    }

    /// Total sub-steps taken since creation or the last reset.
    #[must_use]
    pub const fn substeps(&self) -> u64 {
        self.substeps
    }

    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.accumulator.alpha()
    }

    #[must_use]
    pub const fn pending(&self) -> SimTime {
        self.accumulator.banked()
    }

    pub const fn reset(&mut self) {
        self.time = SimTime::ZERO;
        self.substeps = 0;
        self.accumulator.reset();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(clock: &mut Clock) -> u32 {
        let mut n = 0;
        while clock.should_step() {
            clock.advance();
            n += 1;
        }
        n
    }

    // ---- SimTime ----

    #[test]
    fn simtime_from_secs_rounds_to_nanos() {
        assert_eq!(SimTime::from_secs(2.5).nanos(), 2_500_000_000);
        assert_eq!(SimTime::from_secs(1.0 / 120.0).nanos(), 8_333_333);
    }

    #[test]
    fn simtime_from_secs_clamps_invalid() {
        assert_eq!(SimTime::from_secs(-1.0), SimTime::ZERO);
        assert_eq!(SimTime::from_secs(f64::NAN), SimTime::ZERO);
    }

    #[test]
    fn simtime_from_duration() {
        let t = SimTime::from_duration(Duration::from_millis(1500));
        assert_eq!(t.nanos(), 1_500_000_000);
        assert_eq!(t.to_duration(), Duration::from_millis(1500));
    }

    #[test]
    fn simtime_advance_saturates() {
        let mut t = SimTime::from_nanos(u64::MAX - 1);
        t.advance(10);
        assert_eq!(t.nanos(), u64::MAX);
    }

    #[test]
    fn simtime_display() {
        assert_eq!(SimTime::from_nanos(1_234_567_890).to_string(), "1.234567s");
        assert_eq!(SimTime::ZERO.to_string(), "0.000000s");
    }

    // ---- Accumulator ----

    #[test]
    fn accumulator_step_length_from_rate() {
        let acc = Accumulator::from_rate_hz(120, 16);
        assert_eq!(acc.step_nanos(), 8_333_333);
    }

    #[test]
    fn accumulator_zero_rate_is_one_hz() {
        let acc = Accumulator::from_rate_hz(0, 16);
        assert_eq!(acc.step_nanos(), NANOS_PER_SEC);
    }

    #[test]
    fn accumulator_dispenses_whole_steps() {
        let mut acc = Accumulator::from_rate_hz(100, 16);
        acc.accumulate(SimTime::from_secs(0.035));
        let mut count = 0;
        while acc.should_step() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(acc.banked().nanos(), 5_000_000);
    }

    #[test]
    fn accumulator_caps_steps_and_carries_surplus() {
        let mut acc = Accumulator::from_rate_hz(100, 3);
        acc.accumulate(SimTime::from_secs(0.1));
        let mut count = 0;
        while acc.should_step() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(acc.banked().nanos(), 70_000_000);

        // The next frame picks up the surplus.
        acc.accumulate(SimTime::ZERO);
        let mut count = 0;
        while acc.should_step() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn accumulator_alpha() {
        let mut acc = Accumulator::from_rate_hz(100, 16);
        acc.accumulate(SimTime::from_secs(0.015));
        while acc.should_step() {}
        assert!((acc.alpha() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn accumulator_alpha_clamped_when_capped() {
        let mut acc = Accumulator::from_rate_hz(100, 1);
        acc.accumulate(SimTime::from_secs(0.05));
        while acc.should_step() {}
        assert!((acc.alpha() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn accumulator_reset() {
        let mut acc = Accumulator::from_rate_hz(100, 16);
        acc.accumulate(SimTime::from_secs(0.05));
        acc.reset();
        assert!(!acc.should_step());
        assert_eq!(acc.banked(), SimTime::ZERO);
    }

    // ---- Clock ----

    #[test]
    fn clock_one_second_at_120hz() {
        let mut clock = Clock::new(120, 200);
        clock.tick(SimTime::from_secs(1.0));
        assert_eq!(drain(&mut clock), 120);
        assert_eq!(clock.substeps(), 120);
        assert_eq!(clock.time().nanos(), 120 * 8_333_333);
    }

    #[test]
    fn clock_irregular_frames_match_regular_frames() {
        let mut regular = Clock::new(120, 16);
        let mut irregular = Clock::new(120, 16);

        for _ in 0..60 {
            regular.tick(SimTime::from_nanos(16_666_666));
            drain(&mut regular);
        }
        for delta in [5_000_000u64, 27_333_330, 1_000_000, 300_000_000, 666_666_630] {
            irregular.tick(SimTime::from_nanos(delta));
            drain(&mut irregular);
        }
        // Drain whatever the cap held back.
        while irregular.pending().nanos() >= 8_333_333 {
            irregular.tick(SimTime::ZERO);
            drain(&mut irregular);
        }

        assert_eq!(regular.substeps(), irregular.substeps());
        assert_eq!(regular.time(), irregular.time());
    }

    #[test]
    fn clock_from_config() {
        let cfg = WorldConfig {
            update_rate_hz: 60,
            max_substeps: 2,
            ..WorldConfig::default()
        };
        let mut clock = Clock::from_config(&cfg);
        assert!((clock.timestep() - 1.0 / 60.0).abs() < 1e-6);
        clock.tick(SimTime::from_secs(1.0));
        assert_eq!(drain(&mut clock), 2);
    }

    #[test]
    fn clock_reset() {
        let mut clock = Clock::new(100, 16);
        clock.tick(SimTime::from_secs(0.05));
        drain(&mut clock);
        assert!(clock.time().nanos() > 0);
        clock.reset();
        assert_eq!(clock.time(), SimTime::ZERO);
        assert_eq!(clock.substeps(), 0);
        assert!(!clock.should_step());
    }
}
