//! Clock domain conversion.
//!
//! The CPU, CIA and timer share one clock. The sound chip runs from its own
//! crystal, so every batch of CPU cycles is converted before it reaches the
//! sound device. The remainder of each conversion is carried to the next one,
//! which keeps the long-run ratio exact.

/// Rate adjustment applied on top of the nominal frequency ratio.
///
/// Used to nudge sound generation faster or slower when the host audio queue
/// drifts away from its target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockRate {
    /// 1.05 × nominal.
    Fast,
    /// 1.00 × nominal.
    Nominal,
    /// 0.95 × nominal.
    Slow,
}

/// Rates are expressed in twentieths so that all three share a denominator.
const RATE_DENOMINATOR: u128 = 20;

impl ClockRate {
    const fn twentieths(self) -> u128 {
        match self {
            Self::Fast => 21,
            Self::Nominal => 20,
            Self::Slow => 19,
        }
    }
}

/// Converts cycle counts from a source clock to a target clock.
///
/// Over any sequence of calls the total returned equals
/// `floor(total_in * target_hz / source_hz)` for nominal calls. Scaled calls
/// feed the same accumulator, so mixing rates never loses a fraction.
#[derive(Debug, Clone)]
pub struct FrequencyDivider {
    source_hz: u64,
    target_hz: u64,
    /// Carried remainder, in units of `1 / (source_hz * 20)` target cycles.
    remainder: u128,
}

impl FrequencyDivider {
    /// Create a divider from `source_hz` to `target_hz`.
    ///
    /// # Panics
    ///
    /// Panics if `source_hz` is zero.
    #[must_use]
    pub const fn new(source_hz: u64, target_hz: u64) -> Self {
        assert!(source_hz > 0, "source frequency must be non-zero");
        Self {
            source_hz,
            target_hz,
            remainder: 0,
        }
    }

    /// Convert `cycles` source cycles at the nominal rate.
    pub fn clock(&mut self, cycles: u64) -> u64 {
        self.clock_scaled(cycles, ClockRate::Nominal)
    }

    /// Convert `cycles` source cycles, scaled by `rate`.
    pub fn clock_scaled(&mut self, cycles: u64, rate: ClockRate) -> u64 {
        let divisor = u128::from(self.source_hz) * RATE_DENOMINATOR;
        let total =
            self.remainder + u128::from(cycles) * u128::from(self.target_hz) * rate.twentieths();
        self.remainder = total % divisor;
        (total / divisor) as u64
    }

    /// Drop any carried fraction.
    pub fn reset(&mut self) {
        self.remainder = 0;
    }
}
