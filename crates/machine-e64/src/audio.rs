//! Host audio synchronisation.
//!
//! The sound chip is clocked from the CPU cycle count, but the host plays
//! samples at its own pace. After every scheduler step the host queue
//! occupancy is compared with a target size and the sound clock is nudged
//! to keep the queue near that target.

use emu_core::ClockRate;
use log::info;

/// Host audio output as seen by the scheduler.
pub trait AudioQueue {
    /// Bytes currently queued for playback.
    fn queued_bytes(&self) -> usize;

    /// Begin playback. Calling it again has no effect.
    fn start(&mut self);
}

/// Occupancy band of the host queue relative to its target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBand {
    /// Below 50% of target.
    Underrun,
    /// 50% up to 120%.
    Equalrun,
    /// 120% up to 200%.
    Overrun,
    /// 200% and above.
    Flooded,
}

/// What to do with the sound chip for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retiming {
    Run(ClockRate),
    Skip,
}

impl QueueBand {
    #[must_use]
    pub fn classify(queued: usize, target: usize) -> Self {
        let queued = queued as u128 * 10;
        let target = target as u128;
        if queued < 5 * target {
            Self::Underrun
        } else if queued < 12 * target {
            Self::Equalrun
        } else if queued < 20 * target {
            Self::Overrun
        } else {
            Self::Flooded
        }
    }

    /// Sound clock policy for live playback.
    #[must_use]
    pub fn retiming(self) -> Retiming {
        match self {
            Self::Underrun => Retiming::Run(ClockRate::Fast),
            Self::Equalrun => Retiming::Run(ClockRate::Nominal),
            Self::Overrun => Retiming::Run(ClockRate::Slow),
            Self::Flooded => Retiming::Skip,
        }
    }
}

/// True once the queue holds more than 75% of target.
#[must_use]
pub fn ready_to_start(queued: usize, target: usize) -> bool {
    queued as u128 * 4 > target as u128 * 3
}

/// Buffer health tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioStats {
    underruns: u64,
    equalruns: u64,
    overruns: u64,
    under_lap: u64,
    equal_lap: u64,
    over_lap: u64,
}

impl AudioStats {
    pub fn record(&mut self, band: QueueBand) {
        match band {
            QueueBand::Underrun => self.underruns += 1,
            QueueBand::Equalrun => self.equalruns += 1,
            QueueBand::Overrun | QueueBand::Flooded => self.overruns += 1,
        }
    }

    /// False if an underrun or overrun was recorded since the previous call.
    pub fn within_specs(&mut self) -> bool {
        let ok = self.underruns <= self.under_lap && self.overruns <= self.over_lap;
        self.under_lap = self.underruns;
        self.equal_lap = self.equalruns;
        self.over_lap = self.overruns;
        ok
    }

    #[must_use]
    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    #[must_use]
    pub fn equalruns(&self) -> u64 {
        self.equalruns
    }

    #[must_use]
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Share of steps in each band, in percent: (under, equal, over).
    #[must_use]
    pub fn percentages(&self) -> (f64, f64, f64) {
        let total = self.underruns + self.equalruns + self.overruns;
        if total == 0 {
            return (0.0, 0.0, 0.0);
        }
        let pct = |n: u64| n as f64 * 100.0 / total as f64;
        (pct(self.underruns), pct(self.equalruns), pct(self.overruns))
    }

    pub fn log_summary(&self) {
        let (under, equal, over) = self.percentages();
        info!(
            "audio buffer performance: underruns {under:6.2}%, equalruns {equal:6.2}%, overruns {over:6.2}%"
        );
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_edges() {
        assert_eq!(QueueBand::classify(0, 1000), QueueBand::Underrun);
        assert_eq!(QueueBand::classify(499, 1000), QueueBand::Underrun);
        assert_eq!(QueueBand::classify(500, 1000), QueueBand::Equalrun);
        assert_eq!(QueueBand::classify(1199, 1000), QueueBand::Equalrun);
        assert_eq!(QueueBand::classify(1200, 1000), QueueBand::Overrun);
        assert_eq!(QueueBand::classify(1999, 1000), QueueBand::Overrun);
        assert_eq!(QueueBand::classify(2000, 1000), QueueBand::Flooded);
    }

    #[test]
    fn retiming_per_band() {
        assert_eq!(QueueBand::classify(100, 1000).retiming(), Retiming::Run(ClockRate::Fast));
        assert_eq!(QueueBand::classify(600, 1000).retiming(), Retiming::Run(ClockRate::Nominal));
        assert_eq!(QueueBand::classify(1500, 1000).retiming(), Retiming::Run(ClockRate::Slow));
        assert_eq!(QueueBand::classify(2500, 1000).retiming(), Retiming::Skip);
    }

    #[test]
    fn start_threshold() {
        assert!(!ready_to_start(750, 1000));
        assert!(ready_to_start(751, 1000));
    }

    #[test]
    fn flooded_counts_as_overrun() {
        let mut stats = AudioStats::default();
        stats.record(QueueBand::Flooded);
        stats.record(QueueBand::Overrun);
        assert_eq!(stats.overruns(), 2);
    }

    #[test]
    fn within_specs_is_consuming() {
        let mut stats = AudioStats::default();
        assert!(stats.within_specs());
        stats.record(QueueBand::Underrun);
        assert!(!stats.within_specs());
        assert!(stats.within_specs());
        stats.record(QueueBand::Equalrun);
        assert!(stats.within_specs());
        stats.record(QueueBand::Overrun);
        assert!(!stats.within_specs());
    }

    #[test]
    fn percentages() {
        let mut stats = AudioStats::default();
        assert_eq!(stats.percentages(), (0.0, 0.0, 0.0));
        stats.record(QueueBand::Underrun);
        stats.record(QueueBand::Equalrun);
        stats.record(QueueBand::Equalrun);
        stats.record(QueueBand::Overrun);
        assert_eq!(stats.percentages(), (25.0, 50.0, 25.0));
    }
}
