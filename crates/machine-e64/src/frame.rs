//! Frame boundary tracking.

/// Accumulates CPU cycles and signals when a frame's worth has passed.
///
/// The balance is reduced by one budget per boundary rather than cleared, so
/// the excess carries into the next frame.
#[derive(Debug, Clone)]
pub struct FrameClock {
    cycles_per_frame: i64,
    balance: i64,
    frame_done: bool,
}

impl FrameClock {
    #[must_use]
    pub fn new(cycles_per_frame: u32) -> Self {
        Self {
            cycles_per_frame: i64::from(cycles_per_frame),
            balance: 0,
            frame_done: false,
        }
    }

    /// Add `cycles`. Returns true if this call crossed a frame boundary.
    ///
    /// A boundary is crossed once the balance exceeds the budget; at most one
    /// budget is subtracted per call.
    pub fn advance(&mut self, cycles: u64) -> bool {
        self.balance = self.balance.saturating_add_unsigned(cycles);
        if self.balance > self.cycles_per_frame {
            self.balance -= self.cycles_per_frame;
            self.frame_done = true;
            true
        } else {
            false
        }
    }

    /// True once after each boundary.
    pub fn frame_done(&mut self) -> bool {
        std::mem::take(&mut self.frame_done)
    }

    /// Cycles accumulated in the current frame.
    #[must_use]
    pub fn cycles(&self) -> i64 {
        self.balance
    }

    #[must_use]
    pub fn cycles_per_frame(&self) -> u32 {
        self.cycles_per_frame as u32
    }

    pub fn reset(&mut self) {
        self.balance = 0;
        self.frame_done = false;
    }
}
