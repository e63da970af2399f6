//! Machine monitor support.
//!
//! While the machine is paused the host runs [`MonitorScheduler`] instead of
//! the full machine. It has its own timer, CIA and encoder for keyboard and
//! cursor handling, and keeps the same frame pacing.
//!
//! The memory editor uses fixed-column lines:
//!
//! ```text
//! :001000 4e 71 4e 71 4e 75 00 00
//! ;001000 4e71 4e71 4e75 0000 0000 0000 0000 0000
//! ```

use std::fmt::Write;

use emu_core::{ADDRESS_MASK, Bus, Device};

use crate::encoder::SharedEncoder;
use crate::error::MonitorError;
use crate::frame::FrameClock;

/// Timer status and acknowledge register.
const TIMER_STATUS: u16 = 0x00;

/// Timers that fired during one monitor step, one bit per timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerEvents(u8);

impl TimerEvents {
    #[must_use]
    pub fn fired(self, timer: u8) -> bool {
        timer < 8 && self.0 & (1 << timer) != 0
    }

    #[must_use]
    pub fn mask(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Scheduler used while the machine is paused.
pub struct MonitorScheduler {
    timer: Box<dyn Device>,
    cia: Box<dyn Device>,
    encoder: SharedEncoder,
    frame: FrameClock,
}

impl MonitorScheduler {
    /// `timer` and `cia` should raise their interrupts on `encoder`, which
    /// must not be connected to a CPU.
    #[must_use]
    pub fn new(
        timer: Box<dyn Device>,
        cia: Box<dyn Device>,
        encoder: SharedEncoder,
        cycles_per_frame: u32,
    ) -> Self {
        Self {
            timer,
            cia,
            encoder,
            frame: FrameClock::new(cycles_per_frame),
        }
    }

    pub fn reset(&mut self) {
        self.timer.reset();
        self.cia.reset();
        self.frame.reset();
    }

    /// Run the timer and CIA for `cycles` cycles.
    ///
    /// Pending timer interrupts are acknowledged and reported.
    pub fn run(&mut self, cycles: u32) -> TimerEvents {
        self.timer.run(cycles);

        let mut events = 0;
        let level = self.encoder.borrow().level();
        if level != 0 {
            let pending = self.timer.io_read_8(TIMER_STATUS);
            for bit in 0..8 {
                let mask = 1 << bit;
                if pending & mask != 0 {
                    events |= mask;
                    self.timer.io_write_8(TIMER_STATUS, mask);
                }
            }
        }

        self.cia.run(cycles);
        self.frame.advance(u64::from(cycles));
        TimerEvents(events)
    }

    pub fn frame_done(&mut self) -> bool {
        self.frame.frame_done()
    }

    #[must_use]
    pub fn frame_cycles(&self) -> i64 {
        self.frame.cycles()
    }

    pub fn timer_mut(&mut self) -> &mut dyn Device {
        self.timer.as_mut()
    }

    pub fn cia_mut(&mut self) -> &mut dyn Device {
        self.cia.as_mut()
    }

    #[must_use]
    pub fn encoder(&self) -> &SharedEncoder {
        &self.encoder
    }
}

/// Parse a hex number. Empty input or any non-hex character is an error.
pub fn parse_hex(text: &str) -> Result<u32, MonitorError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(MonitorError::InvalidHex(text.to_string()));
    }
    u32::from_str_radix(text, 16).map_err(|_| MonitorError::InvalidHex(text.to_string()))
}

/// Hex dump, 8 bytes per row: `:AAAAAA bb bb bb bb bb bb bb bb`.
pub fn memory_dump<B: Bus>(bus: &mut B, address: u32, rows: usize) -> String {
    let mut address = address & ADDRESS_MASK & !1;
    let mut out = String::new();
    for row in 0..rows {
        if row > 0 {
            out.push('\n');
        }
        let _ = write!(out, ":{address:06x}");
        for i in 0..8 {
            let byte = bus.read_8((address + i) & ADDRESS_MASK);
            let _ = write!(out, " {byte:02x}");
        }
        address = (address + 8) & ADDRESS_MASK;
    }
    out
}

/// Word dump, 8 words per row: `;AAAAAA wwww wwww ...`.
pub fn memory_word_dump<B: Bus>(bus: &mut B, address: u32, rows: usize) -> String {
    let mut address = address & ADDRESS_MASK & !1;
    let mut out = String::new();
    for row in 0..rows {
        if row > 0 {
            out.push('\n');
        }
        let _ = write!(out, ";{address:06x}");
        for i in 0..8 {
            let word = bus.read_16((address + 2 * i) & ADDRESS_MASK);
            let _ = write!(out, " {word:04x}");
        }
        address = (address + 16) & ADDRESS_MASK;
    }
    out
}

/// Column of the address field, after the prefix character.
const ADDRESS_COLUMN: usize = 1;
const ADDRESS_WIDTH: usize = 6;
/// Column of the first data field.
const DATA_COLUMN: usize = 8;

/// Apply a `:AAAAAA b0 b1 b2 b3 b4 b5 b6 b7` line.
///
/// Every field is parsed before anything is written. Returns the address of
/// the next line.
pub fn enter_memory_line<B: Bus>(bus: &mut B, line: &str) -> Result<u32, MonitorError> {
    let (address, bytes) = parse_line(line, ':', 2)?;
    for (i, &byte) in (0u32..).zip(&bytes) {
        bus.write_8((address + i) & ADDRESS_MASK, byte as u8);
    }
    Ok((address + 8) & ADDRESS_MASK)
}

/// Apply a `;AAAAAA w0 .. w7` line of 16-bit words.
///
/// The address is forced even. Returns the address of the next line.
pub fn enter_memory_word_line<B: Bus>(bus: &mut B, line: &str) -> Result<u32, MonitorError> {
    let (address, words) = parse_line(line, ';', 4)?;
    let address = address & !1;
    for (i, &word) in (0u32..).zip(&words) {
        bus.write_16((address + 2 * i) & ADDRESS_MASK, word as u16);
    }
    Ok((address + 16) & ADDRESS_MASK & !1)
}

fn parse_line(line: &str, prefix: char, width: usize) -> Result<(u32, [u32; 8]), MonitorError> {
    if !line.starts_with(prefix) {
        return Err(MonitorError::MissingPrefix(prefix));
    }
    let address = field(line, ADDRESS_COLUMN, ADDRESS_WIDTH)?;
    let mut values = [0u32; 8];
    for (i, value) in values.iter_mut().enumerate() {
        *value = field(line, DATA_COLUMN + i * (width + 1), width)?;
    }
    Ok((address, values))
}

fn field(line: &str, column: usize, width: usize) -> Result<u32, MonitorError> {
    line.get(column..column + width)
        .ok_or(MonitorError::BadColumn(column))
        .and_then(|text| parse_hex(text).map_err(|_| MonitorError::BadColumn(column)))
}
