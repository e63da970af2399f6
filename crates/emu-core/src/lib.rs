//! Core traits and types for the E64 machine.
//!
//! Components never reach each other through globals. The CPU core sees the
//! machine only through [`Bus`], peripherals are driven through [`Device`]
//! and its refinements, and clock domains are bridged with
//! [`FrequencyDivider`].

mod bus;
mod clock;
mod cpu;
mod device;

pub use bus::{ADDRESS_MASK, Bus};
pub use clock::{ClockRate, FrequencyDivider};
pub use cpu::{IplPin, M68kCore, Register};
pub use device::{Blitter, Device, FontBank, Sound};
