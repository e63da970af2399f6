//! 68000 CPU core trait and the interrupt priority input.

use std::cell::Cell;
use std::rc::Rc;

use crate::Bus;

/// A programmer-visible 68000 register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Data register D0-D7.
    D(u8),
    /// Address register A0-A7.
    A(u8),
    /// Status register.
    Sr,
    /// User stack pointer.
    Usp,
    /// Supervisor stack pointer.
    Ssp,
}

/// A 68000-family CPU core.
///
/// The core executes one instruction per call and reaches memory only through
/// the bus passed in, so the machine keeps ownership of both. The cycle
/// counter is monotonic between resets.
pub trait M68kCore {
    /// Execute one instruction.
    fn execute<B: Bus>(&mut self, bus: &mut B);

    /// Total cycles consumed since the last reset.
    fn clock(&self) -> u64;

    fn set_clock(&mut self, cycles: u64);

    /// Reset the core, fetching SSP and PC from the vectors at `$000000`.
    fn reset<B: Bus>(&mut self, bus: &mut B);

    fn pc(&self) -> u32;

    fn set_pc(&mut self, pc: u32);

    fn register(&self, reg: Register) -> u32;

    fn set_register(&mut self, reg: Register, value: u32);

    /// Wire the interrupt priority input to `pin`.
    ///
    /// From then on the core reads its IPL from the pin, so whoever drives
    /// the pin is seen by the next instruction and by [`ipl`](Self::ipl).
    fn connect_ipl(&mut self, pin: IplPin);

    /// Drive the 3-bit interrupt priority input. Values above 7 are masked.
    fn set_ipl(&mut self, level: u8);

    fn ipl(&self) -> u8;

    /// True once execution has stopped on a breakpoint.
    fn breakpoint_reached(&self) -> bool;

    fn clear_breakpoint(&mut self);
}

/// The CPU's interrupt priority input pins.
///
/// The priority encoder writes the arbitrated level here and the connected
/// core reads it. Cloning yields another handle to the same pins.
#[derive(Debug, Clone, Default)]
pub struct IplPin(Rc<Cell<u8>>);

impl IplPin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, level: u8) {
        self.0.set(level & 7);
    }

    #[must_use]
    pub fn get(&self) -> u8 {
        self.0.get()
    }
}
