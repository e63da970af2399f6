//! Interrupt priority encoder.
//!
//! Devices register a request line with a fixed priority level. The encoder
//! output is the highest level among the asserted lines, or 0, and is driven
//! onto the CPU's IPL pins when a CPU is connected. A second encoder with no
//! CPU serves the monitor.

use std::cell::RefCell;
use std::rc::Rc;

use emu_core::IplPin;

use crate::error::{MachineError, Result};

/// Maximum number of registered lines.
pub const MAX_IRQ_LINES: usize = 256;

/// Index of a registered line. Handles are dense and assigned in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrqHandle(u8);

impl IrqHandle {
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Line {
    asserted: bool,
    level: u8,
}

#[derive(Debug, Default)]
pub struct PriorityEncoder {
    lines: Vec<Line>,
    level: u8,
    cpu: Option<IplPin>,
}

/// Encoder shared between the machine and the devices that own lines.
pub type SharedEncoder = Rc<RefCell<PriorityEncoder>>;

impl PriorityEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> SharedEncoder {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Drive `pin` with the encoder output from now on.
    pub fn connect_cpu(&mut self, pin: IplPin) {
        pin.set(self.level);
        self.cpu = Some(pin);
    }

    /// Register a new, deasserted line with priority `level` (0-7).
    pub fn register(&mut self, level: u8) -> Result<IrqHandle> {
        if level > 7 {
            return Err(MachineError::InvalidIrqLevel(level));
        }
        if self.lines.len() >= MAX_IRQ_LINES {
            return Err(MachineError::IrqRegistryFull);
        }
        let handle = IrqHandle(self.lines.len() as u8);
        self.lines.push(Line {
            asserted: false,
            level,
        });
        Ok(handle)
    }

    /// Pull a line.
    pub fn assert(&mut self, handle: IrqHandle) {
        self.set_line(handle, true);
    }

    /// Release a line.
    pub fn deassert(&mut self, handle: IrqHandle) {
        self.set_line(handle, false);
    }

    fn set_line(&mut self, handle: IrqHandle, asserted: bool) {
        if let Some(line) = self.lines.get_mut(handle.index()) {
            line.asserted = asserted;
        }
        self.recompute();
    }

    /// Rescan all lines and drive the CPU pins.
    pub fn recompute(&mut self) {
        self.level = self
            .lines
            .iter()
            .filter(|line| line.asserted)
            .map(|line| line.level)
            .max()
            .unwrap_or(0);
        if let Some(pin) = &self.cpu {
            pin.set(self.level);
        }
    }

    /// Current interrupt level (0 = none).
    #[must_use]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[must_use]
    pub fn is_asserted(&self, handle: IrqHandle) -> bool {
        self.lines
            .get(handle.index())
            .is_some_and(|line| line.asserted)
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// A device's own request line on a shared encoder.
#[derive(Debug, Clone)]
pub struct IrqLine {
    encoder: SharedEncoder,
    handle: IrqHandle,
}

impl IrqLine {
    /// Register a new line at `level` on `encoder`.
    pub fn connect(encoder: &SharedEncoder, level: u8) -> Result<Self> {
        let handle = encoder.borrow_mut().register(level)?;
        Ok(Self {
            encoder: Rc::clone(encoder),
            handle,
        })
    }

    pub fn pull(&self) {
        self.encoder.borrow_mut().assert(self.handle);
    }

    pub fn release(&self) {
        self.encoder.borrow_mut().deassert(self.handle);
    }

    #[must_use]
    pub fn is_pulled(&self) -> bool {
        self.encoder.borrow().is_asserted(self.handle)
    }

    #[must_use]
    pub fn handle(&self) -> IrqHandle {
        self.handle
    }
}
