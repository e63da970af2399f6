//! Peripheral device traits.
//!
//! The timer, CIA, blitter and sound chip are external components. The bus
//! routes register accesses to them and the machine clocks them.

/// A memory-mapped peripheral clocked by the machine.
pub trait Device {
    fn reset(&mut self);

    /// Advance by `cycles` cycles of the device's own clock.
    fn run(&mut self, cycles: u32);

    /// Read a register at `offset` within the device's I/O window.
    fn io_read_8(&mut self, offset: u16) -> u8;

    /// Write a register at `offset` within the device's I/O window.
    fn io_write_8(&mut self, offset: u16, value: u8);
}

/// Built-in bitmap font selected by address region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontBank {
    Cbm,
    Amiga,
}

/// The video blitter.
///
/// Besides its register window it owns video memory, the blit contexts and the
/// built-in fonts. Video memory is the bus fallback for every unmapped address.
pub trait Blitter: Device {
    fn video_memory_read_8(&mut self, address: u32) -> u8;

    fn video_memory_write_8(&mut self, address: u32, value: u8);

    fn blit_context_read_8(&mut self, offset: u16) -> u8;

    fn blit_context_write_8(&mut self, offset: u16, value: u8);

    /// A 16-bit font entry. `index` is already masked to the bank's size.
    fn font_entry(&self, bank: FontBank, index: u16) -> u16;

    /// Called once per frame boundary.
    fn notify_screen_refreshed(&mut self);

    /// Run one queued blit. Returns false when the queue is empty.
    fn run_next_operation(&mut self) -> bool;
}

/// The sound chip, including the analog and mixer pages.
pub trait Sound: Device {
    /// Take the oldest sample from the recording buffer.
    fn record_buffer_pop(&mut self) -> Option<f32>;

    fn clear_record_buffer(&mut self);
}
