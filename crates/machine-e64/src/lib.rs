//! E64 machine core.
//!
//! The machine is a 68000-family CPU on a 24-bit bus with a timer, a CIA, a
//! video blitter and a sound chip. Three parts are modelled here:
//!
//! - [`Mmu`]: decodes every CPU access to a device, the ROM image, a font
//!   table or video memory.
//! - [`PriorityEncoder`]: arbitrates device interrupt lines into the CPU's
//!   3-bit IPL input.
//! - [`Machine`]: runs the CPU and keeps the timer and CIA in lock-step,
//!   signals frame boundaries to the blitter and retimes the sound chip
//!   against the host audio queue.
//!
//! The CPU core and the peripherals themselves are supplied through the
//! `emu-core` traits.

pub mod audio;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
#[cfg(feature = "host-audio")]
pub mod host_audio;
pub mod machine;
pub mod mmu;
pub mod monitor;
pub mod recorder;
pub mod rom;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use audio::{AudioQueue, AudioStats, QueueBand, Retiming};
pub use config::MachineConfig;
pub use encoder::{IrqHandle, IrqLine, MAX_IRQ_LINES, PriorityEncoder, SharedEncoder};
pub use error::{MachineError, MonitorError, Result};
pub use frame::FrameClock;
pub use machine::{Machine, Mode, StepResult};
pub use mmu::{
    Chipset, LoadedBinary, Mmu, OS_FILE_END_ADDRESS, OS_FILE_START_ADDRESS,
};
pub use monitor::{MonitorScheduler, TimerEvents};
pub use recorder::WavRecorder;
pub use rom::{ROM_SIZE, RomImage, RomSource};
