//! E64 bus: address decode for the CPU.
//!
//! Memory map (24-bit, 256-byte pages):
//! - $000000-$000007: reset vectors, read from the ROM image
//! - $000800-$000FFF: I/O pages (blitter, timer, CIA, sound/analog/mixer)
//! - $010000-$01FFFF: blit context registers
//! - $020000-$02FFFF: ROM image (reads)
//! - $040000-$04FFFF: CBM font (reads)
//! - $050000-$05FFFF: Amiga font (reads)
//! - everything else: video memory, owned by the blitter
//!
//! Decode is first-match in the order listed. Writes are only decoded for the
//! I/O pages and the blit contexts; every other write lands in video memory,
//! including writes to the vector, ROM and font ranges.

use std::fs;
use std::path::{Path, PathBuf};

use emu_core::{ADDRESS_MASK, Blitter, Bus, Device, FontBank, Sound};
use log::{info, warn};

use crate::error::{MachineError, Result};
use crate::rom::{RomImage, RomSource};

pub const IO_BLITTER_PAGE: u16 = 0x08;
pub const IO_TIMER_PAGE: u16 = 0x09;
pub const IO_CIA_PAGE: u16 = 0x0A;
pub const IO_SOUND_PAGE: u16 = 0x0C;
pub const IO_ANALOG_PAGE: u16 = 0x0D;
pub const IO_MIXER_PAGE: u16 = 0x0E;

/// Guest vector receiving the start address of the last loaded binary.
pub const OS_FILE_START_ADDRESS: u32 = 0x00_0400;
/// Guest vector receiving the end address (exclusive) of the last loaded binary.
pub const OS_FILE_END_ADDRESS: u32 = 0x00_0402;

const CBM_FONT_INDEX_MASK: u32 = 0x3FFF;
const AMIGA_FONT_INDEX_MASK: u32 = 0x7FFF;

/// The peripherals reachable through the bus.
pub struct Chipset {
    pub blitter: Box<dyn Blitter>,
    pub timer: Box<dyn Device>,
    pub cia: Box<dyn Device>,
    pub sound: Box<dyn Sound>,
}

/// Result of [`Mmu::insert_binary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedBinary {
    pub start: u16,
    /// First address after the loaded bytes.
    pub end: u16,
    /// Number of bytes written.
    pub len: usize,
    /// True if bytes past `$FFFF` were dropped.
    pub truncated: bool,
}

/// The memory management unit.
pub struct Mmu {
    rom: RomImage,
    rom_path: Option<PathBuf>,
    chips: Chipset,
}

impl Mmu {
    /// Create the bus and load the ROM image.
    #[must_use]
    pub fn new(chips: Chipset, rom_path: Option<PathBuf>) -> Self {
        let rom = RomImage::load(rom_path.as_deref());
        Self {
            rom,
            rom_path,
            chips,
        }
    }

    /// Create the bus with the built-in ROM image.
    ///
    /// `rom_path` is not read until the first [`reset`](Self::reset).
    #[must_use]
    pub fn with_builtin_rom(chips: Chipset, rom_path: Option<PathBuf>) -> Self {
        Self {
            rom: RomImage::builtin(),
            rom_path,
            chips,
        }
    }

    /// Reload the ROM image. Devices are reset by the machine.
    pub fn reset(&mut self) {
        self.load_rom_image();
    }

    /// Load the configured ROM file, or the built-in image.
    pub fn load_rom_image(&mut self) {
        self.rom = RomImage::load(self.rom_path.as_deref());
    }

    /// Change the ROM file used by the next reset.
    pub fn set_rom_path(&mut self, path: Option<PathBuf>) {
        self.rom_path = path;
    }

    #[must_use]
    pub fn rom_image(&self) -> &[u8] {
        self.rom.bytes()
    }

    #[must_use]
    pub fn rom_source(&self) -> &RomSource {
        self.rom.source()
    }

    #[must_use]
    pub fn chips(&self) -> &Chipset {
        &self.chips
    }

    pub fn chips_mut(&mut self) -> &mut Chipset {
        &mut self.chips
    }

    /// Load a raw binary.
    ///
    /// The file starts with a big-endian 16-bit load address, followed by the
    /// bytes to write. Loading stops at end of file or when the address would
    /// wrap past `$FFFF`. The start and end addresses are then stored at
    /// [`OS_FILE_START_ADDRESS`] and [`OS_FILE_END_ADDRESS`].
    pub fn insert_binary(&mut self, path: &Path) -> Result<LoadedBinary> {
        let data = fs::read(path).map_err(|e| MachineError::io(path, e))?;
        let [hi, lo, payload @ ..] = data.as_slice() else {
            return Err(MachineError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "missing load address"),
            ));
        };

        let start = u16::from_be_bytes([*hi, *lo]);
        let mut end = start;
        let mut written = 0usize;
        for &byte in payload {
            self.write_8(u32::from(end), byte);
            written += 1;
            end = end.wrapping_add(1);
            if end == 0 {
                break;
            }
        }

        let truncated = written < payload.len();
        if truncated {
            warn!(
                "{}: {} bytes past $ffff dropped",
                path.display(),
                payload.len() - written
            );
        }

        let [start_hi, start_lo] = start.to_be_bytes();
        let [end_hi, end_lo] = end.to_be_bytes();
        self.write_8(OS_FILE_START_ADDRESS, start_hi);
        self.write_8(OS_FILE_START_ADDRESS + 1, start_lo);
        self.write_8(OS_FILE_END_ADDRESS, end_hi);
        self.write_8(OS_FILE_END_ADDRESS + 1, end_lo);

        info!(
            "{}: loaded ${written:04x} bytes from ${start:04x} to ${end:04x}",
            path.display()
        );

        Ok(LoadedBinary {
            start,
            end,
            len: written,
            truncated,
        })
    }
}

impl Bus for Mmu {
    fn read_8(&mut self, address: u32) -> u8 {
        let address = address & ADDRESS_MASK;
        let page = (address >> 8) as u16;

        if address < 8 {
            return self.rom.read(address as u16);
        }

        match page {
            0x0008..=0x000F => match page {
                IO_BLITTER_PAGE => self.chips.blitter.io_read_8((address & 0xFF) as u16),
                IO_TIMER_PAGE => self.chips.timer.io_read_8((address & 0xFF) as u16),
                IO_CIA_PAGE => self.chips.cia.io_read_8((address & 0xFF) as u16),
                IO_SOUND_PAGE | IO_ANALOG_PAGE | IO_MIXER_PAGE => {
                    self.chips.sound.io_read_8((address & 0x3FF) as u16)
                }
                _ => self.chips.blitter.video_memory_read_8(address),
            },
            0x0100..=0x01FF => self.chips.blitter.blit_context_read_8(address as u16),
            0x0200..=0x02FF => self.rom.read(address as u16),
            0x0400..=0x04FF => font_byte(
                &*self.chips.blitter,
                FontBank::Cbm,
                address,
                CBM_FONT_INDEX_MASK,
            ),
            0x0500..=0x05FF => font_byte(
                &*self.chips.blitter,
                FontBank::Amiga,
                address,
                AMIGA_FONT_INDEX_MASK,
            ),
            _ => self.chips.blitter.video_memory_read_8(address),
        }
    }

    fn write_8(&mut self, address: u32, value: u8) {
        let address = address & ADDRESS_MASK;
        let page = (address >> 8) as u16;

        match page {
            IO_BLITTER_PAGE => self.chips.blitter.io_write_8((address & 0xFF) as u16, value),
            IO_TIMER_PAGE => self.chips.timer.io_write_8((address & 0xFF) as u16, value),
            IO_CIA_PAGE => self.chips.cia.io_write_8((address & 0xFF) as u16, value),
            IO_SOUND_PAGE | IO_ANALOG_PAGE | IO_MIXER_PAGE => {
                self.chips.sound.io_write_8((address & 0x3FF) as u16, value);
            }
            0x0100..=0x01FF => self.chips.blitter.blit_context_write_8(address as u16, value),
            _ => self.chips.blitter.video_memory_write_8(address, value),
        }
    }
}

/// Even addresses return the high byte of the font entry, odd the low byte.
fn font_byte(blitter: &dyn Blitter, bank: FontBank, address: u32, index_mask: u32) -> u8 {
    let entry = blitter.font_entry(bank, ((address >> 1) & index_mask) as u16);
    if address & 1 == 0 {
        (entry >> 8) as u8
    } else {
        entry as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::PriorityEncoder;
    use crate::testing::test_chipset;

    fn make_mmu() -> (Mmu, crate::testing::Probes) {
        let encoder = PriorityEncoder::shared();
        let (chips, probes) = test_chipset(&encoder).expect("chipset");
        (Mmu::new(chips, None), probes)
    }

    #[test]
    fn vectors_come_from_rom() {
        let (mut mmu, _) = make_mmu();
        mmu.write_8(0x000004, 0x55);
        for a in 0..8 {
            assert_eq!(mmu.read_8(a), mmu.rom_image()[a as usize]);
        }
    }

    #[test]
    fn vector_writes_land_in_video_memory() {
        let (mut mmu, probes) = make_mmu();
        mmu.write_8(0x000003, 0x55);
        assert_eq!(probes.blitter.borrow().memory_at(3), 0x55);
    }

    #[test]
    fn io_pages_route_to_devices() {
        let (mut mmu, probes) = make_mmu();
        mmu.write_8(0x000810, 0x01);
        mmu.write_8(0x000920, 0x02);
        mmu.write_8(0x000A30, 0x03);
        mmu.write_8(0x000C40, 0x04);
        mmu.write_8(0x000D50, 0x05);
        mmu.write_8(0x000E60, 0x06);

        assert_eq!(probes.blitter.borrow().io.writes, vec![(0x10, 0x01)]);
        assert_eq!(probes.timer.borrow().writes, vec![(0x20, 0x02)]);
        assert_eq!(probes.cia.borrow().writes, vec![(0x30, 0x03)]);
        assert_eq!(
            probes.sound.borrow().io.writes,
            vec![(0x040, 0x04), (0x150, 0x05), (0x260, 0x06)]
        );
        assert_eq!(probes.blitter.borrow().memory_writes, 0);
    }

    #[test]
    fn unassigned_io_pages_are_memory() {
        let (mut mmu, probes) = make_mmu();
        mmu.write_8(0x000B00, 0x77);
        mmu.write_8(0x000F7F, 0x78);
        assert_eq!(mmu.read_8(0x000B00), 0x77);
        assert_eq!(mmu.read_8(0x000F7F), 0x78);
        assert_eq!(probes.blitter.borrow().memory_writes, 2);
    }

    #[test]
    fn blit_contexts() {
        let (mut mmu, probes) = make_mmu();
        mmu.write_8(0x01_2345, 0x9A);
        assert_eq!(probes.blitter.borrow().contexts[0x2345], 0x9A);
        assert_eq!(mmu.read_8(0x01_2345), 0x9A);
        assert_eq!(probes.blitter.borrow().memory_writes, 0);
    }

    #[test]
    fn rom_mirror_reads_and_falls_through_on_write() {
        let (mut mmu, probes) = make_mmu();
        assert_eq!(mmu.read_8(0x02_0008), 0x4E);
        assert_eq!(mmu.read_8(0x02_0009), 0x72);
        mmu.write_8(0x02_0008, 0x00);
        assert_eq!(mmu.read_8(0x02_0008), 0x4E);
        assert_eq!(probes.blitter.borrow().memory_at(0x02_0008), 0x00);
        assert_eq!(probes.blitter.borrow().memory_writes, 1);
    }

    #[test]
    fn font_bytes() {
        let (mut mmu, probes) = make_mmu();
        let blitter = probes.blitter.borrow();
        let cbm = blitter.font_entry(FontBank::Cbm, 0x0123);
        let amiga = blitter.font_entry(FontBank::Amiga, 0x4567);
        drop(blitter);

        assert_eq!(mmu.read_8(0x04_0246), (cbm >> 8) as u8);
        assert_eq!(mmu.read_8(0x04_0247), cbm as u8);
        assert_eq!(mmu.read_8(0x05_8ACE), (amiga >> 8) as u8);
        assert_eq!(mmu.read_8(0x05_8ACF), amiga as u8);
    }

    #[test]
    fn cbm_font_index_is_masked() {
        let (mut mmu, _) = make_mmu();
        // $04_8000 >> 1 = $4000, masked to entry 0
        assert_eq!(mmu.read_8(0x04_8000), mmu.read_8(0x04_0000));
        assert_eq!(mmu.read_8(0x04_8001), mmu.read_8(0x04_0001));
    }

    #[test]
    fn address_is_masked_to_24_bits() {
        let (mut mmu, _) = make_mmu();
        mmu.write_8(0xFF12_3456, 0x42);
        assert_eq!(mmu.read_8(0x0012_3456), 0x42);
        assert_eq!(mmu.read_8(0x0100_0002), mmu.rom_image()[2]);
    }

    #[test]
    fn word_access_is_big_endian() {
        let (mut mmu, _) = make_mmu();
        mmu.write_16(0x10_0000, 0xBEEF);
        assert_eq!(mmu.read_8(0x10_0000), 0xBE);
        assert_eq!(mmu.read_8(0x10_0001), 0xEF);
        assert_eq!(mmu.read_16(0x10_0000), 0xBEEF);
        // Odd address
        mmu.write_16(0x10_0011, 0x1234);
        assert_eq!(mmu.read_16(0x10_0011), 0x1234);
    }

    #[test]
    fn word_at_top_of_memory_wraps_to_vectors() {
        let (mut mmu, _) = make_mmu();
        mmu.write_8(0xFF_FFFF, 0xAB);
        let word = mmu.read_16(0xFF_FFFF);
        assert_eq!(word, (0xAB << 8) | u16::from(mmu.rom_image()[0]));
    }

    #[test]
    fn deferred_rom_is_read_on_reset() {
        let path =
            std::env::temp_dir().join(format!("e64-mmu-deferred-{}.bin", std::process::id()));
        fs::write(&path, vec![0x3Cu8; crate::rom::ROM_SIZE]).expect("write rom");
        let encoder = PriorityEncoder::shared();
        let (chips, _) = test_chipset(&encoder).expect("chipset");
        let mut mmu = Mmu::with_builtin_rom(chips, Some(path.clone()));
        assert_eq!(*mmu.rom_source(), RomSource::BuiltIn);
        mmu.reset();
        let _ = fs::remove_file(&path);
        assert_eq!(mmu.read_8(0), 0x3C);
        assert_eq!(*mmu.rom_source(), RomSource::File(path));
    }

    #[test]
    fn reset_reloads_rom() {
        let path = std::env::temp_dir().join(format!("e64-mmu-rom-{}.bin", std::process::id()));
        fs::write(&path, vec![0xC3u8; crate::rom::ROM_SIZE]).expect("write rom");
        let (mut mmu, _) = make_mmu();
        assert_eq!(*mmu.rom_source(), RomSource::BuiltIn);
        mmu.set_rom_path(Some(path.clone()));
        mmu.reset();
        let _ = fs::remove_file(&path);
        assert_eq!(mmu.read_8(0), 0xC3);
        assert_eq!(mmu.read_8(0x02_FFFF), 0xC3);
        assert_eq!(*mmu.rom_source(), RomSource::File(path));
    }
}
