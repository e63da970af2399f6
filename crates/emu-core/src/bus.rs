//! Memory bus interface.

/// Mask for the 24-bit physical address bus.
pub const ADDRESS_MASK: u32 = 0x00FF_FFFF;

/// Byte-level memory bus.
///
/// The CPU core calls back through this trait on every memory access. The
/// implementation masks addresses to 24 bits and decides which device or
/// memory region answers. There is no bus error: every address maps to
/// something.
pub trait Bus {
    /// Read a byte from the given address.
    ///
    /// Takes `&mut self` because device registers may change state when read.
    fn read_8(&mut self, address: u32) -> u8;

    /// Write a byte to the given address.
    fn write_8(&mut self, address: u32, value: u8);

    /// Read a big-endian word as two byte accesses.
    ///
    /// No alignment is enforced; the second access wraps at 16 MB.
    fn read_16(&mut self, address: u32) -> u16 {
        let hi = self.read_8(address);
        let lo = self.read_8(address.wrapping_add(1) & ADDRESS_MASK);
        u16::from(hi) << 8 | u16::from(lo)
    }

    /// Write a big-endian word as two byte accesses, high byte first.
    fn write_16(&mut self, address: u32, value: u16) {
        self.write_8(address, (value >> 8) as u8);
        self.write_8(address.wrapping_add(1) & ADDRESS_MASK, value as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatBus {
        ram: Vec<u8>,
        log: Vec<u32>,
    }

    impl Bus for FlatBus {
        fn read_8(&mut self, address: u32) -> u8 {
            self.log.push(address);
            self.ram[(address & ADDRESS_MASK) as usize]
        }

        fn write_8(&mut self, address: u32, value: u8) {
            self.log.push(address);
            self.ram[(address & ADDRESS_MASK) as usize] = value;
        }
    }

    fn make_bus() -> FlatBus {
        FlatBus {
            ram: vec![0; (ADDRESS_MASK + 1) as usize],
            log: Vec::new(),
        }
    }

    #[test]
    fn word_access_is_big_endian() {
        let mut bus = make_bus();
        bus.write_16(0x1000, 0xBEEF);
        assert_eq!(bus.ram[0x1000], 0xBE);
        assert_eq!(bus.ram[0x1001], 0xEF);
        assert_eq!(bus.read_16(0x1000), 0xBEEF);
    }

    #[test]
    fn misaligned_word_touches_adjacent_bytes() {
        let mut bus = make_bus();
        bus.write_16(0x2001, 0x1234);
        assert_eq!(bus.log, vec![0x2001, 0x2002]);
        assert_eq!(bus.ram[0x2001], 0x12);
        assert_eq!(bus.ram[0x2002], 0x34);
    }

    #[test]
    fn word_at_top_of_memory_wraps_to_zero() {
        let mut bus = make_bus();
        bus.write_16(ADDRESS_MASK, 0xA55A);
        assert_eq!(bus.ram[ADDRESS_MASK as usize], 0xA5);
        assert_eq!(bus.ram[0], 0x5A);
    }
}
