//! ROM image handling.
//!
//! The ROM is a flat 64K image with no header. Its first eight bytes are the
//! reset vectors (initial SSP, initial PC) which the bus mirrors at
//! `$000000`. The whole image is also visible at `$020000`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

pub const ROM_SIZE: usize = 0x1_0000;

/// Address of the ROM mirror on the bus.
pub const ROM_BASE: u32 = 0x02_0000;

/// Initial supervisor stack pointer of the built-in image.
const BUILTIN_SSP: u32 = 0x0010_0000;

/// Idle loop at ROM offset 8: `STOP #$2000` then `BRA.S` back to it.
const BUILTIN_CODE: [u8; 6] = [0x4E, 0x72, 0x20, 0x00, 0x60, 0xFA];

/// Where the current ROM image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomSource {
    BuiltIn,
    File(PathBuf),
}

impl fmt::Display for RomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuiltIn => write!(f, "built-in rom"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A 64K ROM image.
pub struct RomImage {
    bytes: Box<[u8]>,
    source: RomSource,
}

impl RomImage {
    /// The image compiled into the emulator.
    #[must_use]
    pub fn builtin() -> Self {
        let mut bytes = vec![0u8; ROM_SIZE].into_boxed_slice();
        let pc = ROM_BASE + 8;
        bytes[0..4].copy_from_slice(&BUILTIN_SSP.to_be_bytes());
        bytes[4..8].copy_from_slice(&pc.to_be_bytes());
        bytes[8..8 + BUILTIN_CODE.len()].copy_from_slice(&BUILTIN_CODE);
        Self {
            bytes,
            source: RomSource::BuiltIn,
        }
    }

    /// Load `path`, falling back to the built-in image.
    ///
    /// An unreadable file is logged and ignored. A file of the wrong size is
    /// laid over the built-in image from offset 0.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("using built-in rom");
            return Self::builtin();
        };

        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!("cannot read rom {}: {e}, using built-in rom", path.display());
                return Self::builtin();
            }
        };

        let mut image = Self::builtin();
        if data.len() != ROM_SIZE {
            warn!(
                "rom {} is {} bytes, expected {ROM_SIZE}",
                path.display(),
                data.len()
            );
        }
        let len = data.len().min(ROM_SIZE);
        image.bytes[..len].copy_from_slice(&data[..len]);
        image.source = RomSource::File(path.to_path_buf());
        info!("using rom {}", path.display());
        image
    }

    #[must_use]
    pub fn read(&self, offset: u16) -> u8 {
        self.bytes[usize::from(offset)]
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn source(&self) -> &RomSource {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_rom(name: &str, data: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("e64-{name}-{}.bin", std::process::id()));
        fs::write(&path, data).expect("write rom");
        path
    }

    #[test]
    fn builtin_vectors() {
        let rom = RomImage::builtin();
        assert_eq!(&rom.bytes()[0..4], &[0x00, 0x10, 0x00, 0x00]);
        assert_eq!(&rom.bytes()[4..8], &[0x00, 0x02, 0x00, 0x08]);
        assert_eq!(rom.read(8), 0x4E);
        assert_eq!(rom.bytes().len(), ROM_SIZE);
        assert_eq!(*rom.source(), RomSource::BuiltIn);
    }

    #[test]
    fn missing_file_uses_builtin() {
        let rom = RomImage::load(Some(Path::new("/nonexistent/e64-rom.bin")));
        assert_eq!(*rom.source(), RomSource::BuiltIn);
        assert_eq!(rom.read(4), 0x00);
        assert_eq!(rom.read(6), 0x00);
        assert_eq!(rom.read(7), 0x08);
    }

    #[test]
    fn full_size_file_replaces_image() {
        let mut data = vec![0x11u8; ROM_SIZE];
        data[0xFFFF] = 0x22;
        let path = temp_rom("full", &data);
        let rom = RomImage::load(Some(&path));
        let _ = fs::remove_file(&path);
        assert_eq!(rom.read(0), 0x11);
        assert_eq!(rom.read(0xFFFF), 0x22);
        assert_eq!(*rom.source(), RomSource::File(path));
    }

    #[test]
    fn short_file_overlays_builtin() {
        let path = temp_rom("short", &[0xAA, 0xBB]);
        let rom = RomImage::load(Some(&path));
        let _ = fs::remove_file(&path);
        assert_eq!(rom.read(0), 0xAA);
        assert_eq!(rom.read(1), 0xBB);
        // The rest is the built-in image
        assert_eq!(rom.read(5), 0x02);
        assert_eq!(rom.read(8), 0x4E);
    }
}
