//! Machine configuration.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{MachineError, Result};

pub const CPU_CLOCK_HZ: u64 = 8_000_000;
pub const SOUND_CLOCK_HZ: u64 = 985_248;
pub const FRAMES_PER_SECOND: u32 = 60;
/// Nominal host audio queue size in bytes.
pub const AUDIO_BUFFER_BYTES: usize = 8192;
pub const SAMPLE_RATE: u32 = 48_000;

/// Configuration for an E64 system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// ROM image to load on reset. `None` uses the built-in image.
    pub rom_path: Option<PathBuf>,
    /// Directory receiving sound recordings.
    pub recording_dir: PathBuf,
    pub cpu_clock_hz: u64,
    pub sound_clock_hz: u64,
    pub frames_per_second: u32,
    pub audio_buffer_bytes: usize,
    pub sample_rate: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            rom_path: None,
            recording_dir: PathBuf::from("."),
            cpu_clock_hz: CPU_CLOCK_HZ,
            sound_clock_hz: SOUND_CLOCK_HZ,
            frames_per_second: FRAMES_PER_SECOND,
            audio_buffer_bytes: AUDIO_BUFFER_BYTES,
            sample_rate: SAMPLE_RATE,
        }
    }
}

impl MachineConfig {
    /// CPU cycles in one video frame.
    #[must_use]
    pub fn cycles_per_frame(&self) -> u32 {
        (self.cpu_clock_hz / u64::from(self.frames_per_second.max(1))) as u32
    }

    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| MachineError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Like [`load`](Self::load), but logs the failure and returns the
    /// defaults.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("using default configuration: {e}");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|e| MachineError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_frame_budget() {
        assert_eq!(MachineConfig::default().cycles_per_frame(), 133_333);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: MachineConfig =
            serde_json::from_str(r#"{ "audio_buffer_bytes": 1000 }"#).expect("parse");
        assert_eq!(config.audio_buffer_bytes, 1000);
        assert_eq!(config.cpu_clock_hz, CPU_CLOCK_HZ);
        assert_eq!(config.rom_path, None);
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("e64-config-{}.json", std::process::id()));
        let config = MachineConfig {
            rom_path: Some(PathBuf::from("/roms/e64.bin")),
            frames_per_second: 50,
            ..MachineConfig::default()
        };
        config.save(&path).expect("save");
        let loaded = MachineConfig::load(&path).expect("load");
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = MachineConfig::load(Path::new("/nonexistent/e64.json")).expect_err("missing file");
        assert!(matches!(err, MachineError::Io { .. }));
    }

    #[test]
    fn malformed_file_falls_back() {
        let path = std::env::temp_dir().join(format!("e64-bad-{}.json", std::process::id()));
        fs::write(&path, "{ not json").expect("write");
        assert!(matches!(MachineConfig::load(&path), Err(MachineError::Config(_))));
        assert_eq!(MachineConfig::load_or_default(&path), MachineConfig::default());
        let _ = fs::remove_file(&path);
    }
}
