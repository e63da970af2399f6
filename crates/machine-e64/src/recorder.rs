//! Sound recording to WAV.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{MachineError, Result};

/// Writes mono 16-bit PCM samples to a WAV file.
pub struct WavRecorder {
    writer: hound::WavWriter<BufWriter<File>>,
    path: PathBuf,
    samples: u64,
}

impl WavRecorder {
    /// Create the next free `sound_NNNN.wav` in `dir`.
    pub fn create(dir: &Path, sample_rate: u32) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| MachineError::io(dir, e))?;
        let path = next_free_path(dir);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)?;
        info!("recording sound to {}", path.display());
        Ok(Self {
            writer,
            path,
            samples: 0,
        })
    }

    /// Append one sample in the range -1.0 to +1.0.
    pub fn push(&mut self, sample: f32) -> Result<()> {
        let scaled = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        self.writer.write_sample(scaled)?;
        self.samples += 1;
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Write the header and close the file.
    pub fn finalize(self) -> Result<PathBuf> {
        self.writer.finalize()?;
        info!(
            "stopped recording, {} samples in {}",
            self.samples,
            self.path.display()
        );
        Ok(self.path)
    }
}

fn next_free_path(dir: &Path) -> PathBuf {
    (0u32..)
        .map(|n| dir.join(format!("sound_{n:04}.wav")))
        .find(|path| !path.exists())
        .unwrap_or_else(|| dir.join("sound.wav"))
}
