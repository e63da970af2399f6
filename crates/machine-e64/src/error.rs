//! Error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::encoder::MAX_IRQ_LINES;

/// Errors reported by the machine and its host-facing operations.
///
/// Guest activity never produces one of these: every address decodes and
/// breakpoints are a step result.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("interrupt registry full ({MAX_IRQ_LINES} lines)")]
    IrqRegistryFull,
    #[error("interrupt level {0} out of range 0-7")]
    InvalidIrqLevel(u8),
    #[error("sound recording: {0}")]
    Recording(#[from] hound::Error),
    #[error("configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("audio output: {0}")]
    Audio(String),
}

impl MachineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MachineError>;

/// Malformed monitor input. Nothing is written when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("invalid hex value '{0}'")]
    InvalidHex(String),
    #[error("line must start with '{0}'")]
    MissingPrefix(char),
    /// A field is missing or not hex. The value is its character column.
    #[error("bad value at column {0}")]
    BadColumn(usize),
}
