//! Fatal configuration errors surfaced at startup.

use std::{error::Error, fmt::Display};

/// A misconfiguration that makes the pipeline unable to start.
///
/// These are reported before the control loop begins; nothing in the loop
/// itself produces them.
#[derive(Debug)]
pub enum ConfigError {
    /// The calibration pass finished without collecting a single sample,
    /// which would make the baseline a division by zero. Happens only when
    /// the configured duration or sub-interval is nonsensical.
    EmptyCalibration,
    /// The serial device could not be opened or read.
    Serial(std::io::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptyCalibration => {
                write!(f, "calibration window produced zero samples")
            }
            ConfigError::Serial(e) => write!(f, "serial link error: {e}"),
        }
    }
}

impl Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Serial(value)
    }
}
