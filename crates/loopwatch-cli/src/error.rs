//! Error types for the loopwatch CLI

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid stall script '{spec}': {reason}")]
    InvalidStall { spec: String, reason: String },

    #[error("Watchdog error: {0}")]
    Watchdog(#[from] loopwatch::WatchdogError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidConfiguration(_)
            | Self::InvalidStall { .. }
            | Self::JsonError(_)
            | Self::YamlError(_) => 4,
            Self::Watchdog(_) => 5,
            Self::IoError(_) => 1,
        }
    }
}
