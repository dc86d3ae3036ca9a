//! Host-side error type.

use esp8266_at::AtError;
use thiserror::Error;

/// Errors from the host adapter and the probe tool
#[derive(Error, Debug)]
pub enum HostError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("module error: {0}")]
    At(#[from] AtError),

    #[error("no Wi-Fi credentials given")]
    MissingCredentials,

    #[error("no remote endpoint given")]
    MissingRemote,

    #[error("module did not answer at any candidate baud rate")]
    NoAnswer,
}

pub type HostResult<T> = Result<T, HostError>;
