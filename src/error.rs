//! # Error Types
//!
//! Custom error types for the HEV controller using `thiserror`.

use thiserror::Error;

/// Main error type for the HEV controller
#[derive(Debug, Error)]
pub enum VentError {
    /// Frame would exceed the maximum wire size
    #[error("Payload of {info_len} bytes exceeds maximum frame information size {max}")]
    OversizedPayload { info_len: usize, max: usize },

    /// Malformed frame on the wire
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Information bytes that do not match any telemetry record
    #[error("Unknown record for address 0x{address:02X} with {len} bytes")]
    UnknownRecord { address: u8, len: usize },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Telemetry log serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the HEV controller
pub type Result<T> = std::result::Result<T, VentError>;
