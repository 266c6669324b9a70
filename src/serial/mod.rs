//! # Serial Communication Module
//!
//! Host-side plumbing between the serial port and the protocol engine.
//!
//! This module handles:
//! - Opening the controller's serial port (8N1, 115200 baud by default)
//! - Probing fallback device paths
//! - Buffering bytes so the engine can poll without blocking

pub mod buffered;

pub use buffered::BufferedTransport;

use crate::config::SerialConfig;
use crate::error::{Result, VentError};
use tokio::io::{ReadHalf, WriteHalf};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Controller link baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Device paths tried after the configured one (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC devices (Arduino-class boards)
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Serial connection to the ventilator controller
pub struct SerialLink {
    /// Serial port handle
    port: tokio_serial::SerialStream,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SerialLink {
    /// Open the configured port, falling back to the usual device paths
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if no candidate device could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hev_controller::config::SerialConfig;
    /// use hev_controller::serial::SerialLink;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let link = SerialLink::open(&SerialConfig::default())?;
    ///     println!("Connected to: {}", link.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let paths = candidate_paths(&config.port);
        Self::open_with_paths(&paths, config.baud_rate)
    }

    /// Open the first device in `paths` that accepts the settings
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyACM0"])
    /// * `baud_rate` - Line speed
    ///
    /// # Returns
    ///
    /// * `Result<SerialLink>` - Connected serial port or error
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened controller link at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(VentError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port as 8N1 without flow control
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| VentError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Separate read and write halves so both can be awaited in one loop
    pub fn into_split(
        self,
    ) -> (
        ReadHalf<tokio_serial::SerialStream>,
        WriteHalf<tokio_serial::SerialStream>,
    ) {
        tokio::io::split(self.port)
    }
}

/// The configured port followed by the defaults it does not already name
fn candidate_paths(configured: &str) -> Vec<&str> {
    let mut paths = vec![configured];
    for &path in DEFAULT_DEVICE_PATHS {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}
