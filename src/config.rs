//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::breathing::{StateTimeouts, VentilationMode};
use crate::error::{Result, VentError};

/// Which end of the link this process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Receive telemetry and log it
    #[default]
    Monitor,
    /// Run the breathing loop against simulated hardware
    Simulator,
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub role: Role,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub breathing: BreathingConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub requests: RequestConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Capacity of each direction of the buffered transport
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// Link protocol configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    #[serde(default = "default_alarm_timeout_ms")]
    pub alarm_timeout_ms: u32,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u32,

    #[serde(default = "default_data_timeout_ms")]
    pub data_timeout_ms: u32,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Transmissions of one frame before it is dropped; 0 retries forever
    #[serde(default = "default_max_retransmissions")]
    pub max_retransmissions: u32,
}

/// Breathing loop configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BreathingConfig {
    #[serde(default)]
    pub mode: VentilationMode,

    #[serde(default = "default_inhale_exhale_ratio")]
    pub inhale_exhale_ratio: f32,

    #[serde(default = "default_fast_data_interval_ms")]
    pub fast_data_interval_ms: u32,

    #[serde(default = "default_readback_interval_ms")]
    pub readback_interval_ms: u32,

    /// Start breathing as soon as the simulator comes up
    #[serde(default)]
    pub autostart: bool,

    #[serde(default)]
    pub timeouts: StateTimeouts,
}

/// Received-telemetry log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_telemetry_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Monitor request socket for submitting commands
#[derive(Debug, Deserialize, Clone)]
pub struct RequestConfig {
    #[serde(default = "default_requests_enabled")]
    pub enabled: bool,

    #[serde(default = "default_request_address")]
    pub bind_address: String,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_buffer_size() -> usize { 1024 }

fn default_alarm_timeout_ms() -> u32 { 5 }
fn default_command_timeout_ms() -> u32 { 50 }
fn default_data_timeout_ms() -> u32 { 10 }
fn default_queue_capacity() -> usize { 2 }
fn default_max_retransmissions() -> u32 { 20 }

fn default_inhale_exhale_ratio() -> f32 { 1.0 }
fn default_fast_data_interval_ms() -> u32 { 10 }
fn default_readback_interval_ms() -> u32 { 1000 }

fn default_telemetry_enabled() -> bool { true }
fn default_telemetry_dir() -> String { "./telemetry".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_requests_enabled() -> bool { true }
fn default_request_address() -> String { "127.0.0.1:54321".to_string() }

fn default_log_level() -> String { "info".to_string() }
fn default_log_file_prefix() -> String { "hev-controller.log".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            alarm_timeout_ms: default_alarm_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            data_timeout_ms: default_data_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            max_retransmissions: default_max_retransmissions(),
        }
    }
}

impl Default for BreathingConfig {
    fn default() -> Self {
        Self {
            mode: VentilationMode::default(),
            inhale_exhale_ratio: default_inhale_exhale_ratio(),
            fast_data_interval_ms: default_fast_data_interval_ms(),
            readback_interval_ms: default_readback_interval_ms(),
            autostart: false,
            timeouts: StateTimeouts::default(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_telemetry_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            enabled: default_requests_enabled(),
            bind_address: default_request_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
            file_prefix: default_log_file_prefix(),
        }
    }
}

/// Baud rates the controller firmware can be built for
const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn invalid(message: impl std::fmt::Display) -> VentError {
    VentError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hev_controller::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        if self.serial.buffer_size < 128 {
            return Err(invalid("buffer_size must be at least 128"));
        }

        // Protocol
        let p = &self.protocol;
        for (name, value) in [
            ("alarm_timeout_ms", p.alarm_timeout_ms),
            ("command_timeout_ms", p.command_timeout_ms),
            ("data_timeout_ms", p.data_timeout_ms),
        ] {
            if value == 0 || value > 10000 {
                return Err(invalid(format!("{} must be between 1 and 10000", name)));
            }
        }

        if !(p.alarm_timeout_ms < p.data_timeout_ms && p.data_timeout_ms < p.command_timeout_ms) {
            return Err(invalid(
                "resend timeouts must satisfy alarm < data < command",
            ));
        }

        if p.queue_capacity == 0 || p.queue_capacity > 16 {
            return Err(invalid("queue_capacity must be between 1 and 16"));
        }

        // Breathing
        let b = &self.breathing;
        if !b.inhale_exhale_ratio.is_finite()
            || b.inhale_exhale_ratio <= 0.0
            || b.inhale_exhale_ratio > 4.0
        {
            return Err(invalid("inhale_exhale_ratio must be greater than 0.0 and at most 4.0"));
        }

        if b.fast_data_interval_ms == 0 {
            return Err(invalid("fast_data_interval_ms must be greater than 0"));
        }

        if b.readback_interval_ms < b.fast_data_interval_ms {
            return Err(invalid(
                "readback_interval_ms must not be shorter than fast_data_interval_ms",
            ));
        }

        if let Some(name) = b.timeouts.first_zero() {
            return Err(invalid(format!("breathing timeout {} must be greater than 0", name)));
        }

        // Telemetry log
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        // Request socket
        if self.requests.enabled && self.requests.bind_address.parse::<SocketAddr>().is_err() {
            return Err(invalid(format!(
                "requests bind_address '{}' is not a valid socket address",
                self.requests.bind_address
            )));
        }

        // Logging
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "log level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        if self.logging.log_dir.as_deref() == Some("") {
            return Err(invalid("logging log_dir cannot be empty when set"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.role, Role::Monitor);
        assert_eq!(config.serial.baud_rate, 115200);
    }

    #[test]
    fn test_default_protocol_timeouts() {
        let p = ProtocolConfig::default();
        assert_eq!(p.alarm_timeout_ms, 5);
        assert_eq!(p.data_timeout_ms, 10);
        assert_eq!(p.command_timeout_ms, 50);
        assert_eq!(p.queue_capacity, 2);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
role = "simulator"

[serial]
port = "/dev/ttyUSB0"

[protocol]
max_retransmissions = 0

[breathing]
mode = "flush"
inhale_exhale_ratio = 2.0

[breathing.timeouts]
inhale = 1800

[telemetry]

[logging]
level = "debug"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.role, Role::Simulator);
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.protocol.max_retransmissions, 0);
        assert_eq!(config.protocol.data_timeout_ms, 10);
        assert_eq!(config.breathing.mode, VentilationMode::Flush);
        assert_eq!(config.breathing.timeouts.inhale, 1800);
        assert_eq!(config.breathing.timeouts.pause, 200);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.protocol, ProtocolConfig::default());
        assert_eq!(config.breathing, BreathingConfig::default());
    }

    #[test]
    fn test_shipped_default_config_is_valid() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml"));
        assert!(config.is_ok(), "{:?}", config.err());
    }

    #[test]
    fn test_missing_file() {
        match Config::load("/nonexistent/hev.toml") {
            Err(VentError::Io(_)) => {}
            other => panic!("Expected Io error, got: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert!(matches!(
            Config::from_toml("role = \"ventilator\""),
            Err(VentError::Config(_))
        ));
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = Config::default();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &rate in SUPPORTED_BAUD_RATES {
            let mut config = Config::default();
            config.serial.baud_rate = rate;
            assert!(config.validate().is_ok(), "baud rate {} should be valid", rate);
        }
    }

    #[test]
    fn test_small_buffer_rejected() {
        let mut config = Config::default();
        config.serial.buffer_size = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_resend_timeout() {
        let mut config = Config::default();
        config.protocol.alarm_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resend_timeout_order() {
        let mut config = Config::default();
        config.protocol.data_timeout_ms = 60;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.protocol.alarm_timeout_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_queue_capacity_bounds() {
        let mut config = Config::default();
        config.protocol.queue_capacity = 0;
        assert!(config.validate().is_err());

        config.protocol.queue_capacity = 17;
        assert!(config.validate().is_err());

        config.protocol.queue_capacity = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inhale_exhale_ratio_bounds() {
        for ratio in [0.0, -1.0, 4.5, f32::NAN] {
            let mut config = Config::default();
            config.breathing.inhale_exhale_ratio = ratio;
            assert!(config.validate().is_err(), "ratio {} should be rejected", ratio);
        }
    }

    #[test]
    fn test_zero_state_timeout() {
        let mut config = Config::default();
        config.breathing.timeouts.inhale = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_telemetry_intervals() {
        let mut config = Config::default();
        config.breathing.fast_data_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.breathing.readback_interval_ms = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = Config::default();
        config.telemetry.enabled = true;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.telemetry.enabled = false;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_records_per_file_zero() {
        let mut config = Config::default();
        config.telemetry.max_records_per_file = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_files_to_keep_zero() {
        let mut config = Config::default();
        config.telemetry.max_files_to_keep = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_bind_address() {
        let mut config = Config::default();
        config.requests.bind_address = "localhost".to_string();
        assert!(config.validate().is_err());

        config.requests.enabled = false;
        assert!(config.validate().is_ok());

        let config = Config::from_toml("[requests]\nbind_address = \"0.0.0.0:6000\"").unwrap();
        assert!(config.requests.enabled);
        assert_eq!(config.requests.bind_address, "0.0.0.0:6000");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_logging_dir() {
        let mut config = Config::default();
        config.logging.log_dir = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_serial_port(), "/dev/ttyACM0");
        assert_eq!(default_request_address(), "127.0.0.1:54321");
        assert_eq!(default_max_retransmissions(), 20);
        assert_eq!(default_inhale_exhale_ratio(), 1.0);
        assert_eq!(default_fast_data_interval_ms(), 10);
        assert_eq!(default_readback_interval_ms(), 1000);
        assert_eq!(default_telemetry_dir(), "./telemetry");
        assert_eq!(default_log_level(), "info");
    }
}
