//! # Telemetry Module
//!
//! Records exchanged between the controller and the monitor.
//!
//! This module handles:
//! - Fixed-layout telemetry records (fast data, readback, cycle summary, command, alarm)
//! - The tagged `Payload` carried by information frames
//! - Logging received payloads to rotating JSONL files

pub mod logger;
pub mod payload;
pub mod records;

pub use payload::{Payload, PayloadKind};
