//! # HEV Controller Library
//!
//! Control and telemetry core of the HEV ventilator.
//!
//! This library drives the pneumatic breathing cycle through its timed valve
//! states and exchanges telemetry, alarms and commands with a monitor over a
//! framed, checksummed and acknowledged serial link.

pub mod breathing;
pub mod config;
pub mod error;
pub mod ports;
pub mod protocol;
pub mod requests;
pub mod serial;
pub mod telemetry;
