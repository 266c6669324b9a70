//! # Breathing-Cycle Controller
//!
//! Timed valve-state machine for one pneumatic breathing cycle.
//!
//! - `state`: states, modes and the pure transition table
//! - `valves`: per-state valve duties
//! - `timeouts`: per-state dwell times
//! - `readings`: 1 ms sampling, 10 ms averaging
//! - `calibration`: regulated-air offset
//! - `breathing_loop`: the tick-driven controller tying these together

pub mod breathing_loop;
pub mod calibration;
pub mod readings;
pub mod state;
pub mod timeouts;
pub mod valves;

pub use breathing_loop::BreathingLoop;
pub use readings::ReadingAverages;
pub use state::{next_state, BreathingState, TransitionInputs, VentilationMode};
pub use timeouts::StateTimeouts;
pub use valves::ValveCommand;
