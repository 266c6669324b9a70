//! # Hardware Ports
//!
//! Traits for the collaborators the controller core consumes but does not
//! implement: a monotonic clock, analog sensors, the valve driver and the
//! serial byte transport.
//!
//! The core is generic over these traits so that the breathing loop and the
//! protocol engine run unchanged on the board, on a host simulator, and in
//! unit tests with a manually advanced clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::breathing::valves::ValveCommand;

pub mod simulated;

pub use simulated::SimulatedPlant;

/// Monotonic millisecond clock.
///
/// The returned value wraps at `u32::MAX`; callers compare instants with
/// `wrapping_sub` only.
pub trait Clock {
    /// Milliseconds since an arbitrary epoch
    fn now_ms(&self) -> u32;
}

/// Analog input channels sampled by the breathing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorChannel {
    PressureAirSupply,
    PressureAirRegulated,
    PressureBuffer,
    PressureInhale,
    PressurePatient,
    TemperatureBuffer,
    PressureO2Supply,
    PressureO2Regulated,
    PressureDiffPatient,
}

/// Source of raw analog samples
#[cfg_attr(test, mockall::automock)]
pub trait SensorPort {
    /// Read one raw converter sample from `channel`
    fn read(&mut self, channel: SensorChannel) -> u16;
}

/// Sink for valve duty commands. Fire-and-forget.
#[cfg_attr(test, mockall::automock)]
pub trait ActuatorPort {
    fn set_valves(&mut self, command: &ValveCommand);
}

/// Non-blocking byte transport.
///
/// Writes are best effort: callers check `write_available()` before writing
/// and never wait for room.
pub trait Transport {
    /// Number of received bytes ready to be read
    fn bytes_available(&self) -> usize;

    /// Pop one received byte
    fn read_byte(&mut self) -> Option<u8>;

    /// Free space in the outbound buffer
    fn write_available(&self) -> usize;

    /// Queue bytes for transmission, returning how many were accepted
    fn write_bytes(&mut self, buf: &[u8]) -> usize;
}

/// Clock backed by `std::time::Instant`
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation gives the same wrapping behaviour as a hardware millis() counter
        self.epoch.elapsed().as_millis() as u32
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time source, so a test can keep one handle and
/// advance the clock owned by the component under test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start_ms: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u32) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Move the clock forward, wrapping at `u32::MAX`
    pub fn advance(&self, ms: u32) {
        let now = self.now.load(Ordering::SeqCst);
        self.now.store(now.wrapping_add(ms), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory transport for testing
    ///
    /// Inbound bytes are pushed by the test; every accepted write is recorded
    /// as one chunk so tests can inspect individual transmissions.
    #[derive(Clone)]
    pub struct MockTransport {
        pub inbound: Arc<Mutex<VecDeque<u8>>>,
        pub written: Arc<Mutex<Vec<Vec<u8>>>>,
        pub write_capacity: Arc<Mutex<usize>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                inbound: Arc::new(Mutex::new(VecDeque::new())),
                written: Arc::new(Mutex::new(Vec::new())),
                write_capacity: Arc::new(Mutex::new(256)),
            }
        }

        pub fn push_inbound(&self, bytes: &[u8]) {
            self.inbound.lock().unwrap().extend(bytes.iter().copied());
        }

        pub fn get_written_data(&self) -> Vec<Vec<u8>> {
            self.written.lock().unwrap().clone()
        }

        pub fn take_written_data(&self) -> Vec<Vec<u8>> {
            std::mem::take(&mut *self.written.lock().unwrap())
        }

        pub fn set_write_capacity(&self, capacity: usize) {
            *self.write_capacity.lock().unwrap() = capacity;
        }
    }

    impl Transport for MockTransport {
        fn bytes_available(&self) -> usize {
            self.inbound.lock().unwrap().len()
        }

        fn read_byte(&mut self) -> Option<u8> {
            self.inbound.lock().unwrap().pop_front()
        }

        fn write_available(&self) -> usize {
            *self.write_capacity.lock().unwrap()
        }

        fn write_bytes(&mut self, buf: &[u8]) -> usize {
            self.written.lock().unwrap().push(buf.to_vec());
            buf.len()
        }
    }

    /// Sensor bank returning a fixed value per channel
    #[derive(Clone, Default)]
    pub struct FixedSensors {
        pub values: Arc<Mutex<std::collections::HashMap<SensorChannel, u16>>>,
    }

    impl FixedSensors {
        pub fn set(&self, channel: SensorChannel, value: u16) {
            self.values.lock().unwrap().insert(channel, value);
        }
    }

    impl SensorPort for FixedSensors {
        fn read(&mut self, channel: SensorChannel) -> u16 {
            self.values
                .lock()
                .unwrap()
                .get(&channel)
                .copied()
                .unwrap_or(0)
        }
    }

    /// Actuator that records every command it receives
    #[derive(Clone, Default)]
    pub struct RecordingValves {
        pub commands: Arc<Mutex<Vec<ValveCommand>>>,
    }

    impl RecordingValves {
        pub fn last(&self) -> Option<ValveCommand> {
            self.commands.lock().unwrap().last().copied()
        }
    }

    impl ActuatorPort for RecordingValves {
        fn set_valves(&mut self, command: &ValveCommand) {
            self.commands.lock().unwrap().push(*command);
        }
    }
}
