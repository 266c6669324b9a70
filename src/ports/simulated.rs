//! Simulated pneumatics for running the breathing loop without hardware
//!
//! One [`SimulatedPlant`] serves as both the sensor bank and the valve
//! driver. Each valve command advances the model by one millisecond: the
//! air-in valve fills the buffer, the inhale valve moves gas from the buffer
//! to the patient, and the exhale and purge valves vent.

use std::sync::{Arc, Mutex};

use super::{ActuatorPort, SensorChannel, SensorPort};
use crate::breathing::valves::ValveCommand;

/// Full scale of the simulated 12-bit converter
const ADC_MAX: f32 = 4095.0;

const SUPPLY_PRESSURE: u16 = 3000;
const REGULATED_PRESSURE: u16 = 2000;
const AMBIENT_TEMPERATURE: u16 = 512;

/// Per-millisecond flow coefficients
const FILL_RATE: f32 = 2.0;
const INHALE_RATE: f32 = 0.004;
const VENT_RATE: f32 = 0.003;

#[derive(Debug, Default)]
struct PlantState {
    buffer: f32,
    patient: f32,
    last_command: ValveCommand,
}

impl PlantState {
    fn step(&mut self, cmd: &ValveCommand) {
        let fill = (cmd.air_in + cmd.o2_in) * FILL_RATE;
        let transfer = cmd.inhale * INHALE_RATE * (self.buffer - self.patient).max(0.0);
        let buffer_vent = cmd.purge * VENT_RATE * self.buffer;
        let patient_vent = cmd.exhale * VENT_RATE * self.patient;

        self.buffer = (self.buffer + fill - transfer - buffer_vent).clamp(0.0, ADC_MAX);
        self.patient = (self.patient + transfer - patient_vent).clamp(0.0, ADC_MAX);
        self.last_command = *cmd;
    }
}

/// Shared model; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct SimulatedPlant {
    state: Arc<Mutex<PlantState>>,
}

impl SimulatedPlant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_pressure(&self) -> f32 {
        self.with_state(|s| s.buffer)
    }

    pub fn patient_pressure(&self) -> f32 {
        self.with_state(|s| s.patient)
    }

    /// Most recent valve command applied to the model
    pub fn last_command(&self) -> ValveCommand {
        self.with_state(|s| s.last_command)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut PlantState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl SensorPort for SimulatedPlant {
    fn read(&mut self, channel: SensorChannel) -> u16 {
        let (buffer, patient) = self.with_state(|s| (s.buffer, s.patient));

        match channel {
            SensorChannel::PressureAirSupply | SensorChannel::PressureO2Supply => SUPPLY_PRESSURE,
            SensorChannel::PressureAirRegulated | SensorChannel::PressureO2Regulated => {
                REGULATED_PRESSURE
            }
            SensorChannel::PressureBuffer => buffer as u16,
            SensorChannel::PressureInhale => ((buffer + patient) / 2.0) as u16,
            SensorChannel::PressurePatient => patient as u16,
            SensorChannel::PressureDiffPatient => (buffer - patient).max(0.0) as u16,
            SensorChannel::TemperatureBuffer => AMBIENT_TEMPERATURE,
        }
    }
}

impl ActuatorPort for SimulatedPlant {
    fn set_valves(&mut self, command: &ValveCommand) {
        self.with_state(|s| s.step(command));
    }
}
