//! # Breathing Loop
//!
//! Owns the FSM and drives it from the scheduler tick. Each `tick()`:
//!
//! 1. recompute the exhale time from the I:E ratio
//! 2. evaluate a transition if the current state's timeout has expired
//! 3. push the state's valve command to the actuator
//! 4. run calibration sampling and the readings pipeline
//! 5. emit FastData or Readback telemetry when due

use tracing::{debug, info, warn};

use super::calibration::Calibrator;
use super::readings::{ReadingAverages, ReadingPipeline};
use super::state::{next_state, BreathingState, TransitionInputs, VentilationMode};
use super::timeouts::StateTimeouts;
use super::valves::ValveCommand;
use crate::config::BreathingConfig;
use crate::ports::{ActuatorPort, Clock, SensorChannel, SensorPort};
use crate::telemetry::records::{Command, CommandCode, FastData, Readback, CMD_TYPE_GENERAL};
use crate::telemetry::Payload;

pub struct BreathingLoop<C: Clock, S: SensorPort, A: ActuatorPort> {
    clock: C,
    sensors: S,
    valves: A,
    state: BreathingState,
    mode: VentilationMode,
    running: bool,
    reset_requested: bool,
    state_entered_ms: u32,
    timeouts: StateTimeouts,
    inhale_exhale_ratio: f32,
    readings: ReadingPipeline,
    calibrator: Calibrator,
    last_valve_command: ValveCommand,
    fast_data_interval_ms: u32,
    readback_interval_ms: u32,
    last_fast_data_ms: u32,
    last_readback_ms: u32,
}

impl<C: Clock, S: SensorPort, A: ActuatorPort> BreathingLoop<C, S, A> {
    /// Create a loop in Idle, not running
    pub fn new(clock: C, sensors: S, valves: A, config: &BreathingConfig) -> Self {
        let now = clock.now_ms();

        Self {
            clock,
            sensors,
            valves,
            state: BreathingState::Idle,
            mode: config.mode,
            running: false,
            reset_requested: false,
            state_entered_ms: now,
            timeouts: config.timeouts,
            inhale_exhale_ratio: config.inhale_exhale_ratio,
            readings: ReadingPipeline::new(now),
            calibrator: Calibrator::new(now),
            last_valve_command: ValveCommand::CLOSED,
            fast_data_interval_ms: config.fast_data_interval_ms,
            readback_interval_ms: config.readback_interval_ms,
            last_fast_data_ms: now,
            last_readback_ms: now,
        }
    }

    pub fn start(&mut self) {
        if !self.running {
            info!("Breathing loop started ({:?} mode)", self.mode);
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            info!("Breathing loop stopping");
        }
        self.running = false;
    }

    /// Request the way out of Stop; honoured at the next Stop evaluation
    pub fn reset(&mut self) {
        debug!("Reset requested");
        self.reset_requested = true;
    }

    /// Force Stop with all valves closed
    pub fn fault(&mut self) {
        let now = self.clock.now_ms();
        warn!("Fault in {:?}, entering Stop", self.state);
        self.enter(BreathingState::Stop, now);
        self.readings.request_reset();
        self.apply_valves();
    }

    /// Enter Calibration; only honoured from Idle
    pub fn enter_calibration(&mut self) -> bool {
        if self.state != BreathingState::Idle {
            debug!("Calibration refused in {:?}", self.state);
            return false;
        }
        let now = self.clock.now_ms();
        self.calibrator.clear(now);
        self.enter(BreathingState::Calibration, now);
        self.readings.request_reset();
        info!("Calibration started");
        true
    }

    /// Advance the loop by one scheduler tick
    ///
    /// # Returns
    ///
    /// Telemetry due at this tick, if any
    pub fn tick(&mut self) -> Option<Payload> {
        let now = self.clock.now_ms();

        self.timeouts.exhale = self.timeouts.computed_exhale(self.inhale_exhale_ratio);
        self.evaluate_transition(now);
        self.apply_valves();

        match self.state {
            BreathingState::Calibration => self.calibrator.update(now, &mut self.sensors),
            BreathingState::Idle => self.calibrator.clear(now),
            _ => {}
        }
        self.readings.update(now, &mut self.sensors);

        self.telemetry_due(now)
    }

    /// Carry out a general command from the monitor
    ///
    /// # Returns
    ///
    /// `false` if the command is not understood
    pub fn apply_command(&mut self, command: &Command) -> bool {
        if command.cmd_type != CMD_TYPE_GENERAL {
            warn!("Ignoring command of unknown type {}", command.cmd_type);
            return false;
        }

        match CommandCode::try_from(command.cmd_code) {
            Ok(CommandCode::Start) => self.start(),
            Ok(CommandCode::Stop) => self.stop(),
            Ok(CommandCode::Reset) => self.reset(),
            Ok(CommandCode::SetMode) => match VentilationMode::try_from(command.param) {
                Ok(mode) => self.set_mode(mode),
                Err(value) => {
                    warn!("Ignoring unknown ventilation mode {}", value);
                    return false;
                }
            },
            Ok(CommandCode::Calibrate) => return self.enter_calibration(),
            Err(code) => {
                warn!("Ignoring unknown command code {}", code);
                return false;
            }
        }
        true
    }

    pub fn current_state(&self) -> BreathingState {
        self.state
    }

    pub fn current_mode(&self) -> VentilationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: VentilationMode) {
        if mode != self.mode {
            info!("Ventilation mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn reading_averages(&self) -> ReadingAverages {
        self.readings.averages()
    }

    pub fn calibration_offset(&self) -> f32 {
        self.calibrator.offset()
    }

    pub fn timeouts(&self) -> &StateTimeouts {
        &self.timeouts
    }

    pub fn timeouts_mut(&mut self) -> &mut StateTimeouts {
        &mut self.timeouts
    }

    pub fn set_timeouts(&mut self, timeouts: StateTimeouts) {
        self.timeouts = timeouts;
    }

    pub fn inhale_exhale_ratio(&self) -> f32 {
        self.inhale_exhale_ratio
    }

    pub fn set_inhale_exhale_ratio(&mut self, ratio: f32) {
        self.inhale_exhale_ratio = ratio;
    }

    pub fn last_valve_command(&self) -> ValveCommand {
        self.last_valve_command
    }

    /// FastData snapshot of the latest averages
    pub fn fast_data(&self, now: u32) -> FastData {
        let avg = self.readings.averages();
        FastData {
            timestamp: now,
            fsm_state: self.state.wire_value(),
            pressure_air_supply: avg.get(SensorChannel::PressureAirSupply),
            pressure_air_regulated: avg.get(SensorChannel::PressureAirRegulated),
            pressure_o2_supply: avg.get(SensorChannel::PressureO2Supply),
            pressure_o2_regulated: avg.get(SensorChannel::PressureO2Regulated),
            pressure_buffer: avg.get(SensorChannel::PressureBuffer),
            pressure_inhale: avg.get(SensorChannel::PressureInhale),
            pressure_patient: avg.get(SensorChannel::PressurePatient),
            temperature_buffer: avg.get(SensorChannel::TemperatureBuffer),
            pressure_diff_patient: avg.get(SensorChannel::PressureDiffPatient),
            ..FastData::default()
        }
    }

    /// Readback of the active timeouts, valve duties and mode
    pub fn readback(&self, now: u32) -> Readback {
        let t = &self.timeouts;
        let duration = |ms: u32| u16::try_from(ms).unwrap_or(u16::MAX);
        let valves = self.last_valve_command;
        let [air_in, o2_in, inhale, exhale, purge] = valves.percent();

        Readback {
            timestamp: now,
            duration_calibration: duration(t.calibration),
            duration_buffer_purge: duration(t.buffer_purge),
            duration_buffer_flush: duration(t.buffer_flush),
            duration_buffer_prefill: duration(t.buffer_prefill),
            duration_buffer_fill: duration(t.buffer_fill),
            duration_buffer_loaded: duration(t.buffer_loaded),
            duration_buffer_pre_inhale: duration(t.buffer_pre_inhale),
            duration_inhale: duration(t.inhale),
            duration_pause: duration(t.pause),
            duration_exhale_fill: duration(t.exhale_fill),
            duration_exhale: duration(t.exhale),
            valve_air_in: air_in,
            valve_o2_in: o2_in,
            valve_inhale: inhale,
            valve_exhale: exhale,
            valve_purge: purge,
            ventilation_mode: self.mode.wire_value(),
            valve_inhale_percent: inhale,
            valve_exhale_percent: exhale,
            valve_air_in_enable: u8::from(valves.air_in > 0.0),
            valve_o2_in_enable: u8::from(valves.o2_in > 0.0),
            valve_purge_enable: u8::from(valves.purge > 0.0),
            inhale_exhale_ratio: self.inhale_exhale_ratio,
            ..Readback::default()
        }
    }

    fn evaluate_transition(&mut self, now: u32) {
        let timeout = self.timeouts.timeout_for(self.state, self.mode);
        if now.wrapping_sub(self.state_entered_ms) <= timeout {
            return;
        }

        let inputs = TransitionInputs {
            running: self.running,
            mode: self.mode,
            reset_requested: self.reset_requested,
        };
        if self.state == BreathingState::Idle {
            self.reset_requested = false;
        }

        let next = next_state(self.state, inputs);
        self.enter(next, now);
        self.readings.request_reset();
    }

    fn enter(&mut self, state: BreathingState, now: u32) {
        if state != self.state {
            debug!("Breathing state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.state_entered_ms = now;
    }

    fn apply_valves(&mut self) {
        let command = ValveCommand::for_state(self.state);
        self.valves.set_valves(&command);
        self.last_valve_command = command;
    }

    fn telemetry_due(&mut self, now: u32) -> Option<Payload> {
        if now.wrapping_sub(self.last_readback_ms) >= self.readback_interval_ms {
            self.last_readback_ms = now;
            return Some(Payload::Readback(self.readback(now)));
        }
        if now.wrapping_sub(self.last_fast_data_ms) >= self.fast_data_interval_ms {
            self.last_fast_data_ms = now;
            return Some(Payload::FastData(self.fast_data(now)));
        }
        None
    }
}
