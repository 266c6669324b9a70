//! Per-state valve duties

use super::state::BreathingState;

/// Fractional valve openings, `0.0` closed to `1.0` fully open
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ValveCommand {
    pub air_in: f32,
    pub o2_in: f32,
    pub inhale: f32,
    pub exhale: f32,
    pub purge: f32,
}

impl ValveCommand {
    pub const CLOSED: ValveCommand = ValveCommand::new(0.0, 0.0, 0.0, 0.0, 0.0);

    pub const fn new(air_in: f32, o2_in: f32, inhale: f32, exhale: f32, purge: f32) -> Self {
        Self {
            air_in,
            o2_in,
            inhale,
            exhale,
            purge,
        }
    }

    /// Valve settings held while in `state`
    pub fn for_state(state: BreathingState) -> Self {
        use BreathingState::*;

        match state {
            Idle | BufferPreInhale | Pause | Stop => Self::CLOSED,
            Calibration => Self::new(0.0, 0.0, 0.9, 0.9, 1.0),
            BufferPrefill | BufferLoaded => Self::new(0.0, 0.0, 0.0, 0.8, 0.0),
            BufferFill => Self::new(1.0, 1.0, 0.0, 0.8, 0.0),
            Inhale => Self::new(0.0, 0.0, 0.8, 0.0, 0.0),
            ExhaleFill => Self::new(1.0, 1.0, 0.0, 0.9, 0.0),
            Exhale => Self::new(0.0, 0.0, 0.0, 0.9, 0.0),
            BufferPurge => Self::new(0.0, 0.0, 0.0, 0.9, 1.0),
            BufferFlush => Self::new(0.0, 0.0, 0.9, 0.9, 0.0),
        }
    }

    /// Duties in valve order (air_in, o2_in, inhale, exhale, purge)
    pub fn as_array(&self) -> [f32; 5] {
        [self.air_in, self.o2_in, self.inhale, self.exhale, self.purge]
    }

    /// Integer duties for a PWM driver with full scale `max`
    ///
    /// # Examples
    ///
    /// ```
    /// use hev_controller::breathing::valves::ValveCommand;
    ///
    /// let cmd = ValveCommand::new(1.0, 0.0, 0.5, 0.9, 0.0);
    /// assert_eq!(cmd.duty_cycles(200), [200, 0, 100, 180, 0]);
    /// ```
    pub fn duty_cycles(&self, max: u16) -> [u16; 5] {
        self.as_array()
            .map(|duty| (duty.clamp(0.0, 1.0) * f32::from(max)).round() as u16)
    }

    /// Duties as whole percent, as reported in Readback
    pub fn percent(&self) -> [u8; 5] {
        self.as_array()
            .map(|duty| (duty.clamp(0.0, 1.0) * 100.0).round() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_states() {
        for state in [
            BreathingState::Idle,
            BreathingState::BufferPreInhale,
            BreathingState::Pause,
            BreathingState::Stop,
        ] {
            assert_eq!(ValveCommand::for_state(state), ValveCommand::CLOSED);
        }
    }

    #[test]
    fn test_valve_table() {
        assert_eq!(
            ValveCommand::for_state(BreathingState::BufferFill).as_array(),
            [1.0, 1.0, 0.0, 0.8, 0.0]
        );
        assert_eq!(
            ValveCommand::for_state(BreathingState::Inhale).as_array(),
            [0.0, 0.0, 0.8, 0.0, 0.0]
        );
        assert_eq!(
            ValveCommand::for_state(BreathingState::Calibration).as_array(),
            [0.0, 0.0, 0.9, 0.9, 1.0]
        );
        assert_eq!(
            ValveCommand::for_state(BreathingState::BufferPurge).as_array(),
            [0.0, 0.0, 0.0, 0.9, 1.0]
        );
    }

    #[test]
    fn test_duty_cycles_clamp() {
        let cmd = ValveCommand::new(1.5, -0.2, 0.8, 0.9, 1.0);
        assert_eq!(cmd.duty_cycles(1000), [1000, 0, 800, 900, 1000]);
        assert_eq!(cmd.percent(), [100, 0, 80, 90, 100]);
    }
}
