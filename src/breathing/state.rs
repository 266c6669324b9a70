//! Breathing-cycle states and the transition table

use serde::{Deserialize, Serialize};

/// FSM state; the discriminant is the wire value reported in FastData
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[repr(u8)]
pub enum BreathingState {
    #[default]
    Idle = 0,
    Calibration = 1,
    BufferPrefill = 2,
    BufferFill = 3,
    BufferLoaded = 4,
    BufferPreInhale = 5,
    Inhale = 6,
    Pause = 7,
    ExhaleFill = 8,
    Exhale = 9,
    BufferPurge = 10,
    BufferFlush = 11,
    Stop = 12,
}

impl BreathingState {
    pub const ALL: [BreathingState; 13] = [
        BreathingState::Idle,
        BreathingState::Calibration,
        BreathingState::BufferPrefill,
        BreathingState::BufferFill,
        BreathingState::BufferLoaded,
        BreathingState::BufferPreInhale,
        BreathingState::Inhale,
        BreathingState::Pause,
        BreathingState::ExhaleFill,
        BreathingState::Exhale,
        BreathingState::BufferPurge,
        BreathingState::BufferFlush,
        BreathingState::Stop,
    ];

    pub fn wire_value(self) -> u8 {
        self as u8
    }
}

/// Buffer handling selected for the next cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum VentilationMode {
    #[default]
    Breathe = 0,
    Purge = 1,
    Flush = 2,
}

impl VentilationMode {
    pub fn wire_value(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u32> for VentilationMode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VentilationMode::Breathe),
            1 => Ok(VentilationMode::Purge),
            2 => Ok(VentilationMode::Flush),
            other => Err(other),
        }
    }
}

/// Flags the transition table reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransitionInputs {
    pub running: bool,
    pub mode: VentilationMode,
    pub reset_requested: bool,
}

/// State that follows `state` once its timeout has expired
pub fn next_state(state: BreathingState, inputs: TransitionInputs) -> BreathingState {
    use BreathingState::*;

    match state {
        Idle => {
            if inputs.running {
                BufferPrefill
            } else {
                Idle
            }
        }
        Calibration => BufferPrefill,
        BufferPrefill => BufferFill,
        BufferFill => BufferLoaded,
        BufferLoaded => match inputs.mode {
            VentilationMode::Flush => BufferFlush,
            VentilationMode::Purge => BufferPurge,
            VentilationMode::Breathe => BufferPreInhale,
        },
        BufferPreInhale => Inhale,
        Inhale => Pause,
        Pause => ExhaleFill,
        ExhaleFill => Exhale,
        Exhale | BufferPurge => {
            if !inputs.running {
                Idle
            } else if state == Exhale {
                BufferLoaded
            } else {
                BufferPrefill
            }
        }
        BufferFlush => Idle,
        Stop => {
            if inputs.reset_requested {
                Idle
            } else {
                Stop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BreathingState::*;

    fn all_inputs() -> Vec<TransitionInputs> {
        let mut inputs = Vec::new();
        for running in [false, true] {
            for reset_requested in [false, true] {
                for mode in [VentilationMode::Breathe, VentilationMode::Purge, VentilationMode::Flush] {
                    inputs.push(TransitionInputs {
                        running,
                        mode,
                        reset_requested,
                    });
                }
            }
        }
        inputs
    }

    fn expected(state: BreathingState, i: TransitionInputs) -> BreathingState {
        match (state, i.running, i.mode, i.reset_requested) {
            (Idle, true, _, _) => BufferPrefill,
            (Idle, false, _, _) => Idle,
            (Calibration, ..) => BufferPrefill,
            (BufferPrefill, ..) => BufferFill,
            (BufferFill, ..) => BufferLoaded,
            (BufferLoaded, _, VentilationMode::Flush, _) => BufferFlush,
            (BufferLoaded, _, VentilationMode::Purge, _) => BufferPurge,
            (BufferLoaded, _, VentilationMode::Breathe, _) => BufferPreInhale,
            (BufferPreInhale, ..) => Inhale,
            (Inhale, ..) => Pause,
            (Pause, ..) => ExhaleFill,
            (ExhaleFill, ..) => Exhale,
            (Exhale, true, _, _) => BufferLoaded,
            (Exhale, false, _, _) => Idle,
            (BufferPurge, true, _, _) => BufferPrefill,
            (BufferPurge, false, _, _) => Idle,
            (BufferFlush, ..) => Idle,
            (Stop, _, _, true) => Idle,
            (Stop, _, _, false) => Stop,
        }
    }

    #[test]
    fn test_full_transition_table() {
        for state in BreathingState::ALL {
            for inputs in all_inputs() {
                assert_eq!(
                    next_state(state, inputs),
                    expected(state, inputs),
                    "{:?} with {:?}",
                    state,
                    inputs
                );
            }
        }
    }

    #[test]
    fn test_breathe_cycle_loops_through_buffer_loaded() {
        let inputs = TransitionInputs {
            running: true,
            ..TransitionInputs::default()
        };
        let mut state = Idle;
        let mut visited = vec![state];
        for _ in 0..9 {
            state = next_state(state, inputs);
            visited.push(state);
        }
        assert_eq!(
            visited,
            vec![
                Idle,
                BufferPrefill,
                BufferFill,
                BufferLoaded,
                BufferPreInhale,
                Inhale,
                Pause,
                ExhaleFill,
                Exhale,
                BufferLoaded
            ]
        );
    }

    #[test]
    fn test_wire_values() {
        for (index, state) in BreathingState::ALL.iter().enumerate() {
            assert_eq!(state.wire_value() as usize, index);
        }
        assert_eq!(VentilationMode::Flush.wire_value(), 2);
        assert_eq!(VentilationMode::try_from(1), Ok(VentilationMode::Purge));
        assert_eq!(VentilationMode::try_from(3), Err(3));
    }

    #[test]
    fn test_mode_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: VentilationMode,
        }
        let parsed: Wrapper = toml::from_str("mode = \"purge\"").unwrap();
        assert_eq!(parsed.mode, VentilationMode::Purge);
    }
}
