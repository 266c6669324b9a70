//! Per-state durations

use serde::{Deserialize, Serialize};

use super::state::{BreathingState, VentilationMode};

/// Dwell time of Idle and Stop between re-evaluations
pub const IDLE_TIMEOUT_MS: u32 = 1000;

/// Pre-inhale dwell when flushing
pub const PRE_INHALE_FLUSH_TIMEOUT_MS: u32 = 100;

/// Pre-inhale dwell when purging
pub const PRE_INHALE_PURGE_TIMEOUT_MS: u32 = 500;

/// State durations in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateTimeouts {
    pub calibration: u32,
    pub buffer_prefill: u32,
    pub buffer_fill: u32,
    pub buffer_loaded: u32,
    pub buffer_pre_inhale: u32,
    pub inhale: u32,
    pub pause: u32,
    pub exhale_fill: u32,
    pub exhale: u32,
    pub buffer_purge: u32,
    pub buffer_flush: u32,
}

impl Default for StateTimeouts {
    fn default() -> Self {
        Self {
            calibration: 10000,
            buffer_prefill: 100,
            buffer_fill: 1200,
            buffer_loaded: 300,
            buffer_pre_inhale: 100,
            inhale: 1600,
            pause: 200,
            exhale_fill: 1200,
            exhale: 400,
            buffer_purge: 600,
            buffer_flush: 600,
        }
    }
}

impl StateTimeouts {
    /// How long the loop stays in `state` before the next evaluation
    pub fn timeout_for(&self, state: BreathingState, mode: VentilationMode) -> u32 {
        use BreathingState::*;

        match state {
            Idle | Stop => IDLE_TIMEOUT_MS,
            Calibration => self.calibration,
            BufferPrefill => self.buffer_prefill,
            BufferFill => self.buffer_fill,
            BufferLoaded => self.buffer_loaded,
            BufferPreInhale => match mode {
                VentilationMode::Flush => PRE_INHALE_FLUSH_TIMEOUT_MS,
                VentilationMode::Purge => PRE_INHALE_PURGE_TIMEOUT_MS,
                VentilationMode::Breathe => self.buffer_pre_inhale,
            },
            Inhale => self.inhale,
            Pause => self.pause,
            ExhaleFill => self.exhale_fill,
            Exhale => self.exhale,
            BufferPurge => self.buffer_purge,
            BufferFlush => self.buffer_flush,
        }
    }

    /// Exhale duration implied by the inhale time and the I:E ratio
    ///
    /// The buffer refill overlaps the exhale, so its duration is subtracted.
    pub fn computed_exhale(&self, inhale_exhale_ratio: f32) -> u32 {
        let total = (self.inhale as f32 * inhale_exhale_ratio.max(0.0)).round() as u32;
        total.saturating_sub(self.buffer_fill)
    }

    /// The first zero-valued field, if any
    pub fn first_zero(&self) -> Option<&'static str> {
        [
            ("calibration", self.calibration),
            ("buffer_prefill", self.buffer_prefill),
            ("buffer_fill", self.buffer_fill),
            ("buffer_loaded", self.buffer_loaded),
            ("buffer_pre_inhale", self.buffer_pre_inhale),
            ("inhale", self.inhale),
            ("pause", self.pause),
            ("exhale_fill", self.exhale_fill),
            ("buffer_purge", self.buffer_purge),
            ("buffer_flush", self.buffer_flush),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0)
        .map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_timeouts() {
        let t = StateTimeouts::default();
        assert_eq!(t.timeout_for(BreathingState::Idle, VentilationMode::Breathe), 1000);
        assert_eq!(t.timeout_for(BreathingState::Stop, VentilationMode::Purge), 1000);
    }

    #[test]
    fn test_pre_inhale_depends_on_mode() {
        let t = StateTimeouts {
            buffer_pre_inhale: 250,
            ..StateTimeouts::default()
        };
        let state = BreathingState::BufferPreInhale;
        assert_eq!(t.timeout_for(state, VentilationMode::Flush), 100);
        assert_eq!(t.timeout_for(state, VentilationMode::Purge), 500);
        assert_eq!(t.timeout_for(state, VentilationMode::Breathe), 250);
    }

    #[test]
    fn test_configured_timeouts() {
        let t = StateTimeouts::default();
        assert_eq!(t.timeout_for(BreathingState::Inhale, VentilationMode::Breathe), 1600);
        assert_eq!(t.timeout_for(BreathingState::BufferFill, VentilationMode::Breathe), 1200);
        assert_eq!(t.timeout_for(BreathingState::Calibration, VentilationMode::Breathe), 10000);
    }

    #[test]
    fn test_computed_exhale() {
        let t = StateTimeouts::default();
        assert_eq!(t.computed_exhale(1.0), 400);
        assert_eq!(t.computed_exhale(2.0), 2000);
        // Saturates rather than wrapping
        assert_eq!(t.computed_exhale(0.5), 0);
    }

    #[test]
    fn test_first_zero() {
        assert_eq!(StateTimeouts::default().first_zero(), None);
        let t = StateTimeouts {
            pause: 0,
            ..StateTimeouts::default()
        };
        assert_eq!(t.first_zero(), Some("pause"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let t: StateTimeouts = toml::from_str("inhale = 2000").unwrap();
        assert_eq!(t.inhale, 2000);
        assert_eq!(t.pause, 200);
    }
}
