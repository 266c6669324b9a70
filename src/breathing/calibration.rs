//! Regulated-air pressure calibration
//!
//! While the loop sits in Calibration the regulated-air sensor is sampled
//! every 10 ms into a running mean. The mean is exposed as an offset for the
//! caller to apply; the loop never applies it itself.

use crate::ports::{SensorChannel, SensorPort};

pub const CALIBRATION_SAMPLE_INTERVAL_MS: u32 = 10;

#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    mean: f32,
    samples: u32,
    last_sample_ms: u32,
}

impl Calibrator {
    pub fn new(now: u32) -> Self {
        Self {
            last_sample_ms: now,
            ..Self::default()
        }
    }

    pub fn update<S: SensorPort>(&mut self, now: u32, sensors: &mut S) {
        if now.wrapping_sub(self.last_sample_ms) < CALIBRATION_SAMPLE_INTERVAL_MS {
            return;
        }
        self.last_sample_ms = now;

        let sample = f32::from(sensors.read(SensorChannel::PressureAirRegulated));
        self.samples += 1;
        self.mean += (sample - self.mean) / self.samples as f32;
    }

    /// Forget all samples and restart the sample clock at `now`
    pub fn clear(&mut self, now: u32) {
        self.mean = 0.0;
        self.samples = 0;
        self.last_sample_ms = now;
    }

    pub fn offset(&self) -> f32 {
        self.mean
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }
}
