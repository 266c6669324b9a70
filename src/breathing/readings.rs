//! Sensor sampling and windowed averaging
//!
//! Every channel is sampled once per millisecond into running sums. Every
//! 10 ms the sums are reduced to averages and cleared. A pending reset
//! discards the current window so an average never spans two FSM states.

use crate::ports::{SensorChannel, SensorPort};

pub const SAMPLE_INTERVAL_MS: u32 = 1;
pub const AVERAGE_INTERVAL_MS: u32 = 10;

#[cfg(not(feature = "full-system"))]
pub const SAMPLED_CHANNELS: &[SensorChannel] = &[
    SensorChannel::PressureAirSupply,
    SensorChannel::PressureAirRegulated,
    SensorChannel::PressureBuffer,
    SensorChannel::PressureInhale,
    SensorChannel::PressurePatient,
    SensorChannel::TemperatureBuffer,
];

#[cfg(feature = "full-system")]
pub const SAMPLED_CHANNELS: &[SensorChannel] = &[
    SensorChannel::PressureAirSupply,
    SensorChannel::PressureAirRegulated,
    SensorChannel::PressureBuffer,
    SensorChannel::PressureInhale,
    SensorChannel::PressurePatient,
    SensorChannel::TemperatureBuffer,
    SensorChannel::PressureO2Supply,
    SensorChannel::PressureO2Regulated,
    SensorChannel::PressureDiffPatient,
];

const CHANNEL_COUNT: usize = 9;

fn channel_index(channel: SensorChannel) -> usize {
    match channel {
        SensorChannel::PressureAirSupply => 0,
        SensorChannel::PressureAirRegulated => 1,
        SensorChannel::PressureBuffer => 2,
        SensorChannel::PressureInhale => 3,
        SensorChannel::PressurePatient => 4,
        SensorChannel::TemperatureBuffer => 5,
        SensorChannel::PressureO2Supply => 6,
        SensorChannel::PressureO2Regulated => 7,
        SensorChannel::PressureDiffPatient => 8,
    }
}

/// Latest averaged window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadingAverages {
    /// Mean sample time of the window
    pub timestamp: u32,
    values: [u16; CHANNEL_COUNT],
}

impl ReadingAverages {
    /// Averaged raw value of `channel`; zero for channels not sampled
    pub fn get(&self, channel: SensorChannel) -> u16 {
        self.values[channel_index(channel)]
    }
}

/// Running sums for the current window
#[derive(Debug, Clone, Default)]
pub struct ReadingAccumulator {
    timestamp_sum: u64,
    sums: [u64; CHANNEL_COUNT],
    count: u32,
}

impl ReadingAccumulator {
    pub fn add<S: SensorPort>(&mut self, now: u32, sensors: &mut S) {
        self.timestamp_sum += u64::from(now);
        for &channel in SAMPLED_CHANNELS {
            self.sums[channel_index(channel)] += u64::from(sensors.read(channel));
        }
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Mean of the window, or `None` if nothing was sampled
    pub fn mean(&self) -> Option<ReadingAverages> {
        if self.count == 0 {
            return None;
        }
        let n = u64::from(self.count);
        Some(ReadingAverages {
            timestamp: (self.timestamp_sum / n) as u32,
            values: self.sums.map(|sum| (sum / n) as u16),
        })
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Sampling and averaging schedule
#[derive(Debug, Clone)]
pub struct ReadingPipeline {
    accumulator: ReadingAccumulator,
    averages: ReadingAverages,
    last_sample_ms: u32,
    last_average_ms: u32,
    reset_pending: bool,
}

impl ReadingPipeline {
    pub fn new(now: u32) -> Self {
        Self {
            accumulator: ReadingAccumulator::default(),
            averages: ReadingAverages::default(),
            last_sample_ms: now,
            last_average_ms: now,
            reset_pending: false,
        }
    }

    /// Discard the current window on the next update
    pub fn request_reset(&mut self) {
        self.reset_pending = true;
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    pub fn update<S: SensorPort>(&mut self, now: u32, sensors: &mut S) {
        if now.wrapping_sub(self.last_sample_ms) >= SAMPLE_INTERVAL_MS {
            self.accumulator.add(now, sensors);
            self.last_sample_ms = now;
        }

        if self.reset_pending {
            self.accumulator.clear();
            self.reset_pending = false;
            self.last_sample_ms = now;
            self.last_average_ms = now;
        } else if now.wrapping_sub(self.last_average_ms) >= AVERAGE_INTERVAL_MS {
            if let Some(averages) = self.accumulator.mean() {
                self.averages = averages;
            }
            self.accumulator.clear();
            self.last_average_ms = now;
        }
    }

    pub fn averages(&self) -> ReadingAverages {
        self.averages
    }

    pub fn accumulator(&self) -> &ReadingAccumulator {
        &self.accumulator
    }
}
