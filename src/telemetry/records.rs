//! # Telemetry Records
//!
//! Fixed-layout records exchanged with the monitor. Every record starts with
//! the format version byte and a 32-bit millisecond timestamp, followed by its
//! fields packed without padding in little-endian byte order.

use serde::Serialize;

use crate::error::{Result, VentError};

/// Format version carried in the first byte of every record
pub const FORMAT_VERSION: u8 = 0xA2;

/// FastData record size (version + timestamp + state + 11×u16 + 3×f32)
pub const FAST_DATA_SIZE: usize = 40;

/// Readback record size
pub const READBACK_SIZE: usize = 45;

/// CycleSummary record size
pub const CYCLE_SUMMARY_SIZE: usize = 55;

/// Command record size
pub const COMMAND_SIZE: usize = 11;

/// Alarm record size
pub const ALARM_SIZE: usize = 11;

/// Command type for general controller commands
pub const CMD_TYPE_GENERAL: u8 = 0x01;

/// General command codes understood by the breathing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandCode {
    Start = 1,
    Stop = 2,
    Reset = 3,
    SetMode = 4,
    Calibrate = 5,
}

impl TryFrom<u8> for CommandCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Start),
            2 => Ok(Self::Stop),
            3 => Ok(Self::Reset),
            4 => Ok(Self::SetMode),
            5 => Ok(Self::Calibrate),
            other => Err(other),
        }
    }
}

/// Little-endian packer for record fields
struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    fn new(size: usize, timestamp: u32) -> Self {
        let mut buf = Vec::with_capacity(size);
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&timestamp.to_le_bytes());
        Self { buf }
    }

    fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn f32(&mut self, value: f32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// Little-endian unpacker; length is validated once up front
struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn new(data: &'a [u8], size: usize, name: &str) -> Result<Self> {
        if data.len() != size {
            return Err(VentError::InvalidFrame(format!(
                "{} record must be {} bytes, got {}",
                name,
                size,
                data.len()
            )));
        }
        if data[0] != FORMAT_VERSION {
            return Err(VentError::InvalidFrame(format!(
                "{} record has unsupported version 0x{:02X}",
                name, data[0]
            )));
        }
        Ok(Self { data, pos: 1 })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}

/// Instantaneous readings sampled every control cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FastData {
    pub version: u8,
    pub timestamp: u32,
    pub fsm_state: u8,
    pub pressure_air_supply: u16,
    pub pressure_air_regulated: u16,
    pub pressure_o2_supply: u16,
    pub pressure_o2_regulated: u16,
    pub pressure_buffer: u16,
    pub pressure_inhale: u16,
    pub pressure_patient: u16,
    pub temperature_buffer: u16,
    pub pressure_diff_patient: u16,
    pub ambient_pressure: u16,
    pub ambient_temperature: u16,
    pub airway_pressure: f32,
    pub flow: f32,
    pub volume: f32,
}

impl Default for FastData {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            timestamp: 0,
            fsm_state: 0,
            pressure_air_supply: 0,
            pressure_air_regulated: 0,
            pressure_o2_supply: 0,
            pressure_o2_regulated: 0,
            pressure_buffer: 0,
            pressure_inhale: 0,
            pressure_patient: 0,
            temperature_buffer: 0,
            pressure_diff_patient: 0,
            ambient_pressure: 0,
            ambient_temperature: 0,
            airway_pressure: 0.0,
            flow: 0.0,
            volume: 0.0,
        }
    }
}

impl FastData {
    pub fn to_bytes(&self) -> Vec<u8> {
        RecordWriter::new(FAST_DATA_SIZE, self.timestamp)
            .u8(self.fsm_state)
            .u16(self.pressure_air_supply)
            .u16(self.pressure_air_regulated)
            .u16(self.pressure_o2_supply)
            .u16(self.pressure_o2_regulated)
            .u16(self.pressure_buffer)
            .u16(self.pressure_inhale)
            .u16(self.pressure_patient)
            .u16(self.temperature_buffer)
            .u16(self.pressure_diff_patient)
            .u16(self.ambient_pressure)
            .u16(self.ambient_temperature)
            .f32(self.airway_pressure)
            .f32(self.flow)
            .f32(self.volume)
            .finish()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data, FAST_DATA_SIZE, "FastData")?;
        Ok(Self {
            version: FORMAT_VERSION,
            timestamp: r.u32(),
            fsm_state: r.u8(),
            pressure_air_supply: r.u16(),
            pressure_air_regulated: r.u16(),
            pressure_o2_supply: r.u16(),
            pressure_o2_regulated: r.u16(),
            pressure_buffer: r.u16(),
            pressure_inhale: r.u16(),
            pressure_patient: r.u16(),
            temperature_buffer: r.u16(),
            pressure_diff_patient: r.u16(),
            ambient_pressure: r.u16(),
            ambient_temperature: r.u16(),
            airway_pressure: r.f32(),
            flow: r.f32(),
            volume: r.f32(),
        })
    }
}

/// Echo of the active configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Readback {
    pub version: u8,
    pub timestamp: u32,
    pub duration_calibration: u16,
    pub duration_buffer_purge: u16,
    pub duration_buffer_flush: u16,
    pub duration_buffer_prefill: u16,
    pub duration_buffer_fill: u16,
    pub duration_buffer_loaded: u16,
    pub duration_buffer_pre_inhale: u16,
    pub duration_inhale: u16,
    pub duration_pause: u16,
    pub duration_exhale_fill: u16,
    pub duration_exhale: u16,
    pub valve_air_in: u8,
    pub valve_o2_in: u8,
    pub valve_inhale: u8,
    pub valve_exhale: u8,
    pub valve_purge: u8,
    pub ventilation_mode: u8,
    pub valve_inhale_percent: u8,
    pub valve_exhale_percent: u8,
    pub valve_air_in_enable: u8,
    pub valve_o2_in_enable: u8,
    pub valve_purge_enable: u8,
    pub inhale_trigger_enable: u8,
    pub exhale_trigger_enable: u8,
    pub peep: u8,
    pub inhale_exhale_ratio: f32,
}

impl Default for Readback {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            timestamp: 0,
            duration_calibration: 0,
            duration_buffer_purge: 0,
            duration_buffer_flush: 0,
            duration_buffer_prefill: 0,
            duration_buffer_fill: 0,
            duration_buffer_loaded: 0,
            duration_buffer_pre_inhale: 0,
            duration_inhale: 0,
            duration_pause: 0,
            duration_exhale_fill: 0,
            duration_exhale: 0,
            valve_air_in: 0,
            valve_o2_in: 0,
            valve_inhale: 0,
            valve_exhale: 0,
            valve_purge: 0,
            ventilation_mode: 0,
            valve_inhale_percent: 0,
            valve_exhale_percent: 0,
            valve_air_in_enable: 0,
            valve_o2_in_enable: 0,
            valve_purge_enable: 0,
            inhale_trigger_enable: 0,
            exhale_trigger_enable: 0,
            peep: 0,
            inhale_exhale_ratio: 0.0,
        }
    }
}

impl Readback {
    pub fn to_bytes(&self) -> Vec<u8> {
        RecordWriter::new(READBACK_SIZE, self.timestamp)
            .u16(self.duration_calibration)
            .u16(self.duration_buffer_purge)
            .u16(self.duration_buffer_flush)
            .u16(self.duration_buffer_prefill)
            .u16(self.duration_buffer_fill)
            .u16(self.duration_buffer_loaded)
            .u16(self.duration_buffer_pre_inhale)
            .u16(self.duration_inhale)
            .u16(self.duration_pause)
            .u16(self.duration_exhale_fill)
            .u16(self.duration_exhale)
            .u8(self.valve_air_in)
            .u8(self.valve_o2_in)
            .u8(self.valve_inhale)
            .u8(self.valve_exhale)
            .u8(self.valve_purge)
            .u8(self.ventilation_mode)
            .u8(self.valve_inhale_percent)
            .u8(self.valve_exhale_percent)
            .u8(self.valve_air_in_enable)
            .u8(self.valve_o2_in_enable)
            .u8(self.valve_purge_enable)
            .u8(self.inhale_trigger_enable)
            .u8(self.exhale_trigger_enable)
            .u8(self.peep)
            .f32(self.inhale_exhale_ratio)
            .finish()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data, READBACK_SIZE, "Readback")?;
        Ok(Self {
            version: FORMAT_VERSION,
            timestamp: r.u32(),
            duration_calibration: r.u16(),
            duration_buffer_purge: r.u16(),
            duration_buffer_flush: r.u16(),
            duration_buffer_prefill: r.u16(),
            duration_buffer_fill: r.u16(),
            duration_buffer_loaded: r.u16(),
            duration_buffer_pre_inhale: r.u16(),
            duration_inhale: r.u16(),
            duration_pause: r.u16(),
            duration_exhale_fill: r.u16(),
            duration_exhale: r.u16(),
            valve_air_in: r.u8(),
            valve_o2_in: r.u8(),
            valve_inhale: r.u8(),
            valve_exhale: r.u8(),
            valve_purge: r.u8(),
            ventilation_mode: r.u8(),
            valve_inhale_percent: r.u8(),
            valve_exhale_percent: r.u8(),
            valve_air_in_enable: r.u8(),
            valve_o2_in_enable: r.u8(),
            valve_purge_enable: r.u8(),
            inhale_trigger_enable: r.u8(),
            exhale_trigger_enable: r.u8(),
            peep: r.u8(),
            inhale_exhale_ratio: r.f32(),
        })
    }
}

/// Per-breath derived metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleSummary {
    pub version: u8,
    pub timestamp: u32,
    pub respiratory_rate: f32,
    pub tidal_volume: f32,
    pub exhaled_tidal_volume: f32,
    pub inhaled_tidal_volume: f32,
    pub minute_volume: f32,
    pub exhaled_minute_volume: f32,
    pub inhaled_minute_volume: f32,
    pub lung_compliance: f32,
    pub static_compliance: f32,
    pub inhalation_pressure: u16,
    pub peak_inspiratory_pressure: u16,
    pub plateau_pressure: u16,
    pub mean_airway_pressure: u16,
    pub fio2_percent: u8,
    pub apnea_index: u16,
    pub apnea_time: u16,
    pub mandatory_breath: u8,
}

impl Default for CycleSummary {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            timestamp: 0,
            respiratory_rate: 0.0,
            tidal_volume: 0.0,
            exhaled_tidal_volume: 0.0,
            inhaled_tidal_volume: 0.0,
            minute_volume: 0.0,
            exhaled_minute_volume: 0.0,
            inhaled_minute_volume: 0.0,
            lung_compliance: 0.0,
            static_compliance: 0.0,
            inhalation_pressure: 0,
            peak_inspiratory_pressure: 0,
            plateau_pressure: 0,
            mean_airway_pressure: 0,
            fio2_percent: 0,
            apnea_index: 0,
            apnea_time: 0,
            mandatory_breath: 0,
        }
    }
}

impl CycleSummary {
    pub fn to_bytes(&self) -> Vec<u8> {
        RecordWriter::new(CYCLE_SUMMARY_SIZE, self.timestamp)
            .f32(self.respiratory_rate)
            .f32(self.tidal_volume)
            .f32(self.exhaled_tidal_volume)
            .f32(self.inhaled_tidal_volume)
            .f32(self.minute_volume)
            .f32(self.exhaled_minute_volume)
            .f32(self.inhaled_minute_volume)
            .f32(self.lung_compliance)
            .f32(self.static_compliance)
            .u16(self.inhalation_pressure)
            .u16(self.peak_inspiratory_pressure)
            .u16(self.plateau_pressure)
            .u16(self.mean_airway_pressure)
            .u8(self.fio2_percent)
            .u16(self.apnea_index)
            .u16(self.apnea_time)
            .u8(self.mandatory_breath)
            .finish()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data, CYCLE_SUMMARY_SIZE, "CycleSummary")?;
        Ok(Self {
            version: FORMAT_VERSION,
            timestamp: r.u32(),
            respiratory_rate: r.f32(),
            tidal_volume: r.f32(),
            exhaled_tidal_volume: r.f32(),
            inhaled_tidal_volume: r.f32(),
            minute_volume: r.f32(),
            exhaled_minute_volume: r.f32(),
            inhaled_minute_volume: r.f32(),
            lung_compliance: r.f32(),
            static_compliance: r.f32(),
            inhalation_pressure: r.u16(),
            peak_inspiratory_pressure: r.u16(),
            plateau_pressure: r.u16(),
            mean_airway_pressure: r.u16(),
            fio2_percent: r.u8(),
            apnea_index: r.u16(),
            apnea_time: r.u16(),
            mandatory_breath: r.u8(),
        })
    }
}

/// Command sent from the monitor to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Command {
    pub version: u8,
    pub timestamp: u32,
    pub cmd_type: u8,
    pub cmd_code: u8,
    pub param: u32,
}

impl Command {
    pub fn new(timestamp: u32, cmd_type: u8, cmd_code: u8, param: u32) -> Self {
        Self {
            version: FORMAT_VERSION,
            timestamp,
            cmd_type,
            cmd_code,
            param,
        }
    }

    /// General command with one of the known codes
    pub fn general(timestamp: u32, code: CommandCode, param: u32) -> Self {
        Self::new(timestamp, CMD_TYPE_GENERAL, code as u8, param)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        RecordWriter::new(COMMAND_SIZE, self.timestamp)
            .u8(self.cmd_type)
            .u8(self.cmd_code)
            .u32(self.param)
            .finish()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data, COMMAND_SIZE, "Command")?;
        let timestamp = r.u32();
        Ok(Self::new(timestamp, r.u8(), r.u8(), r.u32()))
    }
}

/// Alarm raised by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Alarm {
    pub version: u8,
    pub timestamp: u32,
    pub alarm_type: u8,
    pub alarm_code: u8,
    pub param: u32,
}

impl Alarm {
    pub fn new(timestamp: u32, alarm_type: u8, alarm_code: u8, param: u32) -> Self {
        Self {
            version: FORMAT_VERSION,
            timestamp,
            alarm_type,
            alarm_code,
            param,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        RecordWriter::new(ALARM_SIZE, self.timestamp)
            .u8(self.alarm_type)
            .u8(self.alarm_code)
            .u32(self.param)
            .finish()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data, ALARM_SIZE, "Alarm")?;
        let timestamp = r.u32();
        Ok(Self::new(timestamp, r.u8(), r.u8(), r.u32()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_sizes_match_constants() {
        assert_eq!(FastData::default().to_bytes().len(), FAST_DATA_SIZE);
        assert_eq!(Readback::default().to_bytes().len(), READBACK_SIZE);
        assert_eq!(CycleSummary::default().to_bytes().len(), CYCLE_SUMMARY_SIZE);
        assert_eq!(Command::new(0, 0, 0, 0).to_bytes().len(), COMMAND_SIZE);
        assert_eq!(Alarm::new(0, 0, 0, 0).to_bytes().len(), ALARM_SIZE);
    }

    #[test]
    fn test_header_is_version_then_le_timestamp() {
        let data = FastData {
            timestamp: 0x1234_5678,
            ..FastData::default()
        };
        let bytes = data.to_bytes();
        assert_eq!(bytes[0], FORMAT_VERSION);
        assert_eq!(&bytes[1..5], &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_fast_data_field_offsets() {
        let data = FastData {
            timestamp: 1000,
            fsm_state: 6,
            pressure_air_supply: 0x0102,
            ambient_temperature: 0xBEEF,
            airway_pressure: 12.5,
            ..FastData::default()
        };
        let bytes = data.to_bytes();
        assert_eq!(bytes[5], 6);
        assert_eq!(&bytes[6..8], &[0x02, 0x01]);
        assert_eq!(&bytes[26..28], &[0xEF, 0xBE]);
        assert_eq!(&bytes[28..32], &12.5f32.to_le_bytes());

        let decoded = FastData::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_readback_trailing_ratio() {
        let readback = Readback {
            duration_inhale: 1600,
            peep: 5,
            inhale_exhale_ratio: 1.5,
            ..Readback::default()
        };
        let bytes = readback.to_bytes();
        assert_eq!(&bytes[41..45], &1.5f32.to_le_bytes());
        assert_eq!(Readback::from_bytes(&bytes).unwrap(), readback);
    }

    #[test]
    fn test_cycle_summary_decodes() {
        let summary = CycleSummary {
            timestamp: 42,
            respiratory_rate: 15.0,
            tidal_volume: 480.0,
            fio2_percent: 21,
            apnea_time: 300,
            mandatory_breath: 1,
            ..CycleSummary::default()
        };
        let decoded = CycleSummary::from_bytes(&summary.to_bytes()).unwrap();
        assert_eq!(decoded, summary);
    }

    #[test]
    fn test_command_layout() {
        let cmd = Command::general(7, CommandCode::SetMode, 0x0000_0002);
        let bytes = cmd.to_bytes();
        assert_eq!(bytes[5], CMD_TYPE_GENERAL);
        assert_eq!(bytes[6], 4);
        assert_eq!(&bytes[7..11], &[0x02, 0x00, 0x00, 0x00]);
        assert_eq!(Command::from_bytes(&bytes).unwrap(), cmd);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let bytes = Alarm::new(1, 2, 3, 4).to_bytes();
        assert!(Alarm::from_bytes(&bytes[..10]).is_err());
        assert!(FastData::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut bytes = Alarm::new(1, 2, 3, 4).to_bytes();
        bytes[0] = 0xA1;
        assert!(Alarm::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_command_code_conversion() {
        assert_eq!(CommandCode::try_from(1), Ok(CommandCode::Start));
        assert_eq!(CommandCode::try_from(5), Ok(CommandCode::Calibrate));
        assert_eq!(CommandCode::try_from(9), Err(9));
    }
}
