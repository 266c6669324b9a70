//! # Payload
//!
//! Tagged container holding exactly one telemetry record. The variant is the
//! discriminant, so kind and size can never disagree with the contents.

use serde::Serialize;

use super::records::*;
use crate::error::{Result, VentError};
use crate::protocol::PacketClass;

/// Which record a payload carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PayloadKind {
    FastData,
    Readback,
    CycleSummary,
    Command,
    Alarm,
    Unset,
}

/// One telemetry record ready to be framed
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(tag = "type", content = "record")]
pub enum Payload {
    FastData(FastData),
    Readback(Readback),
    CycleSummary(CycleSummary),
    Command(Command),
    Alarm(Alarm),
    #[default]
    Unset,
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::FastData(_) => PayloadKind::FastData,
            Payload::Readback(_) => PayloadKind::Readback,
            Payload::CycleSummary(_) => PayloadKind::CycleSummary,
            Payload::Command(_) => PayloadKind::Command,
            Payload::Alarm(_) => PayloadKind::Alarm,
            Payload::Unset => PayloadKind::Unset,
        }
    }

    /// Exact encoded length of the active record
    pub fn size(&self) -> usize {
        match self {
            Payload::FastData(_) => FAST_DATA_SIZE,
            Payload::Readback(_) => READBACK_SIZE,
            Payload::CycleSummary(_) => CYCLE_SUMMARY_SIZE,
            Payload::Command(_) => COMMAND_SIZE,
            Payload::Alarm(_) => ALARM_SIZE,
            Payload::Unset => 0,
        }
    }

    /// Drop the record and return to `Unset`
    pub fn clear(&mut self) {
        *self = Payload::Unset;
    }

    /// Packet class the payload travels in
    pub fn class(&self) -> Option<PacketClass> {
        match self {
            Payload::FastData(_) | Payload::Readback(_) | Payload::CycleSummary(_) => {
                Some(PacketClass::Data)
            }
            Payload::Command(_) => Some(PacketClass::Command),
            Payload::Alarm(_) => Some(PacketClass::Alarm),
            Payload::Unset => None,
        }
    }

    pub fn timestamp(&self) -> Option<u32> {
        match self {
            Payload::FastData(r) => Some(r.timestamp),
            Payload::Readback(r) => Some(r.timestamp),
            Payload::CycleSummary(r) => Some(r.timestamp),
            Payload::Command(r) => Some(r.timestamp),
            Payload::Alarm(r) => Some(r.timestamp),
            Payload::Unset => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::FastData(r) => r.to_bytes(),
            Payload::Readback(r) => r.to_bytes(),
            Payload::CycleSummary(r) => r.to_bytes(),
            Payload::Command(r) => r.to_bytes(),
            Payload::Alarm(r) => r.to_bytes(),
            Payload::Unset => Vec::new(),
        }
    }

    /// Rebuild a payload from frame information bytes.
    ///
    /// The address only names the class; data records are told apart by
    /// their fixed lengths, which are all distinct.
    pub fn from_info(class: PacketClass, info: &[u8]) -> Result<Self> {
        match (class, info.len()) {
            (PacketClass::Data, FAST_DATA_SIZE) => Ok(Payload::FastData(FastData::from_bytes(info)?)),
            (PacketClass::Data, READBACK_SIZE) => Ok(Payload::Readback(Readback::from_bytes(info)?)),
            (PacketClass::Data, CYCLE_SUMMARY_SIZE) => {
                Ok(Payload::CycleSummary(CycleSummary::from_bytes(info)?))
            }
            (PacketClass::Command, COMMAND_SIZE) => Ok(Payload::Command(Command::from_bytes(info)?)),
            (PacketClass::Alarm, ALARM_SIZE) => Ok(Payload::Alarm(Alarm::from_bytes(info)?)),
            (class, len) => Err(VentError::UnknownRecord {
                address: class.address(),
                len,
            }),
        }
    }
}
