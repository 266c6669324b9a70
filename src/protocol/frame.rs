//! # Link Frame
//!
//! One frame of the serial link, before byte stuffing:
//!
//! ```text
//! ┌──────┬─────────┬───────────┬───────────┬──────────────┬─────────┬──────┐
//! │ 0x7E │ address │ control 1 │ control 2 │ info (0..57) │ crc LE  │ 0x7E │
//! └──────┴─────────┴───────────┴───────────┴──────────────┴─────────┴──────┘
//! ```
//!
//! - control 1, bits 1-7: receive (acknowledge) sequence
//! - control 2, bit 0: supervisory flag; low nibble selects ACK/NACK
//! - control 2, bits 1-7: send sequence (information frames only)
//!
//! The CRC covers address, both control bytes and the information field and
//! is regenerated by every setter that changes one of them.

use super::crc::crc16_x25_parts;
use super::stuffing;
use super::wire::*;
use crate::error::{Result, VentError};
use crate::telemetry::Payload;

/// Sentinel returned by `sequence_send()` on supervisory frames
pub const SEQUENCE_NOT_APPLICABLE: u8 = 0xFF;

/// Frame fields with the stored (sent or received) check sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    address: u8,
    control: [u8; 2],
    info: Vec<u8>,
    fcs: u16,
}

impl Frame {
    /// Create a frame with a zeroed information field of `info_len` bytes
    ///
    /// # Errors
    ///
    /// Returns `OversizedPayload` if the frame would exceed `MAX_FRAME_SIZE`
    pub fn new(info_len: usize, address: u8, control: [u8; 2]) -> Result<Self> {
        if info_len + MIN_FRAME_SIZE > MAX_FRAME_SIZE {
            return Err(VentError::OversizedPayload {
                info_len,
                max: MAX_INFO_SIZE,
            });
        }

        let mut frame = Self {
            address,
            control,
            info: vec![0u8; info_len],
            fcs: 0,
        };
        frame.generate_crc();
        Ok(frame)
    }

    /// Information frame carrying `payload` in `class`
    ///
    /// # Examples
    ///
    /// ```
    /// use hev_controller::protocol::{Frame, PacketClass};
    /// use hev_controller::telemetry::{Payload, records::FastData};
    ///
    /// let payload = Payload::FastData(FastData { timestamp: 1000, ..FastData::default() });
    /// let frame = Frame::information(PacketClass::Data, &payload)?;
    /// assert_eq!(frame.size(), 47);
    /// assert!(frame.compare_crc());
    /// # Ok::<(), hev_controller::error::VentError>(())
    /// ```
    pub fn information(class: PacketClass, payload: &Payload) -> Result<Self> {
        if matches!(payload, Payload::Unset) {
            return Err(VentError::InvalidFrame(
                "cannot frame an unset payload".to_string(),
            ));
        }

        let mut frame = Self::new(
            payload.size(),
            class.address(),
            [0x00, CONTROL_INFORMATION],
        )?;
        frame.set_info(&payload.to_bytes())?;
        Ok(frame)
    }

    /// Supervisory acknowledgment for `address`
    pub fn ack(address: u8) -> Self {
        Self::supervisory(address, CONTROL_ACK)
    }

    /// Supervisory negative acknowledgment for `address`
    pub fn nack(address: u8) -> Self {
        Self::supervisory(address, CONTROL_NACK)
    }

    fn supervisory(address: u8, control_type: u8) -> Self {
        let mut frame = Self {
            address,
            control: [0x00, control_type],
            info: Vec::new(),
            fcs: 0,
        };
        frame.generate_crc();
        frame
    }

    /// Rebuild a frame from unstuffed wire bytes, keeping the received CRC
    ///
    /// # Errors
    ///
    /// Returns error if the span is shorter than the frame overhead, longer
    /// than `MAX_FRAME_SIZE`, or not delimited by boundary markers
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < MIN_FRAME_SIZE {
            return Err(VentError::InvalidFrame(format!(
                "Frame too short: {} bytes",
                raw.len()
            )));
        }
        if raw.len() > MAX_FRAME_SIZE {
            return Err(VentError::InvalidFrame(format!(
                "Frame too long: {} bytes",
                raw.len()
            )));
        }
        if raw[0] != FRAME_BOUNDARY || raw[raw.len() - 1] != FRAME_BOUNDARY {
            return Err(VentError::InvalidFrame(
                "Frame not delimited by boundary markers".to_string(),
            ));
        }

        let fcs_start = raw.len() - 3;
        Ok(Self {
            address: raw[1],
            control: [raw[2], raw[3]],
            info: raw[4..fcs_start].to_vec(),
            fcs: u16::from_le_bytes([raw[fcs_start], raw[fcs_start + 1]]),
        })
    }

    /// Unstuffed wire image, boundaries included
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        out.push(FRAME_BOUNDARY);
        out.push(self.address);
        out.extend_from_slice(&self.control);
        out.extend_from_slice(&self.info);
        out.extend_from_slice(&self.fcs.to_le_bytes());
        out.push(FRAME_BOUNDARY);
        out
    }

    /// Stuffed bytes ready for the transport
    pub fn encode(&self) -> Vec<u8> {
        stuffing::encode(&self.to_bytes())
    }

    /// Total unstuffed size
    pub fn size(&self) -> usize {
        self.info.len() + MIN_FRAME_SIZE
    }

    pub fn info_size(&self) -> usize {
        self.info.len()
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn control(&self) -> [u8; 2] {
        self.control
    }

    pub fn info(&self) -> &[u8] {
        &self.info
    }

    /// Stored check sequence
    pub fn fcs(&self) -> u16 {
        self.fcs
    }

    pub fn class(&self) -> Option<PacketClass> {
        PacketClass::from_address(self.address)
    }

    pub fn is_supervisory(&self) -> bool {
        self.control[1] & CONTROL_SUPERVISORY != 0
    }

    /// Frame type nibble (`CONTROL_ACK`, `CONTROL_NACK`, or information)
    pub fn control_type(&self) -> u8 {
        self.control[1] & CONTROL_TYPES
    }

    pub fn set_address(&mut self, address: u8) {
        self.address = address;
        self.generate_crc();
    }

    /// Replace the information field
    ///
    /// # Errors
    ///
    /// Returns `OversizedPayload` if the new field does not fit in a frame
    pub fn set_info(&mut self, info: &[u8]) -> Result<()> {
        if info.len() > MAX_INFO_SIZE {
            return Err(VentError::OversizedPayload {
                info_len: info.len(),
                max: MAX_INFO_SIZE,
            });
        }
        self.info.clear();
        self.info.extend_from_slice(info);
        self.generate_crc();
        Ok(())
    }

    /// Stamp the send sequence; ignored on supervisory frames
    pub fn set_sequence_send(&mut self, sequence: SequenceNumber) {
        if !self.is_supervisory() {
            self.control[1] = (sequence.value() << 1) & 0xFE;
            self.generate_crc();
        }
    }

    /// Send sequence, or `SEQUENCE_NOT_APPLICABLE` on supervisory frames
    pub fn sequence_send(&self) -> u8 {
        if self.is_supervisory() {
            SEQUENCE_NOT_APPLICABLE
        } else {
            (self.control[1] >> 1) & 0x7F
        }
    }

    pub fn set_sequence_receive(&mut self, sequence: SequenceNumber) {
        self.control[0] = (sequence.value() << 1) & 0xFE;
        self.generate_crc();
    }

    pub fn sequence_receive(&self) -> u8 {
        (self.control[0] >> 1) & 0x7F
    }

    /// Checksum over the current address, control and info bytes
    pub fn calculate_crc(&self) -> u16 {
        crc16_x25_parts(&[&[self.address], &self.control[..], self.info.as_slice()])
    }

    fn generate_crc(&mut self) {
        self.fcs = self.calculate_crc();
    }

    /// Recompute the checksum and compare it with the stored trailer
    pub fn compare_crc(&self) -> bool {
        self.calculate_crc() == self.fcs
    }

    /// Decode the information field into a payload
    ///
    /// # Errors
    ///
    /// Returns error for supervisory frames, unknown addresses and info
    /// fields that match no record layout
    pub fn payload(&self) -> Result<Payload> {
        let class = self.class().ok_or(VentError::UnknownRecord {
            address: self.address,
            len: self.info.len(),
        })?;
        if self.is_supervisory() {
            return Err(VentError::InvalidFrame(
                "supervisory frames carry no payload".to_string(),
            ));
        }
        Payload::from_info(class, &self.info)
    }
}
