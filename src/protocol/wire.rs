//! # Link Protocol Constants and Types
//!
//! Core definitions for the HDLC-style serial link.

/// Frame boundary marker (start and stop)
pub const FRAME_BOUNDARY: u8 = 0x7E;

/// Escape byte for stuffed boundary/escape values
pub const FRAME_ESCAPE: u8 = 0x7D;

/// Bit flipped in an escaped byte
pub const ESCAPE_BIT_SWAP: u8 = 5;

/// Maximum frame size on the wire before stuffing
pub const MAX_FRAME_SIZE: usize = 64;

/// Frame overhead: start(1) + address(1) + control(2) + crc(2) + stop(1)
pub const MIN_FRAME_SIZE: usize = 7;

/// Largest information field that still fits in one frame
pub const MAX_INFO_SIZE: usize = MAX_FRAME_SIZE - MIN_FRAME_SIZE;

/// Receive accumulator capacity; a span longer than this is discarded
pub const MAX_RECEIVE_BUFFER: usize = 128;

/// Control byte 2, bit 0 clear: information frame
pub const CONTROL_INFORMATION: u8 = 0x00;

/// Control byte 2, bit 0 set: supervisory frame
pub const CONTROL_SUPERVISORY: u8 = 0x01;

/// Mask selecting the frame type nibble of control byte 2
pub const CONTROL_TYPES: u8 = 0x0F;

/// Supervisory acknowledgment
pub const CONTROL_ACK: u8 = 0x00 | CONTROL_SUPERVISORY;

/// Supervisory negative acknowledgment
pub const CONTROL_NACK: u8 = 0x04 | CONTROL_SUPERVISORY;

/// Address bits selecting the packet class
pub const PACKET_TYPE: u8 = 0xC0;
pub const PACKET_ALARM: u8 = 0xC0;
pub const PACKET_CMD: u8 = 0x80;
pub const PACKET_DATA: u8 = 0x40;

/// Address flag distinguishing set from get commands
pub const PACKET_SET: u8 = 0x20;

/// Sequence numbers are 7 bits wide
pub const SEQUENCE_MODULUS: u8 = 128;

/// Priority class of a frame, encoded in the address byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketClass {
    Alarm,
    Command,
    Data,
}

impl PacketClass {
    /// All classes in service priority order
    pub const ALL: [PacketClass; 3] = [PacketClass::Alarm, PacketClass::Command, PacketClass::Data];

    pub fn address(self) -> u8 {
        match self {
            PacketClass::Alarm => PACKET_ALARM,
            PacketClass::Command => PACKET_CMD,
            PacketClass::Data => PACKET_DATA,
        }
    }

    /// Decode the class bits of an address byte
    pub fn from_address(address: u8) -> Option<Self> {
        match address & PACKET_TYPE {
            PACKET_ALARM => Some(PacketClass::Alarm),
            PACKET_CMD => Some(PacketClass::Command),
            PACKET_DATA => Some(PacketClass::Data),
            _ => None,
        }
    }
}

/// 7-bit sequence counter, wrapping from 127 to 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceNumber(u8);

impl SequenceNumber {
    pub fn new(value: u8) -> Self {
        Self(value % SEQUENCE_MODULUS)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.0.wrapping_add(1))
    }

    pub fn advance(&mut self) {
        *self = self.next();
    }
}
