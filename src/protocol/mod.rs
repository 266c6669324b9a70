//! # Serial Link Protocol
//!
//! HDLC-style framing between the controller and its monitor.
//!
//! - `wire`: constants, packet classes, sequence numbers
//! - `crc`: CRC-16/X-25 frame check sequence
//! - `stuffing`: boundary/escape byte stuffing
//! - `frame`: frame layout and field access
//! - `queue`: bounded per-class retransmission queues
//! - `engine`: send/receive/ACK state machine

pub mod crc;
pub mod engine;
pub mod frame;
pub mod queue;
pub mod stuffing;
pub mod wire;

pub use engine::{LinkStats, ProtocolEngine, ReceivedPayload};
pub use frame::Frame;
pub use queue::{FrameQueue, QueuedFrame};
pub use wire::{PacketClass, SequenceNumber};
