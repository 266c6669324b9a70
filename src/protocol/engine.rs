//! # Protocol Engine
//!
//! Send/receive/acknowledge state machine for the serial link.
//!
//! Three class queues (alarm, command, data) each hold frames awaiting an
//! ACK. Every class has its own resend timer, so a slow data timer never
//! delays alarms. A single send sequence counter stamps whichever head goes
//! out; an ACK carrying `head + 1` advances it and releases the head.
//!
//! The engine is poll driven: [`ProtocolEngine::receive`] takes one byte per
//! call and [`ProtocolEngine::send`] services the resend timers. A host loop
//! usually calls [`ProtocolEngine::poll`] once per scheduler tick, which
//! drains every available byte before sending. Nothing blocks.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use super::frame::Frame;
use super::queue::FrameQueue;
use super::stuffing;
use super::wire::*;
use crate::config::ProtocolConfig;
use crate::error::{Result, VentError};
use crate::ports::{Clock, Transport};
use crate::telemetry::Payload;

/// Received payloads kept until the application takes them
pub const MAX_PENDING_RECEIVED: usize = 16;

/// A decoded payload delivered by the link
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPayload {
    pub class: PacketClass,
    pub address: u8,
    pub payload: Payload,
}

/// Link counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub retransmissions: u64,
    pub writes_skipped: u64,
    pub acks_received: u64,
    pub stale_acks: u64,
    pub nacks_received: u64,
    pub crc_errors: u64,
    pub malformed_frames: u64,
    pub evictions: u64,
    pub dropped_after_retries: u64,
    pub payloads_received: u64,
}

/// Where the receiver is in the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameSearch {
    /// Discarding bytes until a boundary marker
    Searching,
    /// Start marker seen, collecting until the stop marker
    Accumulating,
}

/// Per-class queue and resend timer
#[derive(Debug)]
struct ClassLink {
    queue: FrameQueue,
    resend_timeout_ms: u32,
    last_transmit_ms: u32,
}

impl ClassLink {
    fn new(capacity: usize, resend_timeout_ms: u32, now: u32) -> Self {
        Self {
            queue: FrameQueue::new(capacity),
            resend_timeout_ms,
            last_transmit_ms: now,
        }
    }
}

fn link_index(class: PacketClass) -> usize {
    match class {
        PacketClass::Alarm => 0,
        PacketClass::Command => 1,
        PacketClass::Data => 2,
    }
}

/// Framed, acknowledged link over a byte transport
pub struct ProtocolEngine<C: Clock, T: Transport> {
    clock: C,
    transport: T,
    links: [ClassLink; 3],
    rx_buffer: Vec<u8>,
    search: FrameSearch,
    sequence_send: SequenceNumber,
    sequence_receive: SequenceNumber,
    max_retransmissions: u32,
    received: VecDeque<ReceivedPayload>,
    stats: LinkStats,
}

impl<C: Clock, T: Transport> std::fmt::Debug for ProtocolEngine<C, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("sequence_send", &self.sequence_send)
            .field("sequence_receive", &self.sequence_receive)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<C: Clock, T: Transport> ProtocolEngine<C, T> {
    pub fn new(clock: C, transport: T, config: &ProtocolConfig) -> Self {
        let now = clock.now_ms();
        let capacity = config.queue_capacity;

        Self {
            clock,
            transport,
            links: [
                ClassLink::new(capacity, config.alarm_timeout_ms, now),
                ClassLink::new(capacity, config.command_timeout_ms, now),
                ClassLink::new(capacity, config.data_timeout_ms, now),
            ],
            rx_buffer: Vec::with_capacity(MAX_RECEIVE_BUFFER),
            search: FrameSearch::Searching,
            sequence_send: SequenceNumber::default(),
            sequence_receive: SequenceNumber::default(),
            max_retransmissions: config.max_retransmissions,
            received: VecDeque::with_capacity(MAX_PENDING_RECEIVED),
            stats: LinkStats::default(),
        }
    }

    /// Queue `payload` as an information frame in `class`
    ///
    /// A full queue evicts its oldest frame; that is not an error.
    ///
    /// # Errors
    ///
    /// Returns error only if the payload cannot be framed (unset or oversized)
    pub fn enqueue(&mut self, class: PacketClass, payload: &Payload) -> Result<()> {
        let frame = Frame::information(class, payload)?;
        let link = &mut self.links[link_index(class)];

        if let Some(evicted) = link.queue.push(frame) {
            self.stats.evictions += 1;
            debug!(
                "{:?} queue full, evicted frame (seq {})",
                class,
                evicted.sequence_send()
            );
        }
        Ok(())
    }

    /// Queue `payload` in the class its record type belongs to
    pub fn enqueue_payload(&mut self, payload: &Payload) -> Result<()> {
        let class = payload.class().ok_or_else(|| {
            VentError::InvalidFrame("cannot enqueue an unset payload".to_string())
        })?;
        self.enqueue(class, payload)
    }

    /// Drain received bytes then send; one scheduler tick of the link
    pub fn poll(&mut self) {
        self.receive_pending();
        self.send();
    }

    /// Transmit the head of every class whose resend timer has expired
    pub fn send(&mut self) {
        let now = self.clock.now_ms();

        for class in PacketClass::ALL {
            let link = &self.links[link_index(class)];
            let due = now.wrapping_sub(link.last_transmit_ms) > link.resend_timeout_ms;
            if due && !link.queue.is_empty() {
                self.transmit_head(class, now);
            }
        }
    }

    /// Consume at most one inbound byte, processing the frame it completes
    ///
    /// # Returns
    ///
    /// `false` when the transport had nothing to read
    pub fn receive(&mut self) -> bool {
        if self.transport.bytes_available() == 0 {
            return false;
        }
        let Some(byte) = self.transport.read_byte() else {
            return false;
        };

        match self.search {
            FrameSearch::Searching => {
                if byte == FRAME_BOUNDARY {
                    self.start_frame();
                }
            }
            FrameSearch::Accumulating => {
                if self.rx_buffer.len() >= MAX_RECEIVE_BUFFER {
                    debug!(
                        "Receive buffer overflow, discarding {} bytes",
                        self.rx_buffer.len()
                    );
                    self.stats.malformed_frames += 1;
                    self.reset_receiver();
                    if byte == FRAME_BOUNDARY {
                        self.start_frame();
                    }
                    return true;
                }

                self.rx_buffer.push(byte);
                if byte != FRAME_BOUNDARY {
                    return true;
                }

                if self.rx_buffer.len() < MIN_FRAME_SIZE {
                    // Back-to-back markers: the later one opens the frame
                    trace!("Short span of {} bytes, resynchronising", self.rx_buffer.len());
                    self.start_frame();
                    return true;
                }

                let raw = stuffing::decode(&self.rx_buffer);
                self.reset_receiver();
                self.process_frame(&raw);
            }
        }
        true
    }

    /// Run [`receive`](Self::receive) until the transport is drained
    pub fn receive_pending(&mut self) {
        while self.receive() {}
    }

    /// Next payload delivered by the link, oldest first
    pub fn take_received(&mut self) -> Option<ReceivedPayload> {
        self.received.pop_front()
    }

    pub fn queue(&self, class: PacketClass) -> &FrameQueue {
        &self.links[link_index(class)].queue
    }

    pub fn queue_len(&self, class: PacketClass) -> usize {
        self.queue(class).len()
    }

    pub fn sequence_send(&self) -> SequenceNumber {
        self.sequence_send
    }

    /// Last receive sequence carried by a valid inbound frame
    pub fn sequence_receive(&self) -> SequenceNumber {
        self.sequence_receive
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn start_frame(&mut self) {
        self.rx_buffer.clear();
        self.rx_buffer.push(FRAME_BOUNDARY);
        self.search = FrameSearch::Accumulating;
    }

    fn reset_receiver(&mut self) {
        self.rx_buffer.clear();
        self.search = FrameSearch::Searching;
    }

    fn process_frame(&mut self, raw: &[u8]) {
        let frame = match Frame::from_bytes(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.malformed_frames += 1;
                debug!("Discarding frame: {}", e);
                return;
            }
        };

        if !frame.compare_crc() {
            self.stats.crc_errors += 1;
            debug!(
                "CRC mismatch: expected 0x{:04X}, got 0x{:04X}",
                frame.calculate_crc(),
                frame.fcs()
            );
            return;
        }

        self.sequence_receive = SequenceNumber::new(frame.sequence_receive());

        let Some(class) = frame.class() else {
            debug!("Discarding frame with unknown address 0x{:02X}", frame.address());
            return;
        };

        match frame.control_type() {
            CONTROL_NACK => self.handle_nack(class),
            CONTROL_ACK => self.handle_ack(class, frame.sequence_receive()),
            other if frame.is_supervisory() => {
                debug!("Ignoring supervisory frame type 0x{:02X}", other);
            }
            _ => self.handle_information(class, &frame),
        }
    }

    /// NACK: resend the class head straight away instead of waiting for its timer
    fn handle_nack(&mut self, class: PacketClass) {
        self.stats.nacks_received += 1;
        debug!("Received NACK for {:?}", class);

        if !self.links[link_index(class)].queue.is_empty() {
            let now = self.clock.now_ms();
            self.transmit_head(class, now);
        }
    }

    fn handle_ack(&mut self, class: PacketClass, acknowledged: u8) {
        let link = &mut self.links[link_index(class)];

        let matches = link.queue.front().is_some_and(|head| {
            head.in_flight()
                && SequenceNumber::new(head.frame.sequence_send()).next().value() == acknowledged
        });

        if matches {
            link.queue.pop_front();
            self.sequence_send.advance();
            self.stats.acks_received += 1;
            debug!(
                "Received ACK for {:?} (seq {}), next send seq {}",
                class,
                acknowledged,
                self.sequence_send.value()
            );
        } else {
            self.stats.stale_acks += 1;
            trace!("Ignoring stale ACK for {:?} (seq {})", class, acknowledged);
        }
    }

    fn handle_information(&mut self, class: PacketClass, frame: &Frame) {
        match frame.payload() {
            Ok(payload) => {
                if self.received.len() >= MAX_PENDING_RECEIVED {
                    self.received.pop_front();
                    debug!("Receive queue full, dropping oldest payload");
                }
                self.received.push_back(ReceivedPayload {
                    class,
                    address: frame.address(),
                    payload,
                });
                self.stats.payloads_received += 1;
            }
            // The frame itself was valid, so it is still acknowledged
            Err(e) => warn!("Undecodable {:?} payload: {}", class, e),
        }

        let mut ack = Frame::ack(frame.address());
        ack.set_sequence_receive(SequenceNumber::new(frame.sequence_send()).next());
        self.write_frame(&ack.encode());
    }

    fn transmit_head(&mut self, class: PacketClass, now: u32) {
        let sequence = self.sequence_send;
        let max_retransmissions = self.max_retransmissions;
        let link = &mut self.links[link_index(class)];

        if max_retransmissions > 0
            && link
                .queue
                .front()
                .is_some_and(|head| head.transmissions >= max_retransmissions)
        {
            link.queue.pop_front();
            self.stats.dropped_after_retries += 1;
            warn!(
                "{:?} frame unacknowledged after {} transmissions, dropping",
                class, max_retransmissions
            );
        }

        let Some(head) = link.queue.front_mut() else {
            return;
        };

        head.frame.set_sequence_send(sequence);
        let retransmission = head.in_flight();
        head.transmissions += 1;
        let bytes = head.frame.encode();
        link.last_transmit_ms = now;

        if retransmission {
            self.stats.retransmissions += 1;
        }
        debug!(
            "Sending {:?} frame seq {} ({} bytes)",
            class,
            sequence.value(),
            bytes.len()
        );
        self.write_frame(&bytes);
    }

    /// Best-effort write; skipped when the transport lacks room
    fn write_frame(&mut self, bytes: &[u8]) -> bool {
        if self.transport.write_available() < bytes.len() {
            self.stats.writes_skipped += 1;
            debug!("Transport busy, skipping {} byte write", bytes.len());
            return false;
        }

        let written = self.transport.write_bytes(bytes);
        self.stats.frames_sent += 1;
        trace!("Wrote {} bytes: {:02X?}", written, bytes);
        true
    }
}
