//! # Retransmission Queue
//!
//! Bounded FIFO of frames awaiting acknowledgment, one per packet class.
//! When full, pushing evicts the oldest frame so the newest telemetry always
//! gets a slot.

use std::collections::VecDeque;

use super::frame::Frame;

/// Default queue depth per class
pub const DEFAULT_QUEUE_CAPACITY: usize = 2;

/// A frame plus how often it has been put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    pub frame: Frame,
    pub transmissions: u32,
}

impl QueuedFrame {
    /// Sent at least once and not yet acknowledged
    pub fn in_flight(&self) -> bool {
        self.transmissions > 0
    }
}

/// Drop-oldest bounded frame queue
#[derive(Debug, Clone)]
pub struct FrameQueue {
    frames: VecDeque<QueuedFrame>,
    capacity: usize,
}

impl FrameQueue {
    /// Create a queue; a capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `frame`, returning the evicted head if the queue was full
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        let evicted = if self.frames.len() >= self.capacity {
            self.frames.pop_front().map(|q| q.frame)
        } else {
            None
        };
        self.frames.push_back(QueuedFrame {
            frame,
            transmissions: 0,
        });
        evicted
    }

    pub fn front(&self) -> Option<&QueuedFrame> {
        self.frames.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut QueuedFrame> {
        self.frames.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<Frame> {
        self.frames.pop_front().map(|q| q.frame)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().map(|q| &q.frame)
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::PACKET_DATA;

    fn tagged_frame(tag: u8) -> Frame {
        let mut frame = Frame::new(1, PACKET_DATA, [0, 0]).unwrap();
        frame.set_info(&[tag]).unwrap();
        frame
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = FrameQueue::default();
        assert!(queue.push(tagged_frame(1)).is_none());
        assert!(queue.push(tagged_frame(2)).is_none());

        assert_eq!(queue.pop_front().unwrap().info(), &[1]);
        assert_eq!(queue.pop_front().unwrap().info(), &[2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_third_push_evicts_oldest() {
        let mut queue = FrameQueue::new(2);
        queue.push(tagged_frame(1));
        queue.push(tagged_frame(2));

        let evicted = queue.push(tagged_frame(3)).unwrap();
        assert_eq!(evicted.info(), &[1]);

        let remaining: Vec<u8> = queue.iter().map(|f| f.info()[0]).collect();
        assert_eq!(remaining, vec![2, 3]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_new_entries_not_in_flight() {
        let mut queue = FrameQueue::default();
        queue.push(tagged_frame(1));
        assert!(!queue.front().unwrap().in_flight());

        queue.front_mut().unwrap().transmissions += 1;
        assert!(queue.front().unwrap().in_flight());
    }

    #[test]
    fn test_zero_capacity_raised_to_one() {
        let mut queue = FrameQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(tagged_frame(1));
        assert_eq!(queue.push(tagged_frame(2)).unwrap().info(), &[1]);
        assert_eq!(queue.len(), 1);
    }
}
