//! Bounded inbound message queue
//!
//! Replies that arrive while the engine is busy with something else (a
//! recovery exchange, a host action) are parked here and dispatched by the
//! next poll, so dispatch never re-enters the transport.

use heapless::{Deque, Vec};
use mdb_protocol::MAX_MESSAGE_LENGTH;

use crate::error::ErrorKind;

/// Queue capacity
pub const QUEUE_CAPACITY: usize = 10;

/// A captured frame waiting to be dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Message {
    data: Vec<u8, MAX_MESSAGE_LENGTH>,
    timestamp: u32,
}

impl Message {
    /// Capture `bytes` received at `timestamp`
    pub fn new(bytes: &[u8], timestamp: u32) -> Result<Self, ErrorKind> {
        if bytes.is_empty() {
            return Err(ErrorKind::Parameter);
        }
        let data = Vec::from_slice(bytes).map_err(|_| ErrorKind::Parameter)?;
        Ok(Self { data, timestamp })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Arrival time in milliseconds
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }
}

/// Fixed-capacity FIFO of [`Message`]
///
/// A full queue rejects new messages; unread entries are never overwritten.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    messages: Deque<Message, QUEUE_CAPACITY>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            messages: Deque::new(),
        }
    }

    /// Append at the tail; returns `false` (and drops `message`) when full
    pub fn enqueue(&mut self, message: Message) -> bool {
        self.messages.push_back(message).is_ok()
    }

    /// Remove the oldest message
    pub fn dequeue(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.messages.is_full()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
