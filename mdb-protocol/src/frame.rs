//! Frame encoding and decoding for the MDB bus.
//!
//! Frame format:
//! - DATA (1-35 bytes): command or response code followed by its arguments
//! - CHECKSUM (1 byte): low 8 bits of the sum of all DATA bytes
//!
//! The final byte on the wire carries the mode bit. A frame of exactly one
//! byte is a status reply and has no checksum.

use heapless::Vec;
use mdb_hal::RxByte;

use crate::constants::{ACK, NAK, RET};

/// Maximum bytes in one message, checksum included
pub const MAX_MESSAGE_LENGTH: usize = 36;

/// Maximum command bytes before the checksum is appended
pub const MAX_COMMAND_LENGTH: usize = MAX_MESSAGE_LENGTH - 1;

/// Bytes ready to hand to the UART
pub type WireFrame = Vec<u8, MAX_MESSAGE_LENGTH>;

/// Errors that can occur during frame parsing or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Nothing to send
    Empty,
    /// Message longer than `MAX_MESSAGE_LENGTH`
    TooLong,
    /// Checksum mismatch
    Checksum,
}

/// 8-bit additive checksum (sum modulo 256, not a CRC)
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Append the checksum to a command
pub fn build_frame(command: &[u8]) -> Result<WireFrame, FrameError> {
    if command.is_empty() {
        return Err(FrameError::Empty);
    }
    if command.len() > MAX_COMMAND_LENGTH {
        return Err(FrameError::TooLong);
    }

    let mut frame = WireFrame::new();
    frame
        .extend_from_slice(command)
        .map_err(|_| FrameError::TooLong)?;
    frame
        .push(checksum(command))
        .map_err(|_| FrameError::TooLong)?;
    Ok(frame)
}

/// A received frame with the checksum stripped
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    data: Vec<u8, MAX_MESSAGE_LENGTH>,
    /// Frame arrived with a checksum byte (more than one byte on the wire)
    checksummed: bool,
}

impl Frame {
    /// A bare single-byte reply
    pub fn status(byte: u8) -> Self {
        let mut data = Vec::new();
        // Capacity is well above one byte
        let _ = data.push(byte);
        Self {
            data,
            checksummed: false,
        }
    }

    /// A checksummed frame carrying `data`
    pub fn new(data: &[u8]) -> Result<Self, FrameError> {
        if data.is_empty() {
            return Err(FrameError::Empty);
        }
        if data.len() > MAX_COMMAND_LENGTH {
            return Err(FrameError::TooLong);
        }
        let data = Vec::from_slice(data).map_err(|_| FrameError::TooLong)?;
        Ok(Self {
            data,
            checksummed: true,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// First byte: the response code or status value
    pub fn code(&self) -> u8 {
        self.data.first().copied().unwrap_or(ACK)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_checksummed(&self) -> bool {
        self.checksummed
    }
}

/// A frame classified by what the peer meant
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    Ack,
    Nak,
    /// Peer asks for a retransmission
    Ret,
    Data(Frame),
}

impl Reply {
    pub fn from_frame(frame: Frame) -> Self {
        if frame.is_checksummed() || frame.len() != 1 {
            return Reply::Data(frame);
        }
        match frame.code() {
            ACK => Reply::Ack,
            NAK => Reply::Nak,
            RET => Reply::Ret,
            _ => Reply::Data(frame),
        }
    }

    /// First byte seen on the wire for this reply
    pub fn first_byte(&self) -> u8 {
        match self {
            Reply::Ack => ACK,
            Reply::Nak => NAK,
            Reply::Ret => RET,
            Reply::Data(frame) => frame.code(),
        }
    }
}

/// Accumulates bytes until the mode bit closes a frame
#[derive(Debug, Clone, Default)]
pub struct FrameParser {
    buffer: Vec<u8, MAX_MESSAGE_LENGTH>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Bytes of the frame in progress
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a single byte to the parser
    ///
    /// Returns `Ok(Some(frame))` when the byte closes a valid frame,
    /// `Ok(None)` when more bytes are needed, or `Err` on a bad frame. The
    /// parser is reset after every completed or failed frame.
    pub fn feed(&mut self, byte: RxByte) -> Result<Option<Frame>, FrameError> {
        if self.buffer.push(byte.data).is_err() {
            self.reset();
            return Err(FrameError::TooLong);
        }
        if !byte.mode {
            return Ok(None);
        }

        let result = match self.buffer.split_last() {
            Some((&only, [])) => Ok(Frame::status(only)),
            Some((&sum, body)) => {
                if checksum(body) == sum {
                    Frame::new(body)
                } else {
                    Err(FrameError::Checksum)
                }
            }
            None => Err(FrameError::Empty),
        };

        self.reset();
        result.map(Some)
    }
}
