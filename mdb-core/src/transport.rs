//! Request/response transport
//!
//! Owns the UART. A command is framed and sent, then the reply is read byte
//! by byte under the MDB timing rules:
//!
//! - first byte within [`RESPONSE_TIMEOUT_MS`]
//! - each following byte within [`INTERBYTE_TIMEOUT_MS`]
//! - at most [`MAX_MESSAGE_LENGTH`] bytes
//!
//! Every wait is bounded, so a cycle never blocks for longer than
//! `RESPONSE_TIMEOUT_MS + MAX_MESSAGE_LENGTH * INTERBYTE_TIMEOUT_MS`.

use heapless::Vec;
use mdb_hal::MdbUart;
use mdb_protocol::{
    build_frame, FrameParser, Reply, MAX_COMMAND_LENGTH, MAX_MESSAGE_LENGTH,
};

use crate::error::ErrorKind;
use crate::timing::{INTERBYTE_TIMEOUT_MS, RESPONSE_TIMEOUT_MS, TRANSMIT_TIMEOUT_MS};

/// Framed request/response over an [`MdbUart`]
#[derive(Debug)]
pub struct Transport<U> {
    uart: U,
    parser: FrameParser,
    /// Command bytes of the last send, kept for NAK retries
    last_command: Vec<u8, MAX_COMMAND_LENGTH>,
    /// First byte of the last reply
    last_response: u8,
}

impl<U: MdbUart> Transport<U> {
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            parser: FrameParser::new(),
            last_command: Vec::new(),
            last_response: 0,
        }
    }

    /// Frame and transmit `command`, remembering it for [`Transport::resend`]
    pub fn send(&mut self, command: &[u8]) -> Result<(), ErrorKind> {
        let frame = build_frame(command)?;
        self.last_command = Vec::from_slice(command).map_err(|_| ErrorKind::Parameter)?;
        self.transmit(&frame)
    }

    /// Transmit unframed status bytes (ACK/NAK/RET)
    ///
    /// The retry command is left untouched.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        if bytes.is_empty() || bytes.len() > MAX_MESSAGE_LENGTH {
            return Err(ErrorKind::Parameter);
        }
        self.transmit(bytes)
    }

    /// Retransmit the last command
    pub fn resend(&mut self) -> Result<(), ErrorKind> {
        if self.last_command.is_empty() {
            return Err(ErrorKind::Parameter);
        }
        let frame = build_frame(&self.last_command)?;
        self.transmit(&frame)
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.uart
            .transmit(bytes, TRANSMIT_TIMEOUT_MS)
            .map_err(|_| ErrorKind::Communication)
    }

    /// Read one reply frame
    ///
    /// `Timeout` when no byte arrives in time, `Communication` on a gap
    /// inside the frame, `Parameter` on an overlong frame and `Checksum` on
    /// a checksum mismatch.
    pub fn wait_for_response(&mut self) -> Result<Reply, ErrorKind> {
        self.parser.reset();

        let mut byte = match self.uart.receive_byte(RESPONSE_TIMEOUT_MS) {
            Ok(Some(byte)) => byte,
            Ok(None) => return Err(ErrorKind::Timeout),
            Err(_) => return Err(ErrorKind::Communication),
        };
        self.last_response = byte.data;

        loop {
            match self.parser.feed(byte) {
                Ok(Some(frame)) => {
                    let reply = Reply::from_frame(frame);
                    self.last_response = reply.first_byte();
                    return Ok(reply);
                }
                Ok(None) => {}
                Err(err) => return Err(err.into()),
            }

            byte = match self.uart.receive_byte(INTERBYTE_TIMEOUT_MS) {
                Ok(Some(byte)) => byte,
                Ok(None) | Err(_) => {
                    self.parser.reset();
                    return Err(ErrorKind::Communication);
                }
            };
        }
    }

    /// Command byte of the last send, 0 if nothing was sent yet
    pub fn last_command(&self) -> u8 {
        self.last_command.first().copied().unwrap_or(0)
    }

    /// First byte of the last reply
    pub fn last_response(&self) -> u8 {
        self.last_response
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }
}
