//! MDB Cashless Device Protocol
//!
//! Wire-level pieces of the Multi-Drop Bus as seen by a cashless reader:
//! checksums, frame delimiting, the commands the engine sends and the
//! replies it decodes.
//!
//! # Frame Overview
//!
//! A message is a run of bytes whose last byte carries the ninth (mode) bit.
//! Multi-byte messages end with an 8-bit additive checksum:
//! ```text
//! ┌──────┬──────────────┬──────────┐
//! │ CODE │ DATA         │ CHECKSUM │
//! │ 1B   │ 0–34B        │ 1B (mode)│
//! └──────┴──────────────┴──────────┘
//! ```
//!
//! Single-byte status replies (ACK, NAK, RET) are sent bare, without a
//! checksum.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod commands;
pub mod constants;
pub mod frame;
pub mod responses;

pub use commands::{Command, ReaderCommand, RevalueCommand, SetupCommand, VendCommand};
pub use frame::{
    build_frame, checksum, Frame, FrameError, FrameParser, Reply, WireFrame, MAX_COMMAND_LENGTH,
    MAX_MESSAGE_LENGTH,
};
pub use responses::{DecodeError, MiscOptions, ReaderConfig, Response};
