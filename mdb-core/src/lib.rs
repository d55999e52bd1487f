//! Board-agnostic core logic for an MDB cashless reader
//!
//! This crate contains everything that sits between the 9-bit UART and the
//! host application:
//!
//! - Transport: one request/response cycle with bounded waits
//! - Message queue for replies that arrive outside a poll cycle
//! - Session state machine and response dispatch
//! - Error classification, recovery policy and audit logs
//! - The periodic poll loop
//!
//! All state lives in one [`CashlessDevice`] owned by the caller; nothing is
//! global, so several readers (or several tests) can run side by side.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod audit;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod logger;
pub mod poll;
pub mod queue;
pub mod recovery;
pub mod state;
pub mod timing;
pub mod transport;

#[cfg(test)]
mod mock;

pub use audit::{ErrorLogEntry, TransactionLogEntry, TransactionType};
pub use config::DeviceSettings;
pub use device::CashlessDevice;
pub use error::ErrorKind;
pub use queue::{Message, MessageQueue};
pub use recovery::{ErrorManager, RecoveryAction};
pub use state::{Event, Phase, Session, State};
