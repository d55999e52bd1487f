//! MDB Hardware Abstraction Layer
//!
//! This crate defines the capabilities the cashless engine consumes from the
//! board it runs on. The engine never touches a peripheral register; it only
//! talks to these traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Host application (prices, funds)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  mdb-core (session, recovery, poll)     │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  mdb-hal (this crate - traits)          │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┼───────────┐
//!         ▼           ▼           ▼
//!     9-bit UART    tick       log sink
//! ```
//!
//! # Traits
//!
//! - [`uart::MdbUart`] - 9-bit serial line with mode-bit framing
//! - [`clock::Clock`] - Monotonic millisecond tick
//! - [`log::LogSink`] - Structured, leveled log output
//!
//! Recovery pauses use `embedded_hal::delay::DelayNs` directly, so any
//! board delay implementation plugs in unchanged.

#![no_std]
#![deny(unsafe_code)]

pub mod clock;
pub mod log;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use clock::Clock;
pub use log::{Field, LogLevel, LogSink, NullSink, Record, Value};
pub use uart::{MdbUart, RxByte};
