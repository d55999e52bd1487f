//! Session state machine
//!
//! Defines the authoritative runtime behavior of the reader.
//! The state machine is explicit, finite, and deterministic.

pub mod events;
pub mod machine;
pub mod session;

pub use events::Event;
pub use machine::{Phase, State};
pub use session::{PendingVend, Session};
