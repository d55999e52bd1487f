//! Bus timing constants (milliseconds)

/// Wait for the first byte of a reply
pub const RESPONSE_TIMEOUT_MS: u32 = 5;

/// Longest gap allowed between bytes of one reply
pub const INTERBYTE_TIMEOUT_MS: u32 = 1;

/// Silence after which an active reader is considered gone
pub const NON_RESPONSE_TIMEOUT_MS: u32 = 5000;

/// Pause between steps of a hardware/communication recovery
pub const RESET_HOLD_MS: u32 = 100;

/// Minimum spacing of POLL commands
pub const POLL_INTERVAL_MS: u32 = 200;

/// An idle session older than this is completed automatically
pub const SESSION_IDLE_TIMEOUT_MS: u32 = 30_000;

/// Ceiling for a single UART transmit
pub const TRANSMIT_TIMEOUT_MS: u32 = 100;

/// Errors closer together than this count as one burst
pub const ERROR_BURST_WINDOW_MS: u32 = 5000;

/// A burst longer than this disables the reader
pub const MAX_BURST_ERRORS: u8 = 5;

/// NAK resends before giving up and resetting
pub const MAX_NAK_RETRIES: u8 = 3;

/// Hardware/communication errors that trigger a log dump
pub const SERIOUS_ERRORS_BEFORE_DUMP: u8 = 3;
