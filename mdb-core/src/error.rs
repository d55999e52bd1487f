//! Error classification
//!
//! Every failure in the engine is one of these kinds. The kind decides the
//! recovery action (see [`crate::recovery`]).

use mdb_protocol::{DecodeError, FrameError};

/// Closed set of error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// Peer answered NAK
    Nak,
    /// Peer did not answer in time
    Timeout,
    /// Frame failed checksum validation
    Checksum,
    /// Action incompatible with the current session phase
    State,
    /// Malformed input (length, truncated arguments)
    Parameter,
    /// Line failure: transmit error or gap inside a frame
    Communication,
    /// Correct phase, but mistimed or duplicated
    Sequence,
    /// Vend amount exceeds the available funds
    Funds,
    /// Reader reported a malfunction
    Hardware,
}

impl ErrorKind {
    /// Number of kinds, for per-kind statistics
    pub const COUNT: usize = 9;

    /// Stable index into per-kind tables
    pub fn index(self) -> usize {
        match self {
            ErrorKind::Nak => 0,
            ErrorKind::Timeout => 1,
            ErrorKind::Checksum => 2,
            ErrorKind::State => 3,
            ErrorKind::Parameter => 4,
            ErrorKind::Communication => 5,
            ErrorKind::Sequence => 6,
            ErrorKind::Funds => 7,
            ErrorKind::Hardware => 8,
        }
    }

    /// Short name for log records
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Nak => "nak",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Checksum => "checksum",
            ErrorKind::State => "state",
            ErrorKind::Parameter => "parameter",
            ErrorKind::Communication => "communication",
            ErrorKind::Sequence => "sequence",
            ErrorKind::Funds => "funds",
            ErrorKind::Hardware => "hardware",
        }
    }

    /// Errors counted towards a log dump
    pub fn is_serious(self) -> bool {
        matches!(self, ErrorKind::Hardware | ErrorKind::Communication)
    }

    /// All kinds in index order
    pub const ALL: [ErrorKind; Self::COUNT] = [
        ErrorKind::Nak,
        ErrorKind::Timeout,
        ErrorKind::Checksum,
        ErrorKind::State,
        ErrorKind::Parameter,
        ErrorKind::Communication,
        ErrorKind::Sequence,
        ErrorKind::Funds,
        ErrorKind::Hardware,
    ];
}

impl From<FrameError> for ErrorKind {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Empty | FrameError::TooLong => ErrorKind::Parameter,
            FrameError::Checksum => ErrorKind::Checksum,
        }
    }
}

impl From<DecodeError> for ErrorKind {
    fn from(_: DecodeError) -> Self {
        ErrorKind::Parameter
    }
}
