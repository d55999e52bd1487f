//! 9-bit UART abstraction for the Multi-Drop Bus
//!
//! MDB frames are 8 data bits plus a ninth "mode" bit. On bytes sent by a
//! peripheral the mode bit marks the last byte of a message; the engine uses
//! it to find frame boundaries in the byte stream.

/// A byte received from the bus together with its mode bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxByte {
    /// Eight data bits
    pub data: u8,
    /// Ninth bit; set on the final byte of a message
    pub mode: bool,
}

impl RxByte {
    /// A byte inside a message
    pub const fn data(data: u8) -> Self {
        Self { data, mode: false }
    }

    /// The final byte of a message
    pub const fn last(data: u8) -> Self {
        Self { data, mode: true }
    }
}

/// Serial line carrying MDB traffic
///
/// Implementations own the mode-bit signalling: `transmit` marks the final
/// byte of the slice, and `receive_byte` reports the mode bit of each byte.
pub trait MdbUart {
    /// Error type for line operations
    type Error;

    /// Write a complete message, giving up after `timeout_ms`
    fn transmit(&mut self, bytes: &[u8], timeout_ms: u32) -> Result<(), Self::Error>;

    /// Wait up to `timeout_ms` for one byte
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn receive_byte(&mut self, timeout_ms: u32) -> Result<Option<RxByte>, Self::Error>;
}

impl<T: MdbUart + ?Sized> MdbUart for &mut T {
    type Error = T::Error;

    fn transmit(&mut self, bytes: &[u8], timeout_ms: u32) -> Result<(), Self::Error> {
        (**self).transmit(bytes, timeout_ms)
    }

    fn receive_byte(&mut self, timeout_ms: u32) -> Result<Option<RxByte>, Self::Error> {
        (**self).receive_byte(timeout_ms)
    }
}
