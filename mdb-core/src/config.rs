//! Host-side settings
//!
//! These values are announced to the reader during SETUP. The host may keep
//! them in flash as postcard-serialized binary data.

use mdb_hal::LogLevel;
use serde::{Deserialize, Serialize};

pub use mdb_protocol::{MiscOptions, ReaderConfig};

/// Largest encoded size of [`DeviceSettings`]
pub const SETTINGS_MAX_SIZE: usize = 32;

/// Controller parameters sent to the reader during SETUP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceSettings {
    /// MDB feature level of the controller (1-3)
    pub vmc_feature_level: u8,
    /// Display columns, 0 if no display
    pub display_columns: u8,
    /// Display rows, 0 if no display
    pub display_rows: u8,
    /// Display type information byte
    pub display_info: u8,
    /// Highest price on the machine (scaled)
    pub max_price: u16,
    /// Lowest price on the machine (scaled)
    pub min_price: u16,
    /// Records noisier than this are not forwarded to the sink
    pub log_level: LogLevel,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vmc_feature_level: 1,
            display_columns: 0,
            display_rows: 0,
            display_info: 0,
            max_price: u16::MAX,
            min_price: 0,
            log_level: LogLevel::Info,
        }
    }
}

impl DeviceSettings {
    /// Serialize into `buf`, returning the used prefix
    pub fn to_slice<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], postcard::Error> {
        postcard::to_slice(self, buf)
    }

    /// Deserialize from bytes written by [`DeviceSettings::to_slice`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
