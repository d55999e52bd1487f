//! Responses decoded from reader frames
//!
//! Codes and layouts follow the MDB cashless device response table. Multi-
//! byte amounts are big-endian and expressed in scaled units (see
//! [`ReaderConfig::scale_factor`]).

use crate::constants::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors raised while decoding a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// No bytes at all
    Empty,
    /// Known response code with fewer argument bytes than it needs
    Truncated { code: u8 },
}

/// Reader option flags from the SETUP response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MiscOptions(pub u8);

impl MiscOptions {
    /// Reader can refund a failed vend to the card
    pub fn refundable(&self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Reader allows several vends per session
    pub fn multivend(&self) -> bool {
        self.0 & 0x02 != 0
    }
}

/// Reader capabilities learned during SETUP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReaderConfig {
    /// MDB feature level the reader implements (1-3)
    pub feature_level: u8,
    /// ISO 4217 numeric currency code, BCD packed
    pub country_code: u16,
    /// Multiply scaled amounts by this to get the smallest currency unit
    pub scale_factor: u8,
    /// Decimal places of the currency
    pub decimal_places: u8,
    /// Longest time the reader may take to answer, in seconds
    pub max_response_time_s: u8,
    pub misc_options: MiscOptions,
    /// Highest price on the machine (scaled), set by SETUP max/min prices
    pub max_price: u16,
    /// Lowest price on the machine (scaled)
    pub min_price: u16,
}

impl ReaderConfig {
    /// Parse the argument bytes following the `0x01` response code
    fn parse(args: &[u8]) -> Option<Self> {
        match *args {
            [feature_level, country_hi, country_lo, scale_factor, decimal_places, max_response_time_s, misc, ..] => {
                Some(Self {
                    feature_level,
                    country_code: u16::from_be_bytes([country_hi, country_lo]),
                    scale_factor,
                    decimal_places,
                    max_response_time_s,
                    misc_options: MiscOptions(misc),
                    max_price: u16::MAX,
                    min_price: 0,
                })
            }
            _ => None,
        }
    }

    /// Record the price bounds announced with SETUP max/min prices
    pub fn with_price_bounds(mut self, max_price: u16, min_price: u16) -> Self {
        self.max_price = max_price;
        self.min_price = min_price;
        self
    }
}

/// Responses a reader may send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    JustReset,
    ReaderConfig(ReaderConfig),
    /// Reader wants the controller display for `duration_ds` tenths of a second
    DisplayRequest { duration_ds: u8 },
    BeginSession { funds: u16 },
    SessionCancelRequest,
    VendApproved { amount: u16 },
    VendDenied,
    EndSession,
    Cancelled,
    PeripheralId,
    Malfunction { code: u8 },
    OutOfSequence,
    RevalueApproved,
    RevalueDenied,
    RevalueLimit { amount: u16 },
    /// Reserved or vendor-specific code
    Unknown(u8),
}

impl Response {
    /// Decode a frame's data bytes (checksum already stripped)
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (&code, args) = bytes.split_first().ok_or(DecodeError::Empty)?;
        let truncated = DecodeError::Truncated { code };

        let response = match code {
            RSP_JUST_RESET => Response::JustReset,
            RSP_READER_CONFIG => {
                Response::ReaderConfig(ReaderConfig::parse(args).ok_or(truncated)?)
            }
            RSP_DISPLAY_REQUEST => Response::DisplayRequest {
                duration_ds: *args.first().ok_or(truncated)?,
            },
            RSP_BEGIN_SESSION => Response::BeginSession {
                funds: read_u16(args).ok_or(truncated)?,
            },
            RSP_SESSION_CANCEL_REQUEST => Response::SessionCancelRequest,
            RSP_VEND_APPROVED => Response::VendApproved {
                amount: read_u16(args).ok_or(truncated)?,
            },
            RSP_VEND_DENIED => Response::VendDenied,
            RSP_END_SESSION => Response::EndSession,
            RSP_CANCELLED => Response::Cancelled,
            RSP_PERIPHERAL_ID => Response::PeripheralId,
            RSP_MALFUNCTION => Response::Malfunction {
                code: args.first().copied().unwrap_or(0),
            },
            RSP_OUT_OF_SEQUENCE => Response::OutOfSequence,
            RSP_REVALUE_APPROVED => Response::RevalueApproved,
            RSP_REVALUE_DENIED => Response::RevalueDenied,
            RSP_REVALUE_LIMIT => Response::RevalueLimit {
                amount: read_u16(args).ok_or(truncated)?,
            },
            other => Response::Unknown(other),
        };

        Ok(response)
    }

    /// Response code byte
    pub fn code(&self) -> u8 {
        match self {
            Response::JustReset => RSP_JUST_RESET,
            Response::ReaderConfig(_) => RSP_READER_CONFIG,
            Response::DisplayRequest { .. } => RSP_DISPLAY_REQUEST,
            Response::BeginSession { .. } => RSP_BEGIN_SESSION,
            Response::SessionCancelRequest => RSP_SESSION_CANCEL_REQUEST,
            Response::VendApproved { .. } => RSP_VEND_APPROVED,
            Response::VendDenied => RSP_VEND_DENIED,
            Response::EndSession => RSP_END_SESSION,
            Response::Cancelled => RSP_CANCELLED,
            Response::PeripheralId => RSP_PERIPHERAL_ID,
            Response::Malfunction { .. } => RSP_MALFUNCTION,
            Response::OutOfSequence => RSP_OUT_OF_SEQUENCE,
            Response::RevalueApproved => RSP_REVALUE_APPROVED,
            Response::RevalueDenied => RSP_REVALUE_DENIED,
            Response::RevalueLimit { .. } => RSP_REVALUE_LIMIT,
            Response::Unknown(code) => *code,
        }
    }
}

fn read_u16(args: &[u8]) -> Option<u16> {
    match *args {
        [hi, lo, ..] => Some(u16::from_be_bytes([hi, lo])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reader_config() {
        let bytes = [0x01, 0x01, 0x18, 0x40, 0x05, 0x02, 0x0A, 0x03];
        let Response::ReaderConfig(config) = Response::decode(&bytes).unwrap() else {
            panic!("expected reader config");
        };
        assert_eq!(config.feature_level, 1);
        assert_eq!(config.country_code, 0x1840);
        assert_eq!(config.scale_factor, 5);
        assert_eq!(config.decimal_places, 2);
        assert_eq!(config.max_response_time_s, 10);
        assert!(config.misc_options.refundable());
        assert!(config.misc_options.multivend());
    }

    #[test]
    fn test_truncated_reader_config() {
        assert_eq!(
            Response::decode(&[0x01, 0x01, 0x18]),
            Err(DecodeError::Truncated { code: 0x01 })
        );
    }

    #[test]
    fn test_decode_begin_session_funds() {
        assert_eq!(
            Response::decode(&[0x03, 0x01, 0xF4]),
            Ok(Response::BeginSession { funds: 500 })
        );
        assert_eq!(
            Response::decode(&[0x03, 0x01]),
            Err(DecodeError::Truncated { code: 0x03 })
        );
    }

    #[test]
    fn test_decode_vend_approved() {
        assert_eq!(
            Response::decode(&[0x05, 0x00, 0x64]),
            Ok(Response::VendApproved { amount: 100 })
        );
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let response = Response::decode(&[0x42, 0x01]).unwrap();
        assert_eq!(response, Response::Unknown(0x42));
        assert_eq!(response.code(), 0x42);
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(Response::decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn test_code_roundtrip_for_bare_responses() {
        for code in [0x00, 0x04, 0x06, 0x07, 0x08, 0x09, 0x0B, 0x0D, 0x0E] {
            assert_eq!(Response::decode(&[code]).unwrap().code(), code);
        }
    }
}
