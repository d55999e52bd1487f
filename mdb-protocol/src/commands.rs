//! Commands sent by the engine
//!
//! Every command is a tagged variant; encoding is an exhaustive match, so a
//! new command cannot silently fall through to a default case.

use heapless::Vec;

use crate::constants::*;
use crate::frame::{FrameError, MAX_COMMAND_LENGTH};

/// Encoded command bytes, checksum not yet appended
pub type CommandBytes = Vec<u8, MAX_COMMAND_LENGTH>;

/// SETUP subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupCommand {
    /// Announce the controller's capabilities and ask for the reader's
    ConfigData {
        vmc_feature_level: u8,
        display_columns: u8,
        display_rows: u8,
        display_info: u8,
    },
    /// Tell the reader the price range of the machine
    MaxMinPrices { max_price: u16, min_price: u16 },
}

/// VEND subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VendCommand {
    Request { price: u16, item: u16 },
    Cancel,
    Success { item: u16 },
    Failure,
    SessionComplete,
    NegativeRequest { price: u16, item: u16 },
}

/// READER subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReaderCommand {
    Disable,
    Enable,
    Cancel,
}

/// REVALUE subcommands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RevalueCommand {
    Request { amount: u16 },
}

/// Commands understood by a cashless device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Reset,
    Setup(SetupCommand),
    Poll,
    Vend(VendCommand),
    Reader(ReaderCommand),
    Revalue(RevalueCommand),
}

impl Command {
    /// Command byte (first byte on the wire)
    pub fn code(&self) -> u8 {
        match self {
            Command::Reset => CMD_RESET,
            Command::Setup(_) => CMD_SETUP,
            Command::Poll => CMD_POLL,
            Command::Vend(_) => CMD_VEND,
            Command::Reader(_) => CMD_READER,
            Command::Revalue(_) => CMD_REVALUE,
        }
    }

    /// Short name for log records
    pub fn name(&self) -> &'static str {
        match self {
            Command::Reset => "reset",
            Command::Setup(SetupCommand::ConfigData { .. }) => "setup.config",
            Command::Setup(SetupCommand::MaxMinPrices { .. }) => "setup.prices",
            Command::Poll => "poll",
            Command::Vend(VendCommand::Request { .. }) => "vend.request",
            Command::Vend(VendCommand::Cancel) => "vend.cancel",
            Command::Vend(VendCommand::Success { .. }) => "vend.success",
            Command::Vend(VendCommand::Failure) => "vend.failure",
            Command::Vend(VendCommand::SessionComplete) => "vend.session_complete",
            Command::Vend(VendCommand::NegativeRequest { .. }) => "vend.negative",
            Command::Reader(ReaderCommand::Disable) => "reader.disable",
            Command::Reader(ReaderCommand::Enable) => "reader.enable",
            Command::Reader(ReaderCommand::Cancel) => "reader.cancel",
            Command::Revalue(RevalueCommand::Request { .. }) => "revalue.request",
        }
    }

    /// Encode into command bytes (without checksum)
    pub fn encode(&self) -> Result<CommandBytes, FrameError> {
        let mut out = CommandBytes::new();
        out.push(self.code()).map_err(|_| FrameError::TooLong)?;

        match *self {
            Command::Reset | Command::Poll => {}
            Command::Setup(SetupCommand::ConfigData {
                vmc_feature_level,
                display_columns,
                display_rows,
                display_info,
            }) => extend(
                &mut out,
                &[
                    SETUP_CONFIG_DATA,
                    vmc_feature_level,
                    display_columns,
                    display_rows,
                    display_info,
                ],
            )?,
            Command::Setup(SetupCommand::MaxMinPrices {
                max_price,
                min_price,
            }) => {
                extend(&mut out, &[SETUP_MAX_MIN_PRICES])?;
                extend(&mut out, &max_price.to_be_bytes())?;
                extend(&mut out, &min_price.to_be_bytes())?;
            }
            Command::Vend(vend) => match vend {
                VendCommand::Request { price, item } => {
                    price_item(&mut out, VEND_REQUEST, price, item)?
                }
                VendCommand::Cancel => extend(&mut out, &[VEND_CANCEL])?,
                VendCommand::Success { item } => {
                    extend(&mut out, &[VEND_SUCCESS])?;
                    extend(&mut out, &item.to_be_bytes())?;
                }
                VendCommand::Failure => extend(&mut out, &[VEND_FAILURE])?,
                VendCommand::SessionComplete => extend(&mut out, &[VEND_SESSION_COMPLETE])?,
                VendCommand::NegativeRequest { price, item } => {
                    price_item(&mut out, VEND_NEGATIVE_REQUEST, price, item)?
                }
            },
            Command::Reader(reader) => {
                let sub = match reader {
                    ReaderCommand::Disable => READER_DISABLE,
                    ReaderCommand::Enable => READER_ENABLE,
                    ReaderCommand::Cancel => READER_CANCEL,
                };
                extend(&mut out, &[sub])?;
            }
            Command::Revalue(RevalueCommand::Request { amount }) => {
                extend(&mut out, &[REVALUE_REQUEST])?;
                extend(&mut out, &amount.to_be_bytes())?;
            }
        }

        Ok(out)
    }
}

fn extend(out: &mut CommandBytes, bytes: &[u8]) -> Result<(), FrameError> {
    out.extend_from_slice(bytes)
        .map_err(|_| FrameError::TooLong)
}

fn price_item(out: &mut CommandBytes, sub: u8, price: u16, item: u16) -> Result<(), FrameError> {
    extend(out, &[sub])?;
    extend(out, &price.to_be_bytes())?;
    extend(out, &item.to_be_bytes())
}
