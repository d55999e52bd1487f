//! Byte values defined by the MDB cashless device command table

// Single-byte replies
pub const ACK: u8 = 0x00;
pub const NAK: u8 = 0xFF;
pub const RET: u8 = 0xAA;

// Commands
pub const CMD_RESET: u8 = 0x10;
pub const CMD_SETUP: u8 = 0x11;
pub const CMD_POLL: u8 = 0x12;
pub const CMD_VEND: u8 = 0x13;
pub const CMD_READER: u8 = 0x14;
pub const CMD_REVALUE: u8 = 0x15;

// SETUP subcommands
pub const SETUP_CONFIG_DATA: u8 = 0x00;
pub const SETUP_MAX_MIN_PRICES: u8 = 0x01;

// VEND subcommands
pub const VEND_REQUEST: u8 = 0x00;
pub const VEND_CANCEL: u8 = 0x01;
pub const VEND_SUCCESS: u8 = 0x02;
pub const VEND_FAILURE: u8 = 0x03;
pub const VEND_SESSION_COMPLETE: u8 = 0x04;
pub const VEND_NEGATIVE_REQUEST: u8 = 0x06;

// READER subcommands
pub const READER_DISABLE: u8 = 0x00;
pub const READER_ENABLE: u8 = 0x01;
pub const READER_CANCEL: u8 = 0x02;

// REVALUE subcommands
pub const REVALUE_REQUEST: u8 = 0x00;

// Reader responses
pub const RSP_JUST_RESET: u8 = 0x00;
pub const RSP_READER_CONFIG: u8 = 0x01;
pub const RSP_DISPLAY_REQUEST: u8 = 0x02;
pub const RSP_BEGIN_SESSION: u8 = 0x03;
pub const RSP_SESSION_CANCEL_REQUEST: u8 = 0x04;
pub const RSP_VEND_APPROVED: u8 = 0x05;
pub const RSP_VEND_DENIED: u8 = 0x06;
pub const RSP_END_SESSION: u8 = 0x07;
pub const RSP_CANCELLED: u8 = 0x08;
pub const RSP_PERIPHERAL_ID: u8 = 0x09;
pub const RSP_MALFUNCTION: u8 = 0x0A;
pub const RSP_OUT_OF_SEQUENCE: u8 = 0x0B;
pub const RSP_REVALUE_APPROVED: u8 = 0x0D;
pub const RSP_REVALUE_DENIED: u8 = 0x0E;
pub const RSP_REVALUE_LIMIT: u8 = 0x0F;
