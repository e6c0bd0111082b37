//! Error frame vocabulary.
//!
//! An error frame has the error flag set in its header, one of the
//! `ERROR_*` class bits as identifier and [`ERROR_DLC`] bytes of detail.

pub const ERROR_DLC: u8 = 8;

pub const ERROR_TXTIMEOUT: u32 = 1 << 0;
pub const ERROR_LOSTARB: u32 = 1 << 1;
pub const ERROR_CONTROLLER: u32 = 1 << 2;
pub const ERROR_PROTOCOL: u32 = 1 << 3;
pub const ERROR_TRANSCEIVER: u32 = 1 << 4;
pub const ERROR_NOACK: u32 = 1 << 5;
pub const ERROR_BUSOFF: u32 = 1 << 6;
pub const ERROR_BUSERROR: u32 = 1 << 7;
pub const ERROR_RESTARTED: u32 = 1 << 8;
/// Raised by the character device itself rather than the controller.
pub const ERROR_INTERNAL: u32 = 1 << 9;

/// Payload byte carrying the `ERROR5_*` detail bits.
pub const ERROR_INTERNAL_BYTE: usize = 5;

pub const ERROR5_UNSPEC: u8 = 0x00;
pub const ERROR5_RXOVERFLOW: u8 = 1 << 0;
pub const ERROR5_TXOVERFLOW: u8 = 1 << 1;
