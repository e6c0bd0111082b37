//! CAN message model and wire record format shared by the character device
//! engine and its clients.
//!
//! A wire record is the byte image `read` and `write` exchange with a CAN
//! character device:
//!
//! ```text
//! +-----------+--------+----------+-------------+------------------+
//! | u32 id LE | u8 dlc | u8 flags | 2x reserved | [u8] payload     |
//! +-----------+--------+----------+-------------+------------------+
//! ```
//!
//! The payload length is derived from the DLC, never stored.

mod codec;
mod error;
pub mod error_frame;
mod ioctl;

use std::fmt;

use bitflags::bitflags;
use bytes::{Buf, BufMut};

pub use codec::CanRecordCodec;
pub use error::*;
pub use ioctl::CanIoctl;

pub const HEADER_LENGTH: usize = 8;
pub const MAX_DATA_LENGTH: usize = 64;
pub const MAX_DLC: u8 = 15;

/// Smallest record that can appear on the wire: a header with no payload.
pub const MIN_MSG_LEN: usize = msg_len(0);

/// Largest standard (11 bit) identifier.
pub const MAX_STD_ID: u32 = 0x7ff;
/// Largest extended (29 bit) identifier.
pub const MAX_EXT_ID: u32 = 0x1fff_ffff;

bitflags! {
    /// The flags byte of a wire record header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CanFlags: u8 {
        const RTR = 0x01;
        const ERROR = 0x02;
        const EXTID = 0x04;
    }
}

// Codes 0 to 8 have the same coding as in classic CAN, 9 to 15 are the
// CAN FD lengths.
const DLC_TO_BYTES: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Payload byte count for a data length code. Only the low four bits are
/// significant, as in the hardware field.
pub const fn dlc_to_bytes(dlc: u8) -> usize {
    DLC_TO_BYTES[(dlc & 0x0f) as usize] as usize
}

/// Smallest data length code able to carry `nbytes` of payload.
pub fn bytes_to_dlc(nbytes: usize) -> Option<u8> {
    DLC_TO_BYTES
        .iter()
        .position(|&len| len as usize >= nbytes)
        .map(|dlc| dlc as u8)
}

/// Total wire record length for a payload of `nbytes`.
pub const fn msg_len(nbytes: usize) -> usize {
    HEADER_LENGTH + nbytes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanHeader {
    pub id: u32,
    pub dlc: u8,
    pub rtr: bool,
    pub error: bool,
    pub extended: bool,
}

impl CanHeader {
    pub fn data_len(&self) -> usize {
        dlc_to_bytes(self.dlc)
    }

    pub fn wire_len(&self) -> usize {
        msg_len(self.data_len())
    }

    pub fn flags(&self) -> CanFlags {
        let mut flags = CanFlags::empty();
        flags.set(CanFlags::RTR, self.rtr);
        flags.set(CanFlags::ERROR, self.error);
        flags.set(CanFlags::EXTID, self.extended);
        flags
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u32_le(self.id);
        dst.put_u8(self.dlc);
        dst.put_u8(self.flags().bits());
        dst.put_u16(0);
    }

    /// `src` must hold at least [`HEADER_LENGTH`] bytes.
    fn decode<B: Buf>(src: &mut B) -> Result<CanHeader> {
        let id = src.get_u32_le();
        let dlc = src.get_u8();
        let flags = CanFlags::from_bits_truncate(src.get_u8());
        src.advance(2);

        if dlc > MAX_DLC {
            return Err(Error::InvalidDlc(dlc));
        }

        Ok(CanHeader {
            id,
            dlc,
            rtr: flags.contains(CanFlags::RTR),
            error: flags.contains(CanFlags::ERROR),
            extended: flags.contains(CanFlags::EXTID),
        })
    }
}

/// A complete CAN message. Copied by value across queue boundaries.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CanMsg {
    pub header: CanHeader,
    pub data: [u8; MAX_DATA_LENGTH],
}

impl Default for CanMsg {
    fn default() -> Self {
        CanMsg {
            header: CanHeader::default(),
            data: [0u8; MAX_DATA_LENGTH],
        }
    }
}

impl fmt::Debug for CanMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanMsg")
            .field("header", &self.header)
            .field("data", &self.payload())
            .finish()
    }
}

impl CanMsg {
    /// Builds a data frame. Payloads that fall between two CAN FD lengths
    /// are zero padded up to the next one.
    pub fn new(id: u32, extended: bool, payload: &[u8]) -> Result<CanMsg> {
        check_id(id, extended)?;
        let dlc = bytes_to_dlc(payload.len()).ok_or(Error::PayloadTooLong(payload.len()))?;

        let mut msg = CanMsg {
            header: CanHeader {
                id,
                dlc,
                extended,
                ..CanHeader::default()
            },
            ..CanMsg::default()
        };
        msg.data[..payload.len()].copy_from_slice(payload);
        Ok(msg)
    }

    /// Builds a remote transmission request asking for `dlc` worth of data.
    pub fn remote(id: u32, extended: bool, dlc: u8) -> Result<CanMsg> {
        check_id(id, extended)?;
        if dlc > MAX_DLC {
            return Err(Error::InvalidDlc(dlc));
        }

        Ok(CanMsg {
            header: CanHeader {
                id,
                dlc,
                rtr: true,
                extended,
                ..CanHeader::default()
            },
            ..CanMsg::default()
        })
    }

    /// Copies a header and as much of `data` as the header's DLC covers.
    pub fn from_parts(header: &CanHeader, data: &[u8]) -> CanMsg {
        let mut msg = CanMsg {
            header: *header,
            ..CanMsg::default()
        };
        let nbytes = header.data_len().min(data.len());
        msg.data[..nbytes].copy_from_slice(&data[..nbytes]);
        msg
    }

    /// The synthetic frame a reader receives when the driver itself had
    /// trouble, `detail` being a set of `ERROR5_*` bits.
    pub fn internal_error(detail: u8) -> CanMsg {
        let mut msg = CanMsg {
            header: CanHeader {
                id: error_frame::ERROR_INTERNAL,
                dlc: error_frame::ERROR_DLC,
                error: true,
                ..CanHeader::default()
            },
            ..CanMsg::default()
        };
        msg.data[error_frame::ERROR_INTERNAL_BYTE] = detail;
        msg
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.header.data_len()]
    }

    pub fn wire_len(&self) -> usize {
        self.header.wire_len()
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        self.header.encode(dst);
        dst.put_slice(self.payload());
    }

    /// Decodes the record at the start of `src`. `Ok(None)` means `src` ends
    /// before the record does.
    pub fn decode(src: &[u8]) -> Result<Option<CanMsg>> {
        if src.len() < HEADER_LENGTH {
            return Ok(None);
        }

        let mut buf = src;
        let header = CanHeader::decode(&mut buf)?;
        let nbytes = header.data_len();
        if buf.len() < nbytes {
            return Ok(None);
        }

        Ok(Some(CanMsg::from_parts(&header, &buf[..nbytes])))
    }
}

fn check_id(id: u32, extended: bool) -> Result<()> {
    let max = if extended { MAX_EXT_ID } else { MAX_STD_ID };
    if id > max {
        Err(Error::InvalidId(id))
    } else {
        Ok(())
    }
}
