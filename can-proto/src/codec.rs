use std::io;
use std::io::ErrorKind;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{CanMsg, HEADER_LENGTH};

/// Frames a byte stream into whole CAN wire records.
pub struct CanRecordCodec;

impl Decoder for CanRecordCodec {
    type Item = CanMsg;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match CanMsg::decode(&src[..]) {
            Ok(Some(msg)) => {
                src.advance(msg.wire_len());
                Ok(Some(msg))
            }
            Ok(None) => {
                // more bytes are needed
                src.reserve(HEADER_LENGTH);
                Ok(None)
            }
            Err(e) => Err(io::Error::new(ErrorKind::InvalidData, e)),
        }
    }
}

impl Encoder<CanMsg> for CanRecordCodec {
    type Error = io::Error;

    fn encode(&mut self, item: CanMsg, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.wire_len());
        item.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_back_to_back_records() {
        let first = CanMsg::new(0x100, false, &[1]).unwrap();
        let second = CanMsg::new(0x1abc_def0, true, &[2; 16]).unwrap();

        let mut buf = BytesMut::new();
        CanRecordCodec.encode(first, &mut buf).unwrap();
        CanRecordCodec.encode(second, &mut buf).unwrap();
        let tail = buf.split_off(buf.len() - 3);

        assert_eq!(CanRecordCodec.decode(&mut buf).unwrap(), Some(first));
        assert_eq!(CanRecordCodec.decode(&mut buf).unwrap(), None);

        buf.unsplit(tail);
        assert_eq!(CanRecordCodec.decode(&mut buf).unwrap(), Some(second));
        assert!(buf.is_empty());
    }

    #[test]
    fn invalid_dlc_is_invalid_data() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0, 0x20, 0, 0, 0][..]);
        let err = CanRecordCodec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
