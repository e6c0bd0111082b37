use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid data length code {0}")]
    InvalidDlc(u8),

    #[error("Payload of {0} bytes does not fit a CAN frame")]
    PayloadTooLong(usize),

    #[error("Identifier {0:#x} out of range")]
    InvalidId(u32),
}
