use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("Too many open files")]
    TooManyOpenFiles,

    #[error("Out of memory")]
    NoMemory,

    #[error("Operation would block")]
    WouldBlock,

    #[error("Function not implemented")]
    NotSupported,

    #[error("Inappropriate ioctl for device")]
    NotTty,

    #[error("Invalid argument")]
    InvalidArgument,

    #[error("Interrupted")]
    Interrupted,

    #[error("Timed out")]
    TimedOut,

    #[error("Device or resource busy")]
    Busy,

    #[error("I/O error")]
    Io,

    #[error("No such entry")]
    NoEntry,

    #[error("Bad file descriptor")]
    BadDescriptor,

    #[error("No async runtime to run deferred work on")]
    NoRuntime,

    #[error("Driver error: {0}")]
    Driver(i32),
}

impl Error {
    /// The errno value a C caller of the character device would see.
    pub fn errno(&self) -> i32 {
        match self {
            Error::TooManyOpenFiles => 24,
            Error::NoMemory => 12,
            Error::WouldBlock => 11,
            Error::NotSupported => 38,
            Error::NotTty => 25,
            Error::InvalidArgument => 22,
            Error::Interrupted => 4,
            Error::TimedOut => 110,
            Error::Busy => 16,
            Error::Io => 5,
            Error::NoEntry => 2,
            Error::BadDescriptor => 9,
            Error::NoRuntime => 19,
            Error::Driver(errno) => *errno,
        }
    }
}

impl From<can_proto::Error> for Error {
    fn from(_: can_proto::Error) -> Self {
        Error::InvalidArgument
    }
}
