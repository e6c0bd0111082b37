//! Upper half of a CAN character device: a multi-reader message bus with a
//! bounded transmit queue on top of an interrupt driven controller.

pub mod config;
mod device;
mod error;
mod fifo;
mod file;
mod ioctl;
pub mod loopback;
mod lower;
mod poll;
mod rtr;
mod rx;
mod sender;
mod tx;
mod txready;
pub mod util;

pub use can_proto;

pub use crate::config::{DeviceConfig, TxMode};
pub use crate::device::{CanDevice, OpenOptions, UpperHalf, MAX_OPENS};
pub use crate::error::{Error, Result};
pub use crate::file::CanFile;
pub use crate::ioctl::{Ioctl, RtrRequest};
pub use crate::lower::{LowerHalf, Transceiver};
pub use crate::poll::{PollEvents, PollWaiter};
