use can_proto::CanMsg;

use crate::{Error, Result};

/// Hardware side of a CAN character device.
///
/// Every method runs inside the device critical section. Implementations
/// must not block and must never call back into the `UpperHalf` from here.
pub trait LowerHalf: Send {
    /// Puts the controller into a known state. Called once at registration.
    fn reset(&mut self);

    /// Brings the controller up on first open.
    fn setup(&mut self) -> Result<()>;

    /// Powers the controller down after the last close has drained.
    fn shutdown(&mut self);

    fn rxint(&mut self, enable: bool);

    fn txint(&mut self, enable: bool);

    /// Hands one message to the controller. A rejected message is retried
    /// by the next transmit kick.
    fn send(&mut self, msg: &CanMsg) -> Result<()>;

    /// Whether `send` would currently accept a message.
    fn txready(&self) -> bool;

    /// Whether the controller's own transmit path is idle.
    fn txempty(&self) -> bool;

    fn supports_remote_request(&self) -> bool {
        false
    }

    /// Asks the controller to emit a remote frame for a standard identifier.
    fn remote_request(&mut self, _id: u16) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn transceiver(&mut self) -> Option<&mut dyn Transceiver> {
        None
    }

    /// Commands the upper half does not interpret itself.
    fn ioctl(&mut self, cmd: u32, arg: usize) -> Result<i32>;
}

/// Optional transceiver power state control.
pub trait Transceiver: Send {
    fn set_state(&mut self, _state: u32) -> Result<()> {
        Err(Error::NotTty)
    }

    fn state(&self) -> Result<u32> {
        Err(Error::NotTty)
    }
}
