use num_derive::FromPrimitive;

/// Command codes of the CAN ioctl family. The character device handles the
/// RTR, flush and transceiver codes itself; the rest only mean something to
/// a lower-half driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum CanIoctl {
    Rtr = 0x0a01,
    GetBitTiming = 0x0a02,
    SetBitTiming = 0x0a03,
    AddStdFilter = 0x0a04,
    AddExtFilter = 0x0a05,
    DelStdFilter = 0x0a06,
    DelExtFilter = 0x0a07,
    GetConnModes = 0x0a08,
    SetConnModes = 0x0a09,
    BusOffRecovery = 0x0a0a,
    SetNart = 0x0a0b,
    SetAbom = 0x0a0c,
    IFlush = 0x0a0d,
    OFlush = 0x0a0e,
    IoFlush = 0x0a0f,
    SetTransvState = 0x0a10,
    GetTransvState = 0x0a11,
}

impl CanIoctl {
    pub fn from_code(cmd: u32) -> Option<CanIoctl> {
        num_traits::FromPrimitive::from_u32(cmd)
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}
