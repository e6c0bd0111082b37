#![allow(dead_code)]

use cand::can_proto::{msg_len, CanMsg, MAX_DATA_LENGTH};
use cand::loopback::{Loopback, LoopbackBus, LoopbackOptions};
use cand::{CanDevice, DeviceConfig, OpenOptions, UpperHalf};

pub struct Rig {
    pub device: CanDevice,
    pub upper: UpperHalf,
    pub bus: LoopbackBus,
}

pub fn rig(config: DeviceConfig, options: LoopbackOptions) -> Rig {
    let (lower, bus) = Loopback::new(&options, config.tx_mode);
    let device = CanDevice::register(lower, config).unwrap();
    let upper = device.upper();
    Rig { device, upper, bus }
}

pub fn default_rig() -> Rig {
    rig(DeviceConfig::default(), LoopbackOptions::default())
}

pub fn msg(id: u32, payload: &[u8]) -> CanMsg {
    CanMsg::new(id, false, payload).unwrap()
}

pub fn encode(msgs: &[CanMsg]) -> Vec<u8> {
    let mut buf = Vec::new();
    for msg in msgs {
        msg.encode(&mut buf);
    }
    buf
}

pub fn decode_all(mut buf: &[u8]) -> Vec<CanMsg> {
    let mut msgs = Vec::new();
    while let Some(msg) = CanMsg::decode(buf).unwrap() {
        buf = &buf[msg.wire_len()..];
        msgs.push(msg);
    }
    assert!(buf.is_empty(), "trailing bytes in read buffer");
    msgs
}

pub fn read_buffer() -> Vec<u8> {
    vec![0u8; 32 * msg_len(MAX_DATA_LENGTH)]
}

pub fn rw() -> OpenOptions {
    OpenOptions::new().read(true).write(true)
}

pub fn read_only() -> OpenOptions {
    OpenOptions::new().read(true)
}

pub fn write_only() -> OpenOptions {
    OpenOptions::new().write(true)
}

pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
