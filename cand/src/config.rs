use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::loopback::LoopbackOptions;
use crate::{Error, Result};

/// How the lower half reports that a message left the software sender.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TxMode {
    /// Completion is reported from the interrupt handler once the frame is
    /// physically on the bus.
    #[default]
    Direct,
    /// Acceptance into the controller's own transmit queue is the
    /// completion. The controller raises a separate "space available"
    /// interrupt that is handled as deferred work.
    HardwareQueue,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case")]
pub struct DeviceConfig {
    pub name: String,
    /// Slots per reader. One slot always stays free, so a reader buffers at
    /// most `rx_fifo_size - 1` messages.
    pub rx_fifo_size: usize,
    pub tx_fifo_size: usize,
    pub npending_rtr: usize,
    pub tx_mode: TxMode,
    /// Send remote requests through the regular write path when the lower
    /// half has no dedicated primitive.
    pub use_rtr: bool,
    /// Report driver faults as in-band error frames.
    pub errors: bool,
    pub drain_poll_interval_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name: "can0".to_owned(),
            rx_fifo_size: 8,
            tx_fifo_size: 8,
            npending_rtr: 4,
            tx_mode: TxMode::Direct,
            use_rtr: true,
            errors: true,
            drain_poll_interval_ms: 500,
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rx_fifo_size < 2 || self.tx_fifo_size == 0 || self.drain_poll_interval_ms == 0 {
            log::error!("Invalid configuration for {}: {:?}", self.name, self);
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }
}

/// Daemon configuration file.
#[derive(Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub loopback: LoopbackOptions,
    #[serde(default)]
    pub listen: Vec<Listen>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind")]
pub enum Listen {
    #[serde(rename = "tcp")]
    Tcp { bind: SocketAddr },
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
