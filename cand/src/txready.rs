use std::sync::Weak;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::device::{Inner, Shared};
use crate::{Error, Result};

impl Shared {
    /// Schedules a transmit kick outside interrupt context. At most one
    /// kick is outstanding; asking again while it is reports `Busy`.
    pub(crate) fn txready(&self, inner: &mut Inner) -> Result<()> {
        let work = self.work.as_ref().ok_or(Error::NotSupported)?;
        if inner.sender.is_empty() {
            // Turns transmit interrupts off once the controller queue drained.
            let _ = self.xmit(inner);
            return Err(Error::NoEntry);
        }

        work.try_send(()).map_err(|err| match err {
            TrySendError::Full(()) => Error::Busy,
            TrySendError::Closed(()) => Error::Io,
        })
    }

    fn txready_work(&self) {
        let mut inner = self.critical();
        if inner.sender.is_empty() {
            return;
        }

        if self.xmit(&mut inner).is_ok() && inner.ntxwaiters > 0 {
            self.tx_space.add_permits(1);
        }
    }
}

/// Runs queued transmit kicks until the device goes away.
pub(crate) async fn worker(shared: Weak<Shared>, mut mailbox: mpsc::Receiver<()>) {
    while mailbox.recv().await.is_some() {
        let shared = match shared.upgrade() {
            Some(shared) => shared,
            None => break,
        };
        shared.txready_work();
    }
    log::debug!("Transmit worker exiting");
}
