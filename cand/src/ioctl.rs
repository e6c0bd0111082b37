use std::time::Duration;

use tokio::sync::Semaphore;

use can_proto::{CanIoctl, CanMsg};

use crate::device::{ReaderKey, Shared};
use crate::poll::PollEvents;
use crate::{Error, Result};

/// Argument of a remote transmission request. `msg` names the identifier
/// to ask for and is replaced by the answer.
#[derive(Debug, Clone)]
pub struct RtrRequest {
    pub timeout: Duration,
    pub msg: CanMsg,
}

impl RtrRequest {
    pub fn new(msg: CanMsg, timeout: Duration) -> RtrRequest {
        RtrRequest { timeout, msg }
    }
}

/// Control requests understood by a CAN file.
#[derive(Debug)]
pub enum Ioctl<'a> {
    /// `CANIOC_RTR`
    Rtr(&'a mut RtrRequest),
    /// `CANIOC_IFLUSH`
    InputFlush,
    /// `CANIOC_OFLUSH`
    OutputFlush,
    /// `CANIOC_IOFLUSH`
    IoFlush,
    /// `FIONWRITE`: messages queued but not yet handed to the controller.
    PendingWrite,
    /// `FIONREAD`: messages waiting for this reader, plus one for a pending
    /// error frame.
    PendingRead,
    /// `CANIOC_SET_TRANSVSTATE`
    SetTransceiverState(u32),
    /// `CANIOC_GET_TRANSVSTATE`
    GetTransceiverState,
    /// Anything else goes to the lower half untouched.
    Driver { cmd: u32, arg: usize },
}

/// The reader a request acts on, if the file has one.
pub(crate) type ReaderRef<'a> = Option<&'a (ReaderKey, std::sync::Arc<Semaphore>)>;

impl Shared {
    pub(crate) async fn ioctl(
        &self,
        reader: ReaderRef<'_>,
        request: Ioctl<'_>,
        nonblocking: bool,
    ) -> Result<i32> {
        match request {
            Ioctl::Rtr(request) => self.rtr_read(request, nonblocking).await.map(|()| 0),
            Ioctl::InputFlush => {
                self.flush_input(reader);
                self.lower_ioctl(CanIoctl::IFlush.code(), 0)
            }
            Ioctl::OutputFlush => {
                self.flush_output();
                self.lower_ioctl(CanIoctl::OFlush.code(), 0)
            }
            Ioctl::IoFlush => {
                self.flush_input(reader);
                self.flush_output();
                self.lower_ioctl(CanIoctl::IoFlush.code(), 0)
            }
            Ioctl::PendingWrite => {
                let inner = self.critical();
                let count = inner.sender.pending_count() - inner.sender.sending_count();
                Ok(count as i32)
            }
            Ioctl::PendingRead => {
                let (key, _) = reader.ok_or(Error::BadDescriptor)?;
                let inner = self.critical();
                let reader = inner.readers.get(*key).ok_or(Error::BadDescriptor)?;
                let count = reader.fifo.len() + usize::from(reader.fifo.error() != 0);
                Ok(count as i32)
            }
            Ioctl::SetTransceiverState(state) => {
                let mut inner = self.critical();
                let transceiver = inner.lower.transceiver().ok_or(Error::NotTty)?;
                transceiver.set_state(state).map(|()| 0)
            }
            Ioctl::GetTransceiverState => {
                let mut inner = self.critical();
                let transceiver = inner.lower.transceiver().ok_or(Error::NotTty)?;
                transceiver.state().map(|state| state as i32)
            }
            Ioctl::Driver { cmd, arg } => self.lower_ioctl(cmd, arg),
        }
    }

    fn lower_ioctl(&self, cmd: u32, arg: usize) -> Result<i32> {
        self.critical().lower.ioctl(cmd, arg)
    }

    /// Discards what the reader has not consumed yet.
    fn flush_input(&self, reader: ReaderRef<'_>) {
        let (key, sem) = match reader {
            Some(reader) => reader,
            None => return,
        };

        let mut inner = self.critical();
        if let Some(reader) = inner.readers.get_mut(*key) {
            reader.fifo.clear();
            while let Ok(permit) = sem.try_acquire() {
                permit.forget();
            }
        }
    }

    /// Discards every queued message, including those the controller holds.
    fn flush_output(&self) {
        let mut inner = self.critical();
        inner.sender.reset();
        if inner.ntxwaiters > 0 {
            self.tx_space.add_permits(inner.ntxwaiters);
        }
        inner.notify_all(PollEvents::OUT);
        self.tx_progress.notify_waiters();
    }
}
