use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::device::{ReaderKey, Shared};
use crate::ioctl::{Ioctl, RtrRequest};
use crate::poll::{PollEvents, PollWaiter};
use crate::{Error, Result};

/// An open CAN character device.
///
/// Call [`CanFile::close`] to wait for the transmit path to drain. A file
/// that is just dropped releases its reference in the background.
pub struct CanFile {
    shared: Arc<Shared>,
    reader: Option<(ReaderKey, Arc<Semaphore>)>,
    writable: bool,
    nonblocking: AtomicBool,
    released: bool,
}

impl CanFile {
    pub(crate) fn new(
        shared: Arc<Shared>,
        reader: Option<(ReaderKey, Arc<Semaphore>)>,
        writable: bool,
        nonblocking: bool,
    ) -> CanFile {
        CanFile {
            shared,
            reader,
            writable,
            nonblocking: AtomicBool::new(nonblocking),
            released: false,
        }
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking.load(Ordering::Relaxed)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) {
        self.nonblocking.store(nonblocking, Ordering::Relaxed);
    }

    /// Reads as many whole records as fit into `buf`. Returns 0 when `buf`
    /// cannot hold the smallest record or the file is being closed.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let (key, sem) = self.reader.as_ref().ok_or(Error::BadDescriptor)?;
        self.shared
            .read(*key, sem, buf, self.is_nonblocking())
            .await
    }

    /// Queues the whole records in `buf` and returns how many bytes were
    /// taken.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        if !self.writable {
            return Err(Error::BadDescriptor);
        }
        self.shared.write(buf, self.is_nonblocking(), None).await
    }

    pub async fn ioctl(&self, request: Ioctl<'_>) -> Result<i32> {
        self.shared
            .ioctl(self.reader.as_ref(), request, self.is_nonblocking())
            .await
    }

    /// Sends a remote request and waits for the answer.
    pub async fn remote_request(&self, request: &mut RtrRequest) -> Result<()> {
        self.ioctl(Ioctl::Rtr(request)).await.map(|_| ())
    }

    pub async fn pending_write(&self) -> Result<usize> {
        self.ioctl(Ioctl::PendingWrite).await.map(|count| count as usize)
    }

    pub async fn pending_read(&self) -> Result<usize> {
        self.ioctl(Ioctl::PendingRead).await.map(|count| count as usize)
    }

    /// Registers `waiter` and reports whatever is ready right away.
    pub async fn poll_setup(&self, waiter: PollWaiter) -> Result<()> {
        let (key, _) = self.reader.as_ref().ok_or(Error::BadDescriptor)?;
        let _poll = self.shared.poll_lock.lock().await;

        let mut inner = self.shared.critical();
        let space = inner.sender.free_count() > 0;
        let reader = inner.readers.get_mut(*key).ok_or(Error::BadDescriptor)?;
        if reader.waiter.is_some() {
            return Err(Error::Busy);
        }

        let mut ready = PollEvents::empty();
        if space {
            ready |= PollEvents::OUT;
        }
        if !reader.fifo.is_empty() || reader.fifo.error() != 0 {
            ready |= PollEvents::IN;
        }
        if !ready.is_empty() {
            waiter.notify(ready);
        }
        reader.waiter = Some(waiter);
        Ok(())
    }

    pub async fn poll_teardown(&self) -> Result<()> {
        let (key, _) = self.reader.as_ref().ok_or(Error::BadDescriptor)?;
        let _poll = self.shared.poll_lock.lock().await;

        let waiter = {
            let mut inner = self.shared.critical();
            let reader = inner.readers.get_mut(*key).ok_or(Error::BadDescriptor)?;
            reader.waiter.take()
        };
        waiter.map(drop).ok_or(Error::InvalidArgument)
    }

    /// Releases the file. The last close waits until every queued message
    /// has left the controller, then shuts it down.
    ///
    /// The release runs as its own task, so it completes even when the
    /// returned future is dropped early.
    pub async fn close(mut self) {
        self.released = true;
        let shared = self.shared.clone();
        let reader = self.reader.as_ref().map(|(key, _)| *key);

        let release = tokio::spawn(async move { shared.release(reader).await });
        if let Err(e) = release.await {
            log::error!("{}: release failed: {}", self.shared.config.name, e);
        }
    }
}

impl Drop for CanFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let shared = self.shared.clone();
        let reader = self.reader.as_ref().map(|(key, _)| *key);
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { shared.release(reader).await });
            }
            Err(_) => log::warn!("{}: file dropped outside a runtime, leaking it", shared.config.name),
        }
    }
}
