use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use slotmap::DenseSlotMap;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify, Semaphore};
use tokio::time;

use can_proto::CanHeader;

use crate::config::{DeviceConfig, TxMode};
use crate::fifo::RxFifo;
use crate::file::CanFile;
use crate::lower::LowerHalf;
use crate::poll::{PollEvents, PollWaiter};
use crate::rtr::RtrTable;
use crate::sender::TxQueue;
use crate::txready;
use crate::{Error, Result};

/// Concurrent opens allowed per device.
pub const MAX_OPENS: usize = 255;

slotmap::new_key_type! {
    pub(crate) struct ReaderKey;
}

/// Receive state of one file opened for reading.
pub(crate) struct Reader {
    pub fifo: RxFifo,
    /// One permit while the fifo holds data. Closed when the file goes
    /// away, so a blocked read sees end of file.
    pub sem: Arc<Semaphore>,
    pub waiter: Option<PollWaiter>,
}

impl Reader {
    fn new(fifo_size: usize) -> Reader {
        Reader {
            fifo: RxFifo::new(fifo_size),
            sem: Arc::new(Semaphore::new(0)),
            waiter: None,
        }
    }
}

/// Everything the interrupt side and the file side both touch.
pub(crate) struct Inner {
    pub lower: Box<dyn LowerHalf>,
    pub sender: TxQueue,
    pub readers: DenseSlotMap<ReaderKey, Reader>,
    pub rtr: RtrTable,
    pub crefs: usize,
    pub ntxwaiters: usize,
}

impl Inner {
    pub fn notify_all(&self, events: PollEvents) {
        for reader in self.readers.values() {
            if let Some(waiter) = &reader.waiter {
                waiter.notify(events);
            }
        }
    }
}

pub(crate) struct Shared {
    pub config: DeviceConfig,
    inner: Mutex<Inner>,
    /// Serializes open against close.
    pub close_lock: AsyncMutex<()>,
    pub poll_lock: AsyncMutex<()>,
    /// Posted by completions while writers wait for sender space.
    pub tx_space: Semaphore,
    /// Fired on every completion.
    pub tx_progress: Notify,
    /// Mailbox of the transmit-ready worker, present in hardware queue mode.
    pub work: Option<mpsc::Sender<()>>,
}

impl Shared {
    /// Enters the critical section. Never held across an await.
    pub fn critical(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the reference of one file, tearing the hardware down after
    /// the last one once everything queued has left.
    pub async fn release(&self, reader: Option<ReaderKey>) {
        let _close = self.close_lock.lock().await;

        let (removed, last) = {
            let mut inner = self.critical();
            let removed = reader.and_then(|key| inner.readers.remove(key));
            if let Some(reader) = &removed {
                reader.sem.close();
                if let Some(waiter) = &reader.waiter {
                    waiter.notify(PollEvents::HUP);
                }
            }

            inner.crefs = inner.crefs.saturating_sub(1);
            log::debug!("{}: close, {} references left", self.config.name, inner.crefs);
            if inner.crefs == 0 {
                inner.lower.rxint(false);
            }
            (removed, inner.crefs == 0)
        };
        drop(removed);

        if last {
            self.drain().await;
            self.critical().lower.shutdown();
            log::debug!("{}: shut down", self.config.name);
        }
    }

    /// Waits until neither the sender nor the controller holds anything.
    async fn drain(&self) {
        loop {
            let progress = self.tx_progress.notified();
            {
                let inner = self.critical();
                if inner.sender.is_empty() && inner.lower.txempty() {
                    return;
                }
            }
            let _ = time::timeout(self.config.drain_poll_interval(), progress).await;
        }
    }
}

/// Access flags of a new file, in the spirit of `O_RDOK`, `O_WROK` and
/// `O_NONBLOCK`.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub(crate) read: bool,
    pub(crate) write: bool,
    pub(crate) nonblocking: bool,
}

impl OpenOptions {
    pub fn new() -> OpenOptions {
        OpenOptions::default()
    }

    pub fn read(mut self, read: bool) -> OpenOptions {
        self.read = read;
        self
    }

    pub fn write(mut self, write: bool) -> OpenOptions {
        self.write = write;
        self
    }

    pub fn nonblocking(mut self, nonblocking: bool) -> OpenOptions {
        self.nonblocking = nonblocking;
        self
    }
}

/// A registered CAN character device.
#[derive(Clone)]
pub struct CanDevice {
    shared: Arc<Shared>,
}

impl CanDevice {
    /// Resets the controller and makes the device ready for opens.
    ///
    /// Hardware queue mode needs a tokio runtime for its deferred worker.
    pub fn register<L>(mut lower: L, config: DeviceConfig) -> Result<CanDevice>
    where
        L: LowerHalf + 'static,
    {
        config.validate()?;

        let runtime = match config.tx_mode {
            TxMode::Direct => None,
            TxMode::HardwareQueue => Some(Handle::try_current().map_err(|_| Error::NoRuntime)?),
        };

        lower.reset();

        let (work, mailbox) = match runtime {
            Some(_) => {
                let (work, mailbox) = mpsc::channel(1);
                (Some(work), Some(mailbox))
            }
            None => (None, None),
        };

        let inner = Inner {
            lower: Box::new(lower),
            sender: TxQueue::new(config.tx_fifo_size),
            readers: DenseSlotMap::with_capacity_and_key(MAX_OPENS),
            rtr: RtrTable::new(config.npending_rtr),
            crefs: 0,
            ntxwaiters: 0,
        };

        let shared = Arc::new(Shared {
            config,
            inner: Mutex::new(inner),
            close_lock: AsyncMutex::new(()),
            poll_lock: AsyncMutex::new(()),
            tx_space: Semaphore::new(0),
            tx_progress: Notify::new(),
            work,
        });

        if let (Some(runtime), Some(mailbox)) = (runtime, mailbox) {
            runtime.spawn(txready::worker(Arc::downgrade(&shared), mailbox));
        }

        log::info!(
            "Registered CAN device {} ({:?}, {} tx / {} rx slots)",
            shared.config.name,
            shared.config.tx_mode,
            shared.config.tx_fifo_size,
            shared.config.rx_fifo_size
        );

        Ok(CanDevice { shared })
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    /// The handle the interrupt side of the driver calls into.
    pub fn upper(&self) -> UpperHalf {
        UpperHalf {
            shared: self.shared.clone(),
        }
    }

    /// Opens a new file. The first open brings the hardware up.
    pub async fn open(&self, options: &OpenOptions) -> Result<CanFile> {
        let shared = &self.shared;
        let _close = shared.close_lock.lock().await;

        let reader = if options.read {
            Some(Reader::new(shared.config.rx_fifo_size))
        } else {
            None
        };
        let sem = reader.as_ref().map(|reader| reader.sem.clone());

        let key = {
            let mut inner = shared.critical();
            if inner.crefs >= MAX_OPENS {
                return Err(Error::TooManyOpenFiles);
            }

            if inner.crefs == 0 {
                inner.lower.setup()?;
                inner.sender.reset();
                inner.lower.rxint(true);
            }
            inner.crefs += 1;
            log::debug!("{}: open, {} references", shared.config.name, inner.crefs);

            reader.map(|reader| inner.readers.insert(reader))
        };

        Ok(CanFile::new(
            shared.clone(),
            key.zip(sem),
            options.write,
            options.nonblocking,
        ))
    }
}

/// Callbacks for the interrupt side of a lower half.
#[derive(Clone)]
pub struct UpperHalf {
    shared: Arc<Shared>,
}

impl UpperHalf {
    /// A frame arrived. Fails with `NoMemory` when no reader had room.
    pub fn receive(&self, hdr: &CanHeader, data: &[u8]) -> Result<()> {
        let mut inner = self.shared.critical();
        self.shared.receive(&mut inner, hdr, data)
    }

    /// The oldest message handed to the controller has left.
    pub fn txdone(&self) -> Result<()> {
        let mut inner = self.shared.critical();
        self.shared.txdone(&mut inner)
    }

    /// The controller's transmit queue has room again.
    pub fn txready(&self) -> Result<()> {
        let mut inner = self.shared.critical();
        self.shared.txready(&mut inner)
    }
}
