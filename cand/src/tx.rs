use can_proto::{CanMsg, MIN_MSG_LEN};

use crate::config::TxMode;
use crate::device::{Inner, Shared};
use crate::poll::PollEvents;
use crate::rtr::RtrTicket;
use crate::{Error, Result};

enum Enqueue {
    Done,
    Full,
}

/// Counts a writer blocked on sender space for as long as it waits.
struct TxWaiter<'a>(&'a Shared);

impl Drop for TxWaiter<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.critical();
        inner.ntxwaiters = inner.ntxwaiters.saturating_sub(1);
    }
}

impl Shared {
    /// Feeds queued messages to the controller while it takes them.
    pub(crate) fn xmit(&self, inner: &mut Inner) -> Result<()> {
        if inner.sender.is_empty() {
            // A hardware queue still has to report its own drain.
            if self.config.tx_mode == TxMode::Direct || inner.lower.txempty() {
                inner.lower.txint(false);
            }
            return Err(Error::Io);
        }

        let mut ret = Err(Error::Busy);
        while inner.sender.has_pending() && inner.lower.txready() {
            let msg = match inner.sender.take_next() {
                Some(msg) => msg,
                None => break,
            };

            match inner.lower.send(&msg) {
                Ok(()) => {
                    log::trace!(
                        "{}: sent {:#x}, {} in flight",
                        self.config.name,
                        msg.header.id,
                        inner.sender.sending_count()
                    );
                    ret = Ok(());
                    if self.config.tx_mode == TxMode::HardwareQueue {
                        self.retire(inner);
                    }
                }
                Err(err) => {
                    log::error!("{}: send of {:#x} failed: {}", self.config.name, msg.header.id, err);
                    inner.sender.revert();
                    ret = Err(err);
                    break;
                }
            }
        }

        inner.lower.txint(true);
        ret
    }

    /// Frees the oldest in-flight slot and wakes whoever waits for space.
    fn retire(&self, inner: &mut Inner) {
        if !inner.sender.send_done() {
            log::warn!("{}: completion without a message in flight", self.config.name);
            return;
        }
        debug_assert!(inner.sender.is_consistent());

        inner.notify_all(PollEvents::OUT);
        if inner.ntxwaiters > 0 {
            self.tx_space.add_permits(1);
        }
        self.tx_progress.notify_waiters();
    }

    /// Fails with `NoEntry` when no message is in flight.
    pub(crate) fn txdone(&self, inner: &mut Inner) -> Result<()> {
        if inner.sender.sending_count() == 0 {
            return Err(Error::NoEntry);
        }

        self.retire(inner);
        let _ = self.xmit(inner);
        Ok(())
    }

    /// Queues every whole record of `buf`. A trailing partial record is
    /// ignored. `rtr` is armed once the request is queued.
    pub(crate) async fn write(
        &self,
        buf: &[u8],
        nonblocking: bool,
        rtr: Option<&RtrTicket>,
    ) -> Result<usize> {
        let mut nsent = 0;
        let mut inactive = self.critical().lower.txempty();

        loop {
            {
                let mut inner = self.critical();
                match enqueue(&mut inner, buf, &mut nsent)? {
                    Enqueue::Done => {
                        if let Some(ticket) = rtr {
                            inner.rtr.arm(ticket);
                        }
                        if inactive {
                            let _ = self.xmit(&mut inner);
                        }
                        return Ok(nsent);
                    }
                    Enqueue::Full if nonblocking => {
                        return if nsent == 0 {
                            Err(Error::WouldBlock)
                        } else {
                            Ok(nsent)
                        };
                    }
                    Enqueue::Full => {
                        // Nothing would ever complete otherwise.
                        if inactive {
                            let _ = self.xmit(&mut inner);
                        }
                        inner.ntxwaiters += 1;
                    }
                }
            }

            let waiter = TxWaiter(self);
            let permit = self.tx_space.acquire().await.map_err(|_| Error::Io)?;
            permit.forget();
            drop(waiter);

            inactive = self.critical().lower.txempty();
        }
    }
}

fn enqueue(inner: &mut Inner, buf: &[u8], nsent: &mut usize) -> Result<Enqueue> {
    while buf.len() - *nsent >= MIN_MSG_LEN {
        let msg = match CanMsg::decode(&buf[*nsent..]) {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(err) if *nsent == 0 => {
                log::warn!("Rejecting write: {}", err);
                return Err(err.into());
            }
            Err(_) => break,
        };

        if inner.sender.is_full() {
            return Ok(Enqueue::Full);
        }
        inner.sender.push(msg);
        *nsent += msg.wire_len();
    }
    Ok(Enqueue::Done)
}
