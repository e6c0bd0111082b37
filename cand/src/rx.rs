use tokio::sync::{Semaphore, TryAcquireError};

use can_proto::error_frame::ERROR5_RXOVERFLOW;
use can_proto::{CanHeader, CanMsg, MIN_MSG_LEN};

use crate::device::{Inner, ReaderKey, Shared};
use crate::poll::PollEvents;
use crate::{Error, Result};

impl Shared {
    /// Fans an arrived frame out to every reader. A reader without room
    /// loses the frame and gets an overflow error frame instead.
    pub(crate) fn receive(&self, inner: &mut Inner, hdr: &CanHeader, data: &[u8]) -> Result<()> {
        // RTR answers are delivered to the readers as well.
        inner.rtr.complete(hdr, data);

        let mut ret = Err(Error::NoMemory);
        for reader in inner.readers.values_mut() {
            if reader.fifo.push(hdr, data) {
                if reader.sem.available_permits() == 0 {
                    reader.sem.add_permits(1);
                }
                ret = Ok(());
            } else if self.config.errors {
                reader.fifo.set_error(ERROR5_RXOVERFLOW);
            } else {
                continue;
            }

            if let Some(waiter) = &reader.waiter {
                waiter.notify(PollEvents::IN);
            }
        }
        ret
    }

    pub(crate) async fn read(
        &self,
        key: ReaderKey,
        sem: &Semaphore,
        buf: &mut [u8],
        nonblocking: bool,
    ) -> Result<usize> {
        if buf.len() < MIN_MSG_LEN {
            return Ok(0);
        }

        if self.config.errors {
            let mut inner = self.critical();
            if let Some(reader) = inner.readers.get_mut(key) {
                if reader.fifo.error() != 0 {
                    let msg = CanMsg::internal_error(reader.fifo.error());
                    let msglen = msg.wire_len();
                    if buf.len() < msglen {
                        return Ok(0);
                    }

                    let mut dst = &mut buf[..msglen];
                    msg.encode(&mut dst);
                    reader.fifo.take_error();
                    return Ok(msglen);
                }
            }
        }

        let permit = if nonblocking {
            match sem.try_acquire() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => return Err(Error::WouldBlock),
                Err(TryAcquireError::Closed) => return Ok(0),
            }
        } else {
            match sem.acquire().await {
                Ok(permit) => permit,
                // The file was closed under us.
                Err(_) => return Ok(0),
            }
        };
        permit.forget();

        let mut inner = self.critical();
        let reader = match inner.readers.get_mut(key) {
            Some(reader) => reader,
            None => return Ok(0),
        };

        if reader.fifo.is_empty() {
            log::error!("{}: reader woken with an empty fifo", self.config.name);
            return Ok(0);
        }

        let nread = reader.fifo.drain_into(buf);
        if !reader.fifo.is_empty() && reader.sem.available_permits() == 0 {
            reader.sem.add_permits(1);
        }
        Ok(nread)
    }
}
