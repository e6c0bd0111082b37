use std::mem;

use can_proto::{CanHeader, CanMsg, MAX_STD_ID};
use tokio::sync::oneshot;
use tokio::time;

use crate::device::Shared;
use crate::ioctl::RtrRequest;
use crate::{Error, Result};

struct RtrWait {
    ticket: u64,
    id: u32,
    extended: bool,
    reply: oneshot::Sender<CanMsg>,
}

enum RtrSlot {
    Free,
    /// Reserved while the request is on its way to the hardware. Frames
    /// arriving now are not taken as the answer.
    Pending(RtrWait),
    /// The request went out, the next matching frame answers it.
    Armed(RtrWait),
}

/// Identifies one reservation, so a late cleanup never frees a slot that
/// has since been handed to another request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RtrTicket {
    slot: usize,
    ticket: u64,
}

/// Fixed table of outstanding remote transmission requests.
pub(crate) struct RtrTable {
    slots: Vec<RtrSlot>,
    pending: usize,
    next_ticket: u64,
}

impl RtrTable {
    pub fn new(size: usize) -> RtrTable {
        RtrTable {
            slots: (0..size).map(|_| RtrSlot::Free).collect(),
            pending: 0,
            next_ticket: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn reserve(
        &mut self,
        id: u32,
        extended: bool,
        reply: oneshot::Sender<CanMsg>,
    ) -> Option<RtrTicket> {
        let slot = self
            .slots
            .iter()
            .position(|slot| matches!(slot, RtrSlot::Free))?;

        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.slots[slot] = RtrSlot::Pending(RtrWait {
            ticket,
            id,
            extended,
            reply,
        });
        self.pending += 1;

        Some(RtrTicket { slot, ticket })
    }

    pub fn arm(&mut self, ticket: &RtrTicket) {
        let slot = &mut self.slots[ticket.slot];
        *slot = match mem::replace(slot, RtrSlot::Free) {
            RtrSlot::Pending(wait) if wait.ticket == ticket.ticket => RtrSlot::Armed(wait),
            other => other,
        };
    }

    /// Frees the slot if it still belongs to `ticket`.
    pub fn release(&mut self, ticket: &RtrTicket) -> bool {
        let slot = &mut self.slots[ticket.slot];
        let ours = match slot {
            RtrSlot::Pending(wait) | RtrSlot::Armed(wait) => wait.ticket == ticket.ticket,
            RtrSlot::Free => false,
        };
        if ours {
            *slot = RtrSlot::Free;
            self.pending -= 1;
        }
        ours
    }

    /// Answers every armed request matching the frame. Returns how many.
    /// Error and remote frames never answer a request.
    pub fn complete(&mut self, hdr: &CanHeader, data: &[u8]) -> usize {
        if self.pending == 0 || hdr.error || hdr.rtr {
            return 0;
        }

        let mut answered = 0;
        for slot in self.slots.iter_mut() {
            let matches = match slot {
                RtrSlot::Armed(wait) => wait.id == hdr.id && wait.extended == hdr.extended,
                _ => false,
            };
            if !matches {
                continue;
            }

            if let RtrSlot::Armed(wait) = mem::replace(slot, RtrSlot::Free) {
                // The requester may already have given up.
                let _ = wait.reply.send(CanMsg::from_parts(hdr, data));
            }
            self.pending -= 1;
            answered += 1;
        }
        answered
    }
}

/// Gives the slot back unless the answer already did.
struct SlotGuard<'a> {
    shared: &'a Shared,
    ticket: RtrTicket,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.shared.critical().rtr.release(&self.ticket);
    }
}

impl Shared {
    /// Sends a remote transmission request and waits for the answering
    /// frame, which replaces `request.msg`.
    pub(crate) async fn rtr_read(&self, request: &mut RtrRequest, nonblocking: bool) -> Result<()> {
        let hdr = request.msg.header;
        let (reply, answer) = oneshot::channel();

        let ticket = self
            .critical()
            .rtr
            .reserve(hdr.id, hdr.extended, reply)
            .ok_or(Error::NoMemory)?;
        let slot = SlotGuard {
            shared: self,
            ticket,
        };

        // Use the driver's own primitive when it has one.
        let direct = {
            let mut inner = self.critical();
            if inner.lower.supports_remote_request() {
                Some(if hdr.id <= MAX_STD_ID && !hdr.extended {
                    inner.lower.remote_request(hdr.id as u16).map(|()| {
                        inner.rtr.arm(&slot.ticket);
                    })
                } else {
                    Err(Error::InvalidArgument)
                })
            } else {
                None
            }
        };

        match direct {
            Some(sent) => sent?,
            None if self.config.use_rtr => {
                let mut msg = request.msg;
                msg.header.rtr = true;

                let mut buf = Vec::with_capacity(msg.wire_len());
                msg.encode(&mut buf);
                self.write(&buf, nonblocking, Some(&slot.ticket)).await?;
            }
            None => {
                log::error!("{}: driver has no remote request support", self.config.name);
                return Err(Error::NotSupported);
            }
        }

        let result = match time::timeout(request.timeout, answer).await {
            Ok(Ok(msg)) => {
                request.msg = msg;
                Ok(())
            }
            Ok(Err(_)) => Err(Error::Interrupted),
            Err(_) => Err(Error::TimedOut),
        };
        drop(slot);
        result
    }
}
