use std::mem;

use can_proto::{CanHeader, CanMsg};

/// Receive ring of one reader. One slot always stays free so that
/// `head == tail` unambiguously means empty.
pub(crate) struct RxFifo {
    buffer: Box<[CanMsg]>,
    head: usize,
    tail: usize,
    /// Sticky `ERROR5_*` bits, surfaced as an error frame on the next read.
    error: u8,
}

impl RxFifo {
    pub fn new(size: usize) -> RxFifo {
        RxFifo {
            buffer: vec![CanMsg::default(); size].into_boxed_slice(),
            head: 0,
            tail: 0,
            error: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn len(&self) -> usize {
        (self.tail + self.buffer.len() - self.head) % self.buffer.len()
    }

    /// Appends a frame, or refuses it whole when the ring is full.
    pub fn push(&mut self, hdr: &CanHeader, data: &[u8]) -> bool {
        let nexttail = self.advance(self.tail);
        if nexttail == self.head {
            return false;
        }

        self.buffer[self.tail] = CanMsg::from_parts(hdr, data);
        self.tail = nexttail;
        true
    }

    /// Copies as many whole records as fit into `buf`, oldest first.
    pub fn drain_into(&mut self, buf: &mut [u8]) -> usize {
        let mut nread = 0;
        while !self.is_empty() {
            let msg = &self.buffer[self.head];
            let msglen = msg.wire_len();
            if nread + msglen > buf.len() {
                break;
            }

            let mut dst = &mut buf[nread..nread + msglen];
            msg.encode(&mut dst);
            nread += msglen;
            self.head = self.advance(self.head);
        }
        nread
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    pub fn error(&self) -> u8 {
        self.error
    }

    pub fn set_error(&mut self, bits: u8) {
        self.error |= bits;
    }

    pub fn take_error(&mut self) -> u8 {
        mem::take(&mut self.error)
    }

    fn advance(&self, index: usize) -> usize {
        (index + 1) % self.buffer.len()
    }
}
