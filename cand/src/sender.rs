use can_proto::CanMsg;

/// Software transmit queue shared by every writer of one device.
///
/// The three cursors are free-running counters, a slot being the cursor
/// modulo the capacity:
///
/// * `tail`:  advanced by `push` each time a writer queues a message
/// * `head`:  advanced by `send_done` each time the hardware confirms one
/// * `queue`: advanced by `take_next` each time one is handed to the hardware
///
/// Logically `head <= queue <= tail`. `head == queue == tail` is empty,
/// `head < queue == tail` means everything was handed over and completions
/// are still outstanding.
pub(crate) struct TxQueue {
    buffer: Box<[CanMsg]>,
    head: usize,
    queue: usize,
    tail: usize,
}

impl TxQueue {
    pub fn new(capacity: usize) -> TxQueue {
        TxQueue {
            buffer: vec![CanMsg::default(); capacity].into_boxed_slice(),
            head: 0,
            queue: 0,
            tail: 0,
        }
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.queue = 0;
        self.tail = 0;
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.pending_count() == self.capacity()
    }

    /// Whether some queued message has not been handed to the hardware yet.
    pub fn has_pending(&self) -> bool {
        self.queue != self.tail
    }

    /// Messages queued and not yet confirmed.
    pub fn pending_count(&self) -> usize {
        self.tail.wrapping_sub(self.head)
    }

    /// Messages handed to the hardware and not yet confirmed.
    pub fn sending_count(&self) -> usize {
        self.queue.wrapping_sub(self.head)
    }

    pub fn free_count(&self) -> usize {
        self.capacity() - self.pending_count()
    }

    /// Caller checks `is_full` first.
    pub fn push(&mut self, msg: CanMsg) {
        debug_assert!(!self.is_full());
        let slot = self.slot(self.tail);
        self.buffer[slot] = msg;
        self.tail = self.tail.wrapping_add(1);
    }

    /// Borrows the next message for the hardware.
    pub fn take_next(&mut self) -> Option<CanMsg> {
        if !self.has_pending() {
            return None;
        }
        let msg = self.buffer[self.slot(self.queue)];
        self.queue = self.queue.wrapping_add(1);
        Some(msg)
    }

    /// Gives back the message most recently borrowed by `take_next`, so the
    /// next kick retries it.
    pub fn revert(&mut self) {
        debug_assert!(self.sending_count() > 0);
        self.queue = self.queue.wrapping_sub(1);
    }

    /// Frees the oldest in-flight slot. Returns false when nothing is in
    /// flight.
    pub fn send_done(&mut self) -> bool {
        if self.sending_count() == 0 {
            return false;
        }
        self.head = self.head.wrapping_add(1);
        true
    }

    /// `head <= queue <= tail`, all within one capacity.
    pub fn is_consistent(&self) -> bool {
        self.sending_count() <= self.pending_count() && self.pending_count() <= self.capacity()
    }

    fn slot(&self, cursor: usize) -> usize {
        cursor % self.capacity()
    }
}
