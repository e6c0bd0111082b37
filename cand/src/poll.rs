use std::fmt;

use bitflags::bitflags;
use futures::channel::mpsc;

bitflags! {
    /// Readiness bits, numbered like `POLLIN` and friends.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollEvents: u8 {
        const IN = 0x01;
        const OUT = 0x04;
        const ERR = 0x08;
        const HUP = 0x10;
    }
}

/// A registered interest in readiness changes of one file.
pub struct PollWaiter {
    interest: PollEvents,
    sink: mpsc::UnboundedSender<PollEvents>,
}

impl PollWaiter {
    pub fn new(interest: PollEvents) -> (PollWaiter, mpsc::UnboundedReceiver<PollEvents>) {
        let (sink, events) = mpsc::unbounded();
        (PollWaiter { interest, sink }, events)
    }

    /// Error and hangup are always reported, whatever the interest.
    pub(crate) fn notify(&self, events: PollEvents) {
        let ready =
            (self.interest & events) | (events & (PollEvents::ERR | PollEvents::HUP));
        if !ready.is_empty() {
            // The poller may be gone, which is fine.
            let _ = self.sink.unbounded_send(ready);
        }
    }
}

impl fmt::Debug for PollWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollWaiter")
            .field("interest", &self.interest)
            .finish()
    }
}
