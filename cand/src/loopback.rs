//! Software controller that puts every transmitted frame straight back on
//! its own bus. Serves the daemon when no hardware is around and drives the
//! upper half in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tokio::sync::Notify;

use can_proto::{CanIoctl, CanMsg};

use crate::config::TxMode;
use crate::device::UpperHalf;
use crate::lower::{LowerHalf, Transceiver};
use crate::{Error, Result};

#[derive(Deserialize, Debug, Clone)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoopbackOptions {
    /// Deliver every transmitted frame to the readers.
    pub echo: bool,
    /// Frames the controller holds before it stops accepting more.
    pub hw_queue_depth: usize,
    /// Offer a remote request primitive for standard identifiers.
    pub remote_request: bool,
    /// Initial transceiver state. No transceiver when unset.
    pub transceiver: Option<u32>,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        LoopbackOptions {
            echo: true,
            hw_queue_depth: 1,
            remote_request: false,
            transceiver: None,
        }
    }
}

#[derive(Default)]
struct Controller {
    enabled: bool,
    rxint: bool,
    txint: bool,
    in_flight: VecDeque<CanMsg>,
    sent: Vec<CanMsg>,
    remote_requests: Vec<u16>,
    ioctls: Vec<(u32, usize)>,
    resets: usize,
    setups: usize,
    shutdowns: usize,
    reject: usize,
    fail_setup: Option<Error>,
}

fn lock(controller: &Mutex<Controller>) -> MutexGuard<'_, Controller> {
    controller.lock().unwrap_or_else(PoisonError::into_inner)
}

struct LoopbackTransceiver {
    state: Arc<AtomicU32>,
}

impl Transceiver for LoopbackTransceiver {
    fn set_state(&mut self, state: u32) -> Result<()> {
        self.state.store(state, Ordering::Relaxed);
        Ok(())
    }

    fn state(&self) -> Result<u32> {
        Ok(self.state.load(Ordering::Relaxed))
    }
}

/// The lower half handed to `CanDevice::register`.
pub struct Loopback {
    controller: Arc<Mutex<Controller>>,
    irq: Arc<Notify>,
    depth: usize,
    remote: bool,
    transceiver: Option<LoopbackTransceiver>,
}

/// The interrupt side of a [`Loopback`].
#[derive(Clone)]
pub struct LoopbackBus {
    controller: Arc<Mutex<Controller>>,
    irq: Arc<Notify>,
    mode: TxMode,
    echo: bool,
    transceiver: Option<Arc<AtomicU32>>,
}

impl Loopback {
    pub fn new(options: &LoopbackOptions, mode: TxMode) -> (Loopback, LoopbackBus) {
        let controller = Arc::new(Mutex::new(Controller::default()));
        let irq = Arc::new(Notify::new());
        let state = options.transceiver.map(|state| Arc::new(AtomicU32::new(state)));

        let lower = Loopback {
            controller: controller.clone(),
            irq: irq.clone(),
            depth: options.hw_queue_depth.max(1),
            remote: options.remote_request,
            transceiver: state.clone().map(|state| LoopbackTransceiver { state }),
        };
        let bus = LoopbackBus {
            controller,
            irq,
            mode,
            echo: options.echo,
            transceiver: state,
        };
        (lower, bus)
    }
}

impl LowerHalf for Loopback {
    fn reset(&mut self) {
        let mut controller = lock(&self.controller);
        controller.resets += 1;
        controller.enabled = false;
        controller.in_flight.clear();
    }

    fn setup(&mut self) -> Result<()> {
        let mut controller = lock(&self.controller);
        if let Some(err) = controller.fail_setup.take() {
            return Err(err);
        }
        controller.setups += 1;
        controller.enabled = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut controller = lock(&self.controller);
        controller.shutdowns += 1;
        controller.enabled = false;
        controller.rxint = false;
        controller.txint = false;
        controller.in_flight.clear();
    }

    fn rxint(&mut self, enable: bool) {
        lock(&self.controller).rxint = enable;
    }

    fn txint(&mut self, enable: bool) {
        lock(&self.controller).txint = enable;
    }

    fn send(&mut self, msg: &CanMsg) -> Result<()> {
        let mut controller = lock(&self.controller);
        if !controller.enabled {
            return Err(Error::Io);
        }
        if controller.reject > 0 {
            controller.reject -= 1;
            return Err(Error::Busy);
        }
        if controller.in_flight.len() >= self.depth {
            return Err(Error::Busy);
        }

        controller.in_flight.push_back(*msg);
        controller.sent.push(*msg);
        self.irq.notify_one();
        Ok(())
    }

    fn txready(&self) -> bool {
        let controller = lock(&self.controller);
        controller.enabled && controller.in_flight.len() < self.depth
    }

    fn txempty(&self) -> bool {
        lock(&self.controller).in_flight.is_empty()
    }

    fn supports_remote_request(&self) -> bool {
        self.remote
    }

    fn remote_request(&mut self, id: u16) -> Result<()> {
        if !self.remote {
            return Err(Error::NotSupported);
        }
        lock(&self.controller).remote_requests.push(id);
        Ok(())
    }

    fn transceiver(&mut self) -> Option<&mut dyn Transceiver> {
        self.transceiver
            .as_mut()
            .map(|transceiver| transceiver as &mut dyn Transceiver)
    }

    fn ioctl(&mut self, cmd: u32, arg: usize) -> Result<i32> {
        let mut controller = lock(&self.controller);
        controller.ioctls.push((cmd, arg));

        match CanIoctl::from_code(cmd) {
            Some(CanIoctl::OFlush) | Some(CanIoctl::IoFlush) => {
                controller.in_flight.clear();
                Ok(0)
            }
            Some(CanIoctl::IFlush) | Some(CanIoctl::BusOffRecovery) => Ok(0),
            _ => Err(Error::NotTty),
        }
    }
}

impl LoopbackBus {
    /// Finishes the oldest frame the controller holds. Returns false when
    /// it holds none.
    pub fn complete(&self, upper: &UpperHalf) -> bool {
        let (msg, rxint) = {
            let mut controller = lock(&self.controller);
            match controller.in_flight.pop_front() {
                Some(msg) => (msg, controller.rxint),
                None => return false,
            }
        };

        let done = match self.mode {
            TxMode::Direct => upper.txdone(),
            TxMode::HardwareQueue => upper.txready(),
        };
        if let Err(err) = done {
            log::trace!("Loopback completion of {:#x}: {}", msg.header.id, err);
        }

        if self.echo && rxint {
            if let Err(err) = upper.receive(&msg.header, msg.payload()) {
                log::trace!("Loopback echo of {:#x} dropped: {}", msg.header.id, err);
            }
        }
        true
    }

    /// Completes frames until the controller is idle. Returns how many.
    pub fn complete_all(&self, upper: &UpperHalf) -> usize {
        let mut count = 0;
        while self.complete(upper) {
            count += 1;
        }
        count
    }

    /// Simulates a frame sent by another node.
    pub fn inject(&self, upper: &UpperHalf, msg: &CanMsg) -> Result<()> {
        if !lock(&self.controller).rxint {
            return Err(Error::Io);
        }
        upper.receive(&msg.header, msg.payload())
    }

    /// Interrupt pump: completes frames as soon as they are sent.
    pub async fn run(self, upper: UpperHalf) {
        loop {
            self.irq.notified().await;
            self.complete_all(&upper);
        }
    }

    pub fn sent(&self) -> Vec<CanMsg> {
        lock(&self.controller).sent.clone()
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.controller).in_flight.len()
    }

    pub fn remote_requests(&self) -> Vec<u16> {
        lock(&self.controller).remote_requests.clone()
    }

    pub fn ioctls(&self) -> Vec<(u32, usize)> {
        lock(&self.controller).ioctls.clone()
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.controller).enabled
    }

    pub fn rxint_enabled(&self) -> bool {
        lock(&self.controller).rxint
    }

    pub fn txint_enabled(&self) -> bool {
        lock(&self.controller).txint
    }

    pub fn resets(&self) -> usize {
        lock(&self.controller).resets
    }

    pub fn setups(&self) -> usize {
        lock(&self.controller).setups
    }

    pub fn shutdowns(&self) -> usize {
        lock(&self.controller).shutdowns
    }

    /// Makes the next `count` sends fail as if the controller were busy.
    pub fn reject_next(&self, count: usize) {
        lock(&self.controller).reject = count;
    }

    pub fn fail_next_setup(&self, err: Error) {
        lock(&self.controller).fail_setup = Some(err);
    }

    pub fn transceiver_state(&self) -> Option<u32> {
        self.transceiver
            .as_ref()
            .map(|state| state.load(Ordering::Relaxed))
    }
}
