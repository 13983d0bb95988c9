//! Confirmation rendezvous between the reader and the writer
//!
//! The writer arms the gate before it writes a transaction that expects a
//! confirmation, then waits on the returned [`PendingConfirmation`]. The
//! reader reports every decoded confirmation through
//! [`ConfirmationGate::update`]. Arming before the write means a device
//! that answers faster than the writer can start waiting is never missed.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lz_protocol::Confirmation;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What the gate currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Empty,
    Positive,
    Negative,
}

/// Result of waiting for a confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Positive,
    Negative,
    TimedOut,
}

#[derive(Debug, Default)]
struct Slot {
    state: GateState,
    armed: bool,
}

/// Single-slot confirmation holder shared by one device's reader and writer
#[derive(Debug, Default)]
pub struct ConfirmationGate {
    slot: Mutex<Slot>,
    notify: Notify,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the slot and start accepting one confirmation
    pub fn arm(&self) -> PendingConfirmation<'_> {
        let mut slot = self.lock();
        if slot.state != GateState::Empty {
            debug!("Clearing stale confirmation {:?}", slot.state);
        }
        slot.state = GateState::Empty;
        slot.armed = true;
        PendingConfirmation { gate: self }
    }

    /// Record a confirmation from the device
    ///
    /// Returns false and drops the confirmation when no transaction is
    /// waiting for one.
    pub fn update(&self, confirmation: Confirmation) -> bool {
        {
            let mut slot = self.lock();
            if !slot.armed {
                warn!(
                    "{:?} confirmation arrived while no command was waiting for one",
                    confirmation
                );
                return false;
            }
            slot.armed = false;
            slot.state = match confirmation {
                Confirmation::Positive => GateState::Positive,
                Confirmation::Negative => GateState::Negative,
            };
        }
        self.notify.notify_one();
        true
    }

    pub fn state(&self) -> GateState {
        self.lock().state
    }

    /// True while a transaction is waiting for its confirmation
    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    fn take(&self) -> GateState {
        let mut slot = self.lock();
        slot.armed = false;
        std::mem::take(&mut slot.state)
    }
}

/// An armed gate, waiting for one confirmation
///
/// Dropping it without waiting disarms the gate.
#[derive(Debug)]
pub struct PendingConfirmation<'a> {
    gate: &'a ConfirmationGate,
}

impl PendingConfirmation<'_> {
    /// Wait until a confirmation arrives or `timeout` elapses
    ///
    /// The gate is empty again when this returns.
    pub async fn wait(self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.gate.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.gate.is_armed() {
                break;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        match self.gate.take() {
            GateState::Positive => WaitOutcome::Positive,
            GateState::Negative => WaitOutcome::Negative,
            GateState::Empty => WaitOutcome::TimedOut,
        }
    }
}

impl Drop for PendingConfirmation<'_> {
    fn drop(&mut self) {
        self.gate.take();
    }
}
