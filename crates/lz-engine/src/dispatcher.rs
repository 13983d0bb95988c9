//! Event fan-out
//!
//! Every decoded event goes to the confirmation gate first (when it carries
//! a confirmation), then to registered listeners, then to broadcast
//! subscribers. Callbacks run on the device's reader task.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use lz_protocol::Confirms;
use tokio::sync::broadcast;
use tracing::error;

use crate::gate::ConfirmationGate;

/// Receives a device's events as they are decoded
pub trait DeviceListener<E>: Send + Sync {
    fn on_event(&self, event: &E);
}

impl<E, F> DeviceListener<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        self(event)
    }
}

/// Handle for removing a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerList<E> = Vec<(ListenerId, Arc<dyn DeviceListener<E>>)>;

/// Routes decoded events to the gate, listeners and subscribers
pub struct EventDispatcher<E> {
    gate: Arc<ConfirmationGate>,
    listeners: RwLock<ListenerList<E>>,
    next_id: AtomicU64,
    events: broadcast::Sender<E>,
}

impl<E> EventDispatcher<E>
where
    E: Confirms + Clone + Send + 'static,
{
    pub fn new(gate: Arc<ConfirmationGate>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            gate,
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            events,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn DeviceListener<E>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Returns false if the listener was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// A receiver for every event dispatched from now on
    ///
    /// Slow receivers lag and lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.events.subscribe()
    }

    /// Deliver events in order
    pub fn dispatch(&self, events: Vec<E>) {
        if events.is_empty() {
            return;
        }
        // Snapshot so listeners may add or remove listeners from a callback
        let listeners: ListenerList<E> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for event in events {
            if let Some(confirmation) = event.confirmation() {
                self.gate.update(confirmation);
            }
            for (id, listener) in &listeners {
                let delivered =
                    panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(&event)));
                if delivered.is_err() {
                    error!("Listener {:?} panicked while handling an event", id);
                }
            }
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }
}
