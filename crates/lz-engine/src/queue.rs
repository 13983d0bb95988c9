//! Bounded outbound command queue
//!
//! Producers never block. When the queue is full the newest transaction is
//! rejected and the caller is told so.

use std::sync::Arc;

use lz_protocol::Transaction;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

/// Producer side of a device's command queue
#[derive(Debug, Clone)]
pub struct CommandQueue {
    device: Arc<str>,
    tx: mpsc::Sender<Transaction>,
    capacity: usize,
}

impl CommandQueue {
    /// Create a queue and the receiver the writer drains
    ///
    /// A capacity of zero is raised to one.
    pub fn new(device: impl Into<Arc<str>>, capacity: usize) -> (Self, mpsc::Receiver<Transaction>) {
        let device = device.into();
        if capacity == 0 {
            warn!("Queue capacity 0 for {} raised to 1", device);
        }
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                device,
                tx,
                capacity,
            },
            rx,
        )
    }

    /// Append a transaction without waiting
    ///
    /// Returns false when the queue is full or the writer has stopped.
    pub fn enqueue(&self, transaction: Transaction) -> bool {
        match self.tx.try_send(transaction) {
            Ok(()) => true,
            Err(TrySendError::Full(rejected)) => {
                warn!(
                    "Max queue size ({}) reached for {}, dropping {:02X?}",
                    self.capacity,
                    self.device,
                    rejected.payload()
                );
                false
            }
            Err(TrySendError::Closed(rejected)) => {
                warn!(
                    "Writer for {} has stopped, dropping {:02X?}",
                    self.device,
                    rejected.payload()
                );
                false
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }

    /// Transactions waiting for the writer
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the writer has dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(byte: u8) -> Transaction {
        Transaction::new(vec![byte])
    }

    #[test]
    fn test_full_queue_rejects_newest() {
        let (queue, mut rx) = CommandQueue::new("test", 2);
        assert!(queue.enqueue(tx(1)));
        assert!(queue.enqueue(tx(2)));
        assert!(queue.is_full());
        assert!(!queue.enqueue(tx(3)));
        assert_eq!(queue.len(), 2);

        assert_eq!(rx.try_recv().unwrap().payload(), &[1]);
        assert_eq!(rx.try_recv().unwrap().payload(), &[2]);
        assert!(rx.try_recv().is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_single_slot_queue() {
        let (queue, mut rx) = CommandQueue::new("tuner", 1);
        assert!(queue.enqueue(tx(1)));
        assert!(!queue.enqueue(tx(2)));
        rx.try_recv().unwrap();
        assert!(queue.enqueue(tx(3)));
    }

    #[test]
    fn test_zero_capacity_raised() {
        let (queue, _rx) = CommandQueue::new("test", 0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.enqueue(tx(1)));
    }

    #[test]
    fn test_closed_queue_rejects() {
        let (queue, rx) = CommandQueue::new("test", 4);
        drop(rx);
        assert!(queue.is_closed());
        assert!(!queue.enqueue(tx(1)));
    }
}
