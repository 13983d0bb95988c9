//! Outbound transaction delivery
//!
//! The writer owns the write half of the link. It takes one transaction at
//! a time from the queue and makes up to `retry_count + 1` attempts, each
//! one a write, an optional wait for the device's confirmation and the
//! post-write pause. Only one transaction is ever in flight.

use std::sync::Arc;

use lz_protocol::Transaction;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::gate::{ConfirmationGate, WaitOutcome};

/// Resolves once shutdown has been requested or the engine is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Drains a device's command queue onto its link
pub struct Writer<W> {
    device: Arc<str>,
    io: W,
    queue: mpsc::Receiver<Transaction>,
    gate: Arc<ConfirmationGate>,
}

impl<W> Writer<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        device: impl Into<Arc<str>>,
        io: W,
        queue: mpsc::Receiver<Transaction>,
        gate: Arc<ConfirmationGate>,
    ) -> Self {
        Self {
            device: device.into(),
            io,
            queue,
            gate,
        }
    }

    /// Run until shutdown is requested or every queue producer is gone
    ///
    /// Shutdown interrupts a transaction mid-wait. The remaining queue is
    /// abandoned.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Writer for {} started", self.device);

        loop {
            let transaction = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                next = self.queue.recv() => match next {
                    Some(transaction) => transaction,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = self.deliver(&transaction) => {}
            }
        }

        info!("Writer for {} terminated", self.device);
    }

    /// Make every allowed attempt at one transaction
    ///
    /// Returns true once an attempt succeeds.
    pub async fn deliver(&mut self, transaction: &Transaction) -> bool {
        let gate = Arc::clone(&self.gate);
        let attempts = transaction.attempts();

        for attempt in 1..=attempts {
            debug!(
                "Com-> {} (attempt {}/{}): {:02X?}",
                self.device,
                attempt,
                attempts,
                transaction.payload()
            );

            let pending = transaction.expect_confirmation().then(|| gate.arm());
            let written = match self.write(transaction.payload()).await {
                Ok(()) => true,
                Err(e) => {
                    error!("Write to {} failed: {}", self.device, e);
                    false
                }
            };

            let sent = match pending {
                Some(pending) if written => match pending.wait(transaction.timeout()).await {
                    WaitOutcome::Positive => true,
                    WaitOutcome::Negative => {
                        warn!("{} rejected {:02X?}", self.device, transaction.payload());
                        false
                    }
                    WaitOutcome::TimedOut => {
                        error!(
                            "Timeout expired, no confirmation from {} after {:?}",
                            self.device,
                            transaction.timeout()
                        );
                        false
                    }
                },
                Some(_) => false,
                None => written,
            };

            if !transaction.post_write_delay().is_zero() {
                tokio::time::sleep(transaction.post_write_delay()).await;
            }

            if sent {
                return true;
            }
        }

        warn!(
            "Giving up on {:02X?} for {} after {} attempt(s)",
            transaction.payload(),
            self.device,
            attempts
        );
        false
    }

    async fn write(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.io.write_all(payload).await?;
        self.io.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lz_protocol::Confirmation;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn writer<W: AsyncWrite + Unpin + Send>(
        io: W,
    ) -> (Writer<W>, mpsc::Sender<Transaction>, Arc<ConfirmationGate>) {
        let (tx, rx) = mpsc::channel(4);
        let gate = Arc::new(ConfirmationGate::new());
        (Writer::new("test", io, rx, gate.clone()), tx, gate)
    }

    #[tokio::test]
    async fn test_fire_and_forget_single_write() {
        let (io, mut device) = tokio::io::duplex(64);
        let (mut writer, _tx, _gate) = writer(io);

        let sent = writer.deliver(&Transaction::new(b"IF;".to_vec())).await;
        assert!(sent);

        let mut buf = [0u8; 3];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"IF;");
    }

    #[tokio::test]
    async fn test_unconfirmed_transaction_is_retried() {
        let (io, mut device) = tokio::io::duplex(64);
        let (mut writer, _tx, _gate) = writer(io);
        let transaction = Transaction::new(vec![0x73, 0x02])
            .with_confirmation()
            .with_timeout(Duration::from_millis(10))
            .with_retries(2);

        assert!(!writer.deliver(&transaction).await);
        drop(writer);

        let mut written = Vec::new();
        device.read_to_end(&mut written).await.unwrap();
        assert_eq!(written, [0x73, 0x02].repeat(3));
    }

    #[tokio::test]
    async fn test_positive_confirmation_stops_retries() {
        let (io, mut device) = tokio::io::duplex(64);
        let (mut writer, _tx, gate) = writer(io);
        let transaction = Transaction::new(vec![0xAA])
            .with_confirmation()
            .with_timeout(Duration::from_secs(2))
            .with_retries(3);

        let confirmer = tokio::spawn(async move {
            let mut buf = [0u8; 1];
            device.read_exact(&mut buf).await.unwrap();
            gate.update(Confirmation::Positive);
            device
        });

        assert!(writer.deliver(&transaction).await);
        drop(writer);

        let mut device = confirmer.await.unwrap();
        let mut rest = Vec::new();
        device.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_negative_confirmation_triggers_retry() {
        let (io, mut device) = tokio::io::duplex(64);
        let (mut writer, _tx, gate) = writer(io);
        let transaction = Transaction::new(vec![0xBB])
            .with_confirmation()
            .with_timeout(Duration::from_secs(2))
            .with_retries(1);

        let confirmer = tokio::spawn(async move {
            let mut buf = [0u8; 1];
            device.read_exact(&mut buf).await.unwrap();
            gate.update(Confirmation::Negative);
            device.read_exact(&mut buf).await.unwrap();
            gate.update(Confirmation::Positive);
        });

        assert!(writer.deliver(&transaction).await);
        confirmer.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (io, _device) = tokio::io::duplex(64);
        let (writer, _tx, _gate) = writer(io);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(writer.run(shutdown_rx));
        shutdown_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("writer did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_when_queue_closes() {
        let (io, _device) = tokio::io::duplex(64);
        let (writer, tx, _gate) = writer(io);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(writer.run(shutdown_rx));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("writer did not stop")
            .unwrap();
    }
}
