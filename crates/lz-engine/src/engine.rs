//! Per-device serial engine
//!
//! An [`Engine`] owns one half-duplex link. It splits the stream and spawns
//! two tasks:
//!
//! - the writer, draining the command queue with retry, timeout and
//!   confirmation semantics
//! - the reader, reassembling frames from the byte stream and dispatching
//!   the decoded events
//!
//! The two tasks share only the confirmation gate. Engines for different
//! devices share nothing.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lz_protocol::{FrameCodec, Transaction};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assembler::ReceiveAssembler;
use crate::config::EngineOptions;
use crate::dispatcher::{DeviceListener, EventDispatcher, ListenerId};
use crate::gate::ConfirmationGate;
use crate::queue::CommandQueue;
use crate::writer::{shutdown_requested, Writer};

/// Pause after a failed read before reading again
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// A running link to one device
pub struct Engine<E> {
    device: Arc<str>,
    queue: CommandQueue,
    dispatcher: Arc<EventDispatcher<E>>,
    connected: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl<E> Engine<E>
where
    E: lz_protocol::Confirms + Clone + std::fmt::Debug + Send + Sync + 'static,
{
    /// Start the reader and writer tasks on `io`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T, C>(device: &str, io: T, codec: C, options: &EngineOptions) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        C: FrameCodec<Event = E>,
    {
        let device: Arc<str> = Arc::from(device);
        let (read_half, write_half) = tokio::io::split(io);

        let gate = Arc::new(ConfirmationGate::new());
        let dispatcher = Arc::new(EventDispatcher::new(gate.clone(), options.event_capacity));
        let (queue, queue_rx) = CommandQueue::new(device.clone(), options.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connected = Arc::new(AtomicBool::new(true));

        let writer = Writer::new(device.clone(), write_half, queue_rx, gate);
        let writer = tokio::spawn(writer.run(shutdown_rx.clone()));

        let reader = Reader {
            device: device.clone(),
            io: read_half,
            buffer: vec![0u8; options.read_chunk_size.max(1)],
            assembler: ReceiveAssembler::with_garbage_limit(codec, options.garbage_limit),
            dispatcher: dispatcher.clone(),
        };
        let reader_connected = connected.clone();
        let reader = tokio::spawn(async move {
            reader.run(shutdown_rx).await;
            reader_connected.store(false, Ordering::SeqCst);
        });

        info!(
            "Engine for {} started (queue {}, garbage limit {})",
            device, options.queue_capacity, options.garbage_limit
        );

        Self {
            device,
            queue,
            dispatcher,
            connected,
            shutdown_tx,
            writer: Some(writer),
            reader: Some(reader),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Queue a transaction for the writer
    ///
    /// Returns false when the link is down or the queue is full.
    pub fn enqueue(&self, transaction: Transaction) -> bool {
        if !self.is_connected() {
            warn!(
                "{} is not connected, dropping {:02X?}",
                self.device,
                transaction.payload()
            );
            return false;
        }
        self.queue.enqueue(transaction)
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// False once the link has reached end of stream or the engine was shut down
    ///
    /// Read errors are logged and reading continues, so they leave the
    /// engine connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn add_listener(&self, listener: Arc<dyn DeviceListener<E>>) -> ListenerId {
        self.dispatcher.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.remove_listener(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.dispatcher.subscribe()
    }

    /// Stop both tasks and wait for them to finish
    ///
    /// A writer blocked waiting for a confirmation is interrupted.
    pub async fn shutdown(mut self) {
        self.signal_shutdown();
        for task in [self.writer.take(), self.reader.take()].into_iter().flatten() {
            if let Err(e) = task.await {
                warn!("Engine task for {} ended abnormally: {}", self.device, e);
            }
        }
        info!("Engine for {} stopped", self.device);
    }

    fn signal_shutdown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
    }
}

impl<E> Drop for Engine<E> {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
    }
}

/// Owns the read half of the link
struct Reader<T, C: FrameCodec> {
    device: Arc<str>,
    io: ReadHalf<T>,
    buffer: Vec<u8>,
    assembler: ReceiveAssembler<C>,
    dispatcher: Arc<EventDispatcher<C::Event>>,
}

impl<T, C> Reader<T, C>
where
    T: AsyncRead + Unpin,
    C: FrameCodec,
{
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Reader for {} started", self.device);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                result = self.io.read(&mut self.buffer) => match result {
                    Ok(0) => {
                        info!("{} closed the link", self.device);
                        break;
                    }
                    Ok(n) => {
                        let data = &self.buffer[..n];
                        debug!("Com<- {} ({} bytes): {:02X?}", self.device, n, data);
                        let events = self.assembler.on_bytes_received(data);
                        for event in &events {
                            debug!("{} decoded {:?}", self.device, event);
                        }
                        self.dispatcher.dispatch(events);
                    }
                    Err(e) if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => continue,
                    Err(e) => {
                        warn!("Read error on {}: {}", self.device, e);
                        tokio::select! {
                            biased;
                            _ = shutdown_requested(&mut shutdown) => break,
                            _ = tokio::time::sleep(READ_ERROR_BACKOFF) => {}
                        }
                    }
                },
            }
        }

        info!("Reader for {} terminated", self.device);
    }
}
