//! Transceiver facade
//!
//! [`Radio`] pairs a rig plugin with a serial engine. Command methods never
//! block and never fail loudly: encoding errors and queue overflow are
//! logged and the command is dropped, as an operator cannot act on them
//! mid-contest anyway.

use std::sync::Arc;

use lz_protocol::{
    Decoded, FrameCodec, RadioMode, RigCommand, RigPlugin, PluginRegistry, Transaction, Vfo,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::adapter::{DescriptorAdapter, StandardAdapter};
use crate::config::{EngineOptions, RadioConfig};
use crate::dispatcher::{DeviceListener, ListenerId};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::RadioEvent;
use crate::transport;

/// Decodes rig frames with a plugin and maps them to radio events
pub struct CatCodec {
    plugin: Arc<dyn RigPlugin>,
    adapter: Box<dyn DescriptorAdapter>,
}

impl CatCodec {
    pub fn new(plugin: Arc<dyn RigPlugin>) -> Self {
        Self::with_adapter(plugin, Box::new(StandardAdapter))
    }

    pub fn with_adapter(plugin: Arc<dyn RigPlugin>, adapter: Box<dyn DescriptorAdapter>) -> Self {
        Self { plugin, adapter }
    }
}

impl FrameCodec for CatCodec {
    type Event = RadioEvent;

    fn decode(&mut self, buf: &[u8]) -> Decoded<Vec<RadioEvent>> {
        self.plugin.decode(buf).map(|descriptor| {
            if let Some(data) = &descriptor.not_supported {
                info!("{} frame could not be decoded: {}", self.plugin.name(), data);
            }
            self.adapter.adapt(descriptor)
        })
    }
}

/// A connected transceiver
pub struct Radio {
    plugin: Arc<dyn RigPlugin>,
    engine: Engine<RadioEvent>,
    options: EngineOptions,
}

impl Radio {
    /// Open the configured serial port and start talking to the rig
    pub fn connect(config: &RadioConfig, registry: &PluginRegistry) -> Result<Self, EngineError> {
        let plugin = registry.get(&config.rig)?;
        let stream = transport::open_serial(&config.serial)?;
        info!("Connected to {} on {}", plugin.name(), config.serial.port);
        Ok(Self::start(plugin, stream, &config.engine))
    }

    /// Start on an already open stream and send the rig's init commands
    pub fn start<T>(plugin: Arc<dyn RigPlugin>, io: T, options: &EngineOptions) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::start_with_adapter(plugin, Box::new(StandardAdapter), io, options)
    }

    pub fn start_with_adapter<T>(
        plugin: Arc<dyn RigPlugin>,
        adapter: Box<dyn DescriptorAdapter>,
        io: T,
        options: &EngineOptions,
    ) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let codec = CatCodec::with_adapter(plugin.clone(), adapter);
        let engine = Engine::start("radio", io, codec, options);
        let radio = Self {
            plugin,
            engine,
            options: options.clone(),
        };
        radio.send(RigCommand::Init);
        radio
    }

    pub fn manufacturer(&self) -> &str {
        self.plugin.manufacturer()
    }

    pub fn model(&self) -> &str {
        self.plugin.model()
    }

    pub fn available_modes(&self) -> Vec<RadioMode> {
        self.plugin.available_modes()
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    /// True when at least one more transaction fits in the queue
    pub fn is_ready_to_accept_command(&self) -> bool {
        !self.engine.queue().is_full()
    }

    pub fn add_listener(&self, listener: Arc<dyn DeviceListener<RadioEvent>>) -> ListenerId {
        self.engine.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.engine.remove_listener(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.engine.subscribe()
    }

    pub fn set_frequency(&self, hz: u64, vfo: Vfo) {
        self.send(RigCommand::SetFrequency { hz, vfo });
    }

    pub fn get_frequency(&self, vfo: Vfo) {
        self.send(RigCommand::GetFrequency { vfo });
    }

    pub fn set_mode(&self, mode: RadioMode, vfo: Vfo) {
        self.send(RigCommand::SetMode { mode, vfo });
    }

    pub fn get_mode(&self, vfo: Vfo) {
        self.send(RigCommand::GetMode { vfo });
    }

    pub fn get_active_vfo(&self) {
        self.send(RigCommand::GetActiveVfo);
    }

    pub fn send_cw(&self, text: &str) {
        self.send(RigCommand::SendCw {
            text: text.to_string(),
        });
    }

    pub fn set_keyer_speed(&self, wpm: u32) {
        self.send(RigCommand::SetKeyerSpeed { wpm });
    }

    pub fn interrupt_cw(&self) {
        self.send(RigCommand::InterruptCw);
    }

    pub fn poll(&self) {
        self.send(RigCommand::Poll);
    }

    pub fn set_auto_info(&self, enabled: bool) {
        self.send(RigCommand::SetAutoInfo { enabled });
    }

    /// Send the rig's cleanup commands, give them time to drain, stop
    pub async fn disconnect(self) {
        let cleanup_queued = self.send(RigCommand::Cleanup);
        if cleanup_queued {
            tokio::time::sleep(self.options.disconnect_grace()).await;
        }
        info!("Disconnecting from {}", self.plugin.name());
        self.engine.shutdown().await;
    }

    /// Encode and queue a command. Returns true when anything was queued.
    fn send(&self, command: RigCommand) -> bool {
        match self.plugin.encode(&command) {
            Ok(transactions) if transactions.is_empty() => {
                debug!("{} has nothing to send for {:?}", self.plugin.name(), command);
                false
            }
            Ok(transactions) => self.queue_transactions(transactions),
            Err(e) => {
                warn!("Cannot encode {:?} for {}: {}", command, self.plugin.name(), e);
                false
            }
        }
    }

    /// Queue in order, stopping at the first rejection
    fn queue_transactions(&self, transactions: Vec<Transaction>) -> bool {
        let mut queued = false;
        for transaction in transactions {
            if !self.engine.enqueue(transaction) {
                break;
            }
            queued = true;
        }
        queued
    }
}
