//! Antenna tuner facade
//!
//! The tuner is driven from UI sliders. Every setter sends the complete
//! relay state, so only the newest command matters and the queue holds a
//! single transaction. The cached state only changes when the command was
//! accepted by the queue, so a dropped command is resent by the next
//! identical request.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lz_protocol::atu::{
    AtuCodec, AtuCommand, AtuFrame, RelaySettings, TunerReadings, ANTENNA_COUNT, C1_MAX, L_MAX,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::{EngineOptions, TunerConfig};
use crate::dispatcher::{DeviceListener, ListenerId};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::transport;

/// Relay and mode state last accepted for sending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TunerState {
    pub relays: RelaySettings,
    pub tune_mode: bool,
}

/// A connected antenna tuner
pub struct Tuner {
    engine: Engine<AtuFrame>,
    state: Mutex<TunerState>,
    readings: Arc<Mutex<Option<TunerReadings>>>,
    disconnect_grace: Duration,
}

impl Tuner {
    /// Open the configured serial port and start talking to the tuner
    pub fn connect(config: &TunerConfig) -> Result<Self, EngineError> {
        let stream = transport::open_serial(&config.serial)?;
        info!("Connected to tuner on {}", config.serial.port);
        Ok(Self::start(stream, &config.engine))
    }

    /// Start on an already open stream
    pub fn start<T>(io: T, options: &EngineOptions) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let engine = Engine::start("tuner", io, AtuCodec::new(), options);

        let readings = Arc::new(Mutex::new(None));
        let latest = readings.clone();
        engine.add_listener(Arc::new(move |frame: &AtuFrame| {
            if let AtuFrame::Telemetry(raw) = frame {
                *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw.readings());
            }
        }));

        Self {
            engine,
            state: Mutex::new(TunerState::default()),
            readings,
            disconnect_grace: options.disconnect_grace(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TunerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the command for a state change, committing it if accepted
    ///
    /// Returns true when the state is already current or the command was
    /// queued.
    fn apply(
        &self,
        update: impl FnOnce(&mut TunerState),
        command: impl FnOnce(&TunerState) -> AtuCommand,
    ) -> bool {
        let mut state = self.lock_state();
        let mut next = *state;
        update(&mut next);
        if next == *state {
            return true;
        }
        if self.engine.enqueue(command(&next).transaction()) {
            *state = next;
            true
        } else {
            false
        }
    }

    fn apply_relays(&self, update: impl FnOnce(&mut RelaySettings)) -> bool {
        self.apply(
            |state| update(&mut state.relays),
            |state| AtuCommand::SetRelays(state.relays),
        )
    }

    /// Set the C1 capacitor bank, `0..=C1_MAX`
    pub fn set_c1(&self, value: u16) -> bool {
        if value > C1_MAX {
            warn!("C1 value {} out of range 0..={}", value, C1_MAX);
            return false;
        }
        self.apply_relays(|relays| relays.c = value)
    }

    /// Set the inductor bank, `0..=L_MAX`
    pub fn set_l(&self, value: u16) -> bool {
        if value > L_MAX {
            warn!("L value {} out of range 0..={}", value, L_MAX);
            return false;
        }
        self.apply_relays(|relays| relays.l = value)
    }

    /// Switch the capacitor to the C2 side of the network
    pub fn set_n(&self, c2_active: bool) -> bool {
        self.apply_relays(|relays| relays.c2_active = c2_active)
    }

    /// Select antenna output `0..ANTENNA_COUNT`
    pub fn set_antenna(&self, antenna: u8) -> bool {
        if antenna >= ANTENNA_COUNT {
            warn!("Antenna {} does not exist, tuner has {}", antenna, ANTENNA_COUNT);
            return false;
        }
        self.apply_relays(|relays| relays.antenna = Some(antenna))
    }

    /// Load a complete relay state in one command
    pub fn set_all(&self, relays: RelaySettings) -> bool {
        if relays.c > C1_MAX || relays.l > L_MAX {
            warn!("Relay settings {:?} out of range", relays);
            return false;
        }
        if relays.antenna.is_some_and(|a| a >= ANTENNA_COUNT) {
            warn!("Antenna {:?} does not exist", relays.antenna);
            return false;
        }
        self.apply_relays(|current| *current = relays)
    }

    /// Move C1, L and the C2 switch together, keeping the antenna
    pub fn set_tune_controls(&self, c: u16, l: u16, c2_active: bool) -> bool {
        if c > C1_MAX || l > L_MAX {
            warn!("Tune controls C={} L={} out of range", c, l);
            return false;
        }
        self.apply_relays(|relays| {
            relays.c = c;
            relays.l = l;
            relays.c2_active = c2_active;
        })
    }

    pub fn enable_tune_mode(&self) -> bool {
        self.set_tune_mode(true)
    }

    pub fn disable_tune_mode(&self) -> bool {
        self.set_tune_mode(false)
    }

    fn set_tune_mode(&self, enabled: bool) -> bool {
        self.apply(
            |state| state.tune_mode = enabled,
            |state| AtuCommand::TuneMode {
                enabled: state.tune_mode,
            },
        )
    }

    /// Ask the tuner for one telemetry frame
    ///
    /// Refused unless tune mode is on.
    pub fn request_adc_values(&self) -> bool {
        if !self.lock_state().tune_mode {
            warn!("ADC values should not be requested while tune mode is off");
            return false;
        }
        self.engine.enqueue(AtuCommand::ReadAdc.transaction())
    }

    /// True when the queue has room for another command
    pub fn is_ready_to_accept_command(&self) -> bool {
        !self.engine.queue().is_full()
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    pub fn state(&self) -> TunerState {
        *self.lock_state()
    }

    /// Latest telemetry, if any has arrived
    pub fn readings(&self) -> Option<TunerReadings> {
        *self.readings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_listener(&self, listener: Arc<dyn DeviceListener<AtuFrame>>) -> ListenerId {
        self.engine.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.engine.remove_listener(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AtuFrame> {
        self.engine.subscribe()
    }

    /// Stop the link, first giving queued commands time to go out
    pub async fn disconnect(self) {
        if !self.engine.queue().is_empty() {
            tokio::time::sleep(self.disconnect_grace).await;
        }
        info!("Disconnecting from tuner");
        self.engine.shutdown().await;
    }
}
