//! Virtual LZ1AQ antenna tuner
//!
//! Parses the host's 7-byte command packets the way the tuner firmware does
//! and answers with confirmation and telemetry frames. Telemetry comes from
//! a toy load model: reflected power grows with the distance between the
//! relay positions and a configurable match point.

use lz_protocol::atu::{
    AtuCommand, AtuFrame, RawTelemetry, RelaySettings, COMMAND_LEN, COMMAND_MAGIC,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{ResponseMode, VirtualDevice};

/// Raw forward power reported while tune mode is on
const TUNE_FORWARD_RAW: u16 = 0x2000;
/// Raw antenna voltage reading at a perfect match
const ANTENNA_RAW: u16 = 0x0800;
/// Raw supply voltage reading
const SUPPLY_RAW: u16 = 0x0564;
/// Relay distance at which half the power is reflected
const HALF_REFLECTION_DISTANCE: u32 = 256;

/// Snapshot of the virtual tuner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TunerSimState {
    pub relays: RelaySettings,
    pub tune_mode: bool,
    pub commands_received: u64,
}

/// A simulated tuner
#[derive(Debug, Clone)]
pub struct VirtualTuner {
    id: String,
    relays: RelaySettings,
    tune_mode: bool,
    match_point: (u16, u16),
    response_mode: ResponseMode,
    commands_received: u64,
    pending: Vec<u8>,
}

impl VirtualTuner {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            relays: RelaySettings::default(),
            tune_mode: false,
            match_point: (0x0200, 0x0100),
            response_mode: ResponseMode::Normal,
            commands_received: 0,
            pending: Vec::new(),
        }
    }

    pub fn relays(&self) -> RelaySettings {
        self.relays
    }

    pub fn tune_mode(&self) -> bool {
        self.tune_mode
    }

    pub fn commands_received(&self) -> u64 {
        self.commands_received
    }

    /// Move the C1/L position that gives a perfect match
    pub fn set_match_point(&mut self, c: u16, l: u16) {
        self.match_point = (c, l);
    }

    /// Telemetry for the current relay positions
    pub fn telemetry(&self) -> RawTelemetry {
        let forward = if self.tune_mode { TUNE_FORWARD_RAW } else { 0 };
        let distance = u32::from(self.relays.c.abs_diff(self.match_point.0))
            + u32::from(self.relays.l.abs_diff(self.match_point.1));
        let spread = distance + HALF_REFLECTION_DISTANCE;
        let backward = u32::from(forward) * distance / spread;
        let antenna = if self.tune_mode {
            u32::from(ANTENNA_RAW) * HALF_REFLECTION_DISTANCE / spread
        } else {
            0
        };
        RawTelemetry {
            forward,
            backward: backward as u16,
            antenna: antenna as u16,
            supply: SUPPLY_RAW,
        }
    }

    fn handle_packet(&mut self, packet: &[u8; COMMAND_LEN]) -> Vec<u8> {
        self.commands_received += 1;
        let command = AtuCommand::decode(packet);
        debug!("Virtual tuner {} got {:?}", self.id, command);

        match self.response_mode {
            ResponseMode::Silent => return Vec::new(),
            ResponseMode::Reject => return AtuFrame::NegativeConfirmation.encode(),
            ResponseMode::Normal => {}
        }

        let reply = match command {
            Some(AtuCommand::SetRelays(relays)) => {
                self.relays = relays;
                AtuFrame::PositiveConfirmation
            }
            Some(AtuCommand::TuneMode { enabled }) => {
                self.tune_mode = enabled;
                AtuFrame::PositiveConfirmation
            }
            Some(AtuCommand::ReadAdc) => AtuFrame::Telemetry(self.telemetry()),
            None => {
                warn!(
                    "Virtual tuner {} does not understand {:02X?}",
                    self.id, packet
                );
                AtuFrame::NegativeConfirmation
            }
        };
        reply.encode()
    }
}

impl VirtualDevice for VirtualTuner {
    type State = TunerSimState;

    fn id(&self) -> &str {
        &self.id
    }

    fn process_bytes(&mut self, data: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(data);
        let mut reply = Vec::new();

        loop {
            match self.pending.iter().position(|&b| b == COMMAND_MAGIC) {
                Some(0) => {}
                Some(start) => {
                    debug!("Virtual tuner {} skipped {} bytes", self.id, start);
                    self.pending.drain(..start);
                }
                None => {
                    self.pending.clear();
                    break;
                }
            }
            let Some(packet) = self
                .pending
                .get(..COMMAND_LEN)
                .and_then(|p| <[u8; COMMAND_LEN]>::try_from(p).ok())
            else {
                break;
            };
            self.pending.drain(..COMMAND_LEN);
            reply.extend(self.handle_packet(&packet));
        }

        reply
    }

    fn state(&self) -> TunerSimState {
        TunerSimState {
            relays: self.relays,
            tune_mode: self.tune_mode,
            commands_received: self.commands_received,
        }
    }

    fn set_response_mode(&mut self, mode: ResponseMode) {
        self.response_mode = mode;
    }
}
