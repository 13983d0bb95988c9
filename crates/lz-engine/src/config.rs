//! Link configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assembler::DEFAULT_GARBAGE_LIMIT;

/// Radio command queue depth
pub const RADIO_QUEUE_CAPACITY: usize = 30;
/// Tuner command queue depth. Only the latest relay position matters.
pub const TUNER_QUEUE_CAPACITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

/// Serial line settings for one device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialSettings {
    /// Serial port path
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits, 5 to 8
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub flow_control: FlowControl,
    /// DTR line state after opening. Left untouched when unset.
    #[serde(default)]
    pub dtr: Option<bool>,
    /// RTS line state after opening. Some interfaces draw power from it.
    #[serde(default)]
    pub rts: Option<bool>,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

impl SerialSettings {
    /// 8N1 settings with no flow control
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: default_data_bits(),
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            dtr: None,
            rts: None,
        }
    }

    /// The tuner's line settings, 9600 8N2
    pub fn tuner(port: impl Into<String>) -> Self {
        Self {
            stop_bits: StopBits::Two,
            ..Self::new(port, 9600)
        }
    }
}

/// Tuning knobs of one serial engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineOptions {
    /// Pending transactions held before new ones are rejected
    pub queue_capacity: usize,
    /// Undecodable bytes tolerated before the receive buffer is discarded
    #[serde(default = "default_garbage_limit")]
    pub garbage_limit: usize,
    /// Size of a single read from the port
    #[serde(default = "default_read_chunk")]
    pub read_chunk_size: usize,
    /// Time given to queued cleanup commands on disconnect
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: u64,
    /// Capacity of the broadcast event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_garbage_limit() -> usize {
    DEFAULT_GARBAGE_LIMIT
}

fn default_read_chunk() -> usize {
    256
}

fn default_disconnect_grace_ms() -> u64 {
    150
}

fn default_event_capacity() -> usize {
    64
}

impl EngineOptions {
    pub fn radio() -> Self {
        Self {
            queue_capacity: RADIO_QUEUE_CAPACITY,
            ..Self::default()
        }
    }

    pub fn tuner() -> Self {
        Self {
            queue_capacity: TUNER_QUEUE_CAPACITY,
            ..Self::default()
        }
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            queue_capacity: RADIO_QUEUE_CAPACITY,
            garbage_limit: default_garbage_limit(),
            read_chunk_size: default_read_chunk(),
            disconnect_grace_ms: default_disconnect_grace_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Transceiver link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RadioConfig {
    pub serial: SerialSettings,
    /// Registry name of the rig plugin, e.g. `"Kenwood All models"`
    pub rig: String,
    #[serde(default = "EngineOptions::radio")]
    pub engine: EngineOptions,
}

/// Antenna tuner link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TunerConfig {
    pub serial: SerialSettings,
    #[serde(default = "EngineOptions::tuner")]
    pub engine: EngineOptions,
}
