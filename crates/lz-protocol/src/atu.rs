//! LZ1AQ ATU Binary Protocol
//!
//! The antenna tuning unit speaks a small fixed binary protocol.
//!
//! # Device to host
//! ```text
//! FE FE [type] [payload...]
//! ```
//!
//! - `FE FE`: frame marker. Anything before the first marker is line noise.
//! - type `01`: positive confirmation, 3 bytes total
//! - type `02`: ADC telemetry, 11 bytes total. Four big-endian `u16`
//!   fields: forward, backward, antenna, supply. A telemetry frame also
//!   confirms the command that requested it.
//! - any other type: negative confirmation, 3 bytes total
//!
//! The marker is not escaped inside telemetry payloads. Decoding always
//! aligns on the first `FE FE` in the buffer, so a payload containing that
//! sequence can be misframed. The protocol offers no way to tell the two
//! apart.
//!
//! # Host to device
//! ```text
//! 73 [cmd] 00 [b3] [b4] [b5] [b6]
//! ```
//!
//! Every command is 7 bytes starting with the `0x73` magic byte. See
//! [`AtuCommand`] for the layouts.

use std::time::Duration;

use crate::codec::{Confirmation, Confirms, Decoded, FrameCodec};
use crate::transaction::Transaction;

/// Frame marker byte (appears twice)
pub const MARKER: u8 = 0xFE;
/// Marker plus type byte
pub const HEADER_LEN: usize = 3;
/// Total length of a telemetry frame
pub const TELEMETRY_FRAME_LEN: usize = 11;

const TYPE_POSITIVE: u8 = 0x01;
const TYPE_TELEMETRY: u8 = 0x02;
/// Type byte the device uses to reject a command
pub const TYPE_NEGATIVE: u8 = 0x03;

/// First byte of every host command
pub const COMMAND_MAGIC: u8 = 0x73;
/// Length of every host command
pub const COMMAND_LEN: usize = 7;

const CMD_TUNE_MODE: u8 = 0x01;
const CMD_READ_ADC: u8 = 0x02;
const CMD_SET_RELAYS: u8 = 0x08;

/// Highest value of the C1 capacitor bank (12 bits)
pub const C1_MAX: u16 = 0x0FFF;
/// Highest value of the inductor bank (12 bits)
pub const L_MAX: u16 = 0x0FFF;
/// Inductance below which the L network uses the low range relay
const L_LOW_RANGE_LIMIT: u16 = 512;

const FLAG_C2_ACTIVE: u8 = 0x01;
const FLAG_C1_ACTIVE: u8 = 0x02;
const FLAG_L_HIGH_RANGE: u8 = 0x04;
const FLAG_ANTENNA: [u8; 3] = [0x08, 0x10, 0x20];
const FLAG_L_LOW_RANGE: u8 = 0x40;

/// Number of selectable antenna outputs
pub const ANTENNA_COUNT: u8 = 3;

/// Lowest reported SWR
pub const MIN_SWR: f32 = 1.0;
/// Highest reported SWR (total reflection)
pub const MAX_SWR: f32 = 100.0;

/// Timing the tuner needs for every command
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(50);
pub const COMMAND_POST_WRITE_DELAY: Duration = Duration::from_millis(100);

/// Raw ADC readings as sent by the tuner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawTelemetry {
    pub forward: u16,
    pub backward: u16,
    pub antenna: u16,
    pub supply: u16,
}

impl RawTelemetry {
    /// Parse the 8 payload bytes that follow the telemetry header
    fn from_payload(payload: &[u8]) -> Self {
        let field = |i: usize| u16::from_be_bytes([payload[i], payload[i + 1]]);
        Self {
            forward: field(0),
            backward: field(2),
            antenna: field(4),
            supply: field(6),
        }
    }

    /// Scaled readings with SWR derived from forward and backward power
    pub fn readings(&self) -> TunerReadings {
        let forward = scale_reading(self.forward);
        let backward = scale_reading(self.backward);
        TunerReadings {
            forward,
            backward,
            antenna: scale_reading(self.antenna),
            supply: scale_reading(self.supply),
            swr: swr(forward, backward),
        }
    }
}

/// Scaled tuner readings
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TunerReadings {
    pub forward: u16,
    pub backward: u16,
    pub antenna: u16,
    pub supply: u16,
    pub swr: f32,
}

/// A decoded frame from the tuner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AtuFrame {
    PositiveConfirmation,
    NegativeConfirmation,
    Telemetry(RawTelemetry),
}

impl AtuFrame {
    /// Wire bytes for this frame, as the tuner would send it
    pub fn encode(&self) -> Vec<u8> {
        match self {
            AtuFrame::PositiveConfirmation => vec![MARKER, MARKER, TYPE_POSITIVE],
            AtuFrame::NegativeConfirmation => vec![MARKER, MARKER, TYPE_NEGATIVE],
            AtuFrame::Telemetry(raw) => {
                let mut frame = Vec::with_capacity(TELEMETRY_FRAME_LEN);
                frame.extend_from_slice(&[MARKER, MARKER, TYPE_TELEMETRY]);
                for value in [raw.forward, raw.backward, raw.antenna, raw.supply] {
                    frame.extend_from_slice(&value.to_be_bytes());
                }
                frame
            }
        }
    }
}

impl Confirms for AtuFrame {
    fn confirmation(&self) -> Option<Confirmation> {
        match self {
            AtuFrame::PositiveConfirmation | AtuFrame::Telemetry(_) => {
                Some(Confirmation::Positive)
            }
            AtuFrame::NegativeConfirmation => Some(Confirmation::Negative),
        }
    }
}

/// Find the first `FE FE` marker in the buffer
pub fn find_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .position(|w| w[0] == MARKER && w[1] == MARKER)
}

/// Decode the next tuner frame from the front of `buf`
///
/// Garbage before the first marker is folded into the consumed count of
/// the frame that follows it. Without a marker, or with a truncated frame,
/// nothing is consumed.
///
/// Telemetry payloads are not escaped, so after garbage a payload that
/// contains `FE FE` can be mistaken for a frame start. This is a limitation
/// of the tuner protocol.
pub fn decode_frame(buf: &[u8]) -> Decoded<AtuFrame> {
    let Some(start) = find_marker(buf) else {
        return Decoded::Incomplete;
    };
    let Some(&kind) = buf.get(start + 2) else {
        return Decoded::Incomplete;
    };

    let frame_len = if kind == TYPE_TELEMETRY {
        TELEMETRY_FRAME_LEN
    } else {
        HEADER_LEN
    };
    let end = start + frame_len;
    if buf.len() < end {
        return Decoded::Incomplete;
    }

    let frame = match kind {
        TYPE_POSITIVE => AtuFrame::PositiveConfirmation,
        TYPE_TELEMETRY => AtuFrame::Telemetry(RawTelemetry::from_payload(
            &buf[start + HEADER_LEN..end],
        )),
        _ => AtuFrame::NegativeConfirmation,
    };

    Decoded::Complete {
        consumed: end,
        frame,
    }
}

/// Convert a raw ADC value to its reading
pub fn scale_reading(raw: u16) -> u16 {
    (f64::from(raw) * 0.4).round() as u16
}

/// Standing wave ratio from scaled forward and backward readings
///
/// No forward power reads as a perfect match. Reflection equal to or
/// above forward power reads as [`MAX_SWR`].
pub fn swr(forward: u16, backward: u16) -> f32 {
    if forward == 0 {
        return MIN_SWR;
    }
    let coeff = (f64::from(backward) / f64::from(forward)).sqrt();
    if coeff >= 1.0 {
        return MAX_SWR;
    }
    let swr = (1.0 + coeff) / (1.0 - coeff);
    (swr as f32).clamp(MIN_SWR, MAX_SWR)
}

/// Decoder for the tuner's frames
#[derive(Debug, Default, Clone, Copy)]
pub struct AtuCodec;

impl AtuCodec {
    pub fn new() -> Self {
        Self
    }
}

impl FrameCodec for AtuCodec {
    type Event = AtuFrame;

    fn decode(&mut self, buf: &[u8]) -> Decoded<Vec<AtuFrame>> {
        decode_frame(buf).map(|frame| vec![frame])
    }
}

/// Position of every relay in the matching network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelaySettings {
    /// C1 capacitor bank, `0..=C1_MAX`
    pub c: u16,
    /// Inductor bank, `0..=L_MAX`
    pub l: u16,
    /// Switch the network to the C2 side
    pub c2_active: bool,
    /// Selected antenna output, `0..ANTENNA_COUNT`
    pub antenna: Option<u8>,
}

impl RelaySettings {
    fn flags(&self) -> u8 {
        let mut flags = if self.c2_active {
            FLAG_C2_ACTIVE
        } else {
            FLAG_C1_ACTIVE
        };
        if let Some(antenna) = self.antenna {
            if let Some(bit) = FLAG_ANTENNA.get(usize::from(antenna)) {
                flags |= bit;
            }
        }
        flags |= if self.l < L_LOW_RANGE_LIMIT {
            FLAG_L_LOW_RANGE
        } else {
            FLAG_L_HIGH_RANGE
        };
        flags
    }

    /// Recover relay settings from an encoded command
    pub fn from_packet(packet: &[u8; COMMAND_LEN]) -> Self {
        let flags = packet[6];
        let antenna = FLAG_ANTENNA
            .iter()
            .position(|bit| flags & bit != 0)
            .map(|i| i as u8);
        Self {
            c: u16::from(packet[3]) | (u16::from(packet[4] & 0x0F) << 8),
            l: u16::from(packet[4] >> 4) | (u16::from(packet[5]) << 4),
            c2_active: flags & FLAG_C2_ACTIVE != 0,
            antenna,
        }
    }
}

/// Commands understood by the tuner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtuCommand {
    /// Load the full relay state
    SetRelays(RelaySettings),
    /// Enter or leave tune mode
    TuneMode { enabled: bool },
    /// Request one telemetry frame
    ReadAdc,
}

impl AtuCommand {
    /// Encode to the 7-byte wire format
    ///
    /// Relay values above 12 bits are masked.
    pub fn encode(&self) -> [u8; COMMAND_LEN] {
        match self {
            AtuCommand::SetRelays(relays) => {
                let c = relays.c & C1_MAX;
                let l = relays.l & L_MAX;
                [
                    COMMAND_MAGIC,
                    CMD_SET_RELAYS,
                    0x00,
                    (c & 0xFF) as u8,
                    ((c >> 8) as u8) | (((l & 0x0F) as u8) << 4),
                    (l >> 4) as u8,
                    relays.flags(),
                ]
            }
            AtuCommand::TuneMode { enabled } => [
                COMMAND_MAGIC,
                CMD_TUNE_MODE,
                0x00,
                u8::from(*enabled),
                0x00,
                0x00,
                0x00,
            ],
            AtuCommand::ReadAdc => [COMMAND_MAGIC, CMD_READ_ADC, 0x00, 0x00, 0x00, 0x00, 0x00],
        }
    }

    /// Decode a host command, as the tuner firmware would
    pub fn decode(packet: &[u8; COMMAND_LEN]) -> Option<Self> {
        if packet[0] != COMMAND_MAGIC {
            return None;
        }
        match packet[1] {
            CMD_SET_RELAYS => Some(AtuCommand::SetRelays(RelaySettings::from_packet(packet))),
            CMD_TUNE_MODE => Some(AtuCommand::TuneMode {
                enabled: packet[3] != 0,
            }),
            CMD_READ_ADC => Some(AtuCommand::ReadAdc),
            _ => None,
        }
    }

    /// Wrap the command in a transaction with the tuner's timing
    pub fn transaction(&self) -> Transaction {
        Transaction::new(self.encode().to_vec())
            .with_confirmation()
            .with_timeout(COMMAND_TIMEOUT)
            .with_post_write_delay(COMMAND_POST_WRITE_DELAY)
    }
}
