//! Icom CI-V Protocol
//!
//! # Frame Format
//! ```text
//! FE FE [to] [from] [cmd] [subcmd] [data...] FD
//! ```
//!
//! - `FE FE`: preamble
//! - `to`/`from`: CI-V addresses. The controller is `0xE0`.
//! - `cmd`: command code, optionally followed by a sub-command
//! - `FD`: terminator
//!
//! Frequencies are 10 BCD digits, least significant byte first.
//! The radio acknowledges set commands with `FB` (OK) or `FA` (NG).

use std::time::Duration;

use tracing::debug;

use super::{printable, FrequencyReport, ModeReport, RadioMode, RigCommand, RigDescriptor, RigPlugin, Vfo};
use crate::codec::{Confirmation, Decoded};
use crate::error::{ParseError, ProtocolError};
use crate::transaction::Transaction;

/// CI-V frame preamble byte
pub const PREAMBLE: u8 = 0xFE;
/// CI-V frame terminator byte
pub const TERMINATOR: u8 = 0xFD;
/// Default controller address
pub const CONTROLLER_ADDR: u8 = 0xE0;
/// Address used when none is configured (IC-756Pro)
pub const DEFAULT_CIV_ADDRESS: u8 = 0x5C;

/// Unsolicited frequency report (transceive)
pub const CMD_SEND_FREQ: u8 = 0x00;
/// Unsolicited mode report (transceive)
pub const CMD_SEND_MODE: u8 = 0x01;
pub const CMD_READ_FREQ: u8 = 0x03;
pub const CMD_READ_MODE: u8 = 0x04;
pub const CMD_SET_FREQ: u8 = 0x05;
pub const CMD_SET_MODE: u8 = 0x06;
pub const CFM_POSITIVE: u8 = 0xFB;
pub const CFM_NEGATIVE: u8 = 0xFA;

/// Number of BCD bytes in a frequency field
pub const FREQUENCY_BCD_LEN: usize = 5;
const MAX_FREQUENCY_HZ: u64 = 9_999_999_999;

/// Time the radio needs to answer a read
const READ_POST_WRITE_DELAY: Duration = Duration::from_millis(50);

/// Minimum frame: FE FE to from cmd FD
const MIN_FRAME_LEN: usize = 6;

const MODE_CODES: [(RadioMode, u8); 8] = [
    (RadioMode::Lsb, 0x00),
    (RadioMode::Usb, 0x01),
    (RadioMode::Am, 0x02),
    (RadioMode::Cw, 0x03),
    (RadioMode::Rtty, 0x04),
    (RadioMode::Fm, 0x05),
    (RadioMode::Cwr, 0x07),
    (RadioMode::Rttyr, 0x08),
];

/// CI-V mode code for a mode, if the protocol has one
pub fn mode_code(mode: RadioMode) -> Option<u8> {
    MODE_CODES
        .iter()
        .find(|(m, _)| *m == mode)
        .map(|(_, code)| *code)
}

/// Mode for a CI-V mode code
pub fn mode_from_code(code: u8) -> Option<RadioMode> {
    MODE_CODES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(mode, _)| *mode)
}

/// Factory CI-V addresses of common models
pub const KNOWN_ADDRESSES: &[(&str, u8)] = &[
    ("IC-703", 0x68),
    ("IC-706", 0x4E),
    ("IC-706MKIIG", 0x58),
    ("IC-718", 0x5E),
    ("IC-746", 0x56),
    ("IC-746Pro", 0x66),
    ("IC-751", 0x1C),
    ("IC-756", 0x50),
    ("IC-756Pro", 0x5C),
    ("IC-756Pro-II", 0x64),
    ("IC-756Pro-III", 0x6E),
    ("IC-775", 0x46),
    ("IC-781", 0x26),
    ("IC-7000", 0x70),
    ("IC-7100", 0x88),
    ("IC-7200", 0x76),
    ("IC-7300", 0x94),
    ("IC-7410", 0x80),
    ("IC-7600", 0x7A),
    ("IC-7610", 0x98),
    ("IC-7700", 0x74),
    ("IC-7800", 0x6A),
    ("IC-7851", 0x8E),
    ("IC-9100", 0x7C),
    ("IC-9700", 0xA2),
];

/// Look up the factory address of a model, case-insensitive
pub fn address_for_model(model: &str) -> Option<u8> {
    KNOWN_ADDRESSES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(model))
        .map(|(_, addr)| *addr)
}

/// Icom transceivers
#[derive(Debug, Clone)]
pub struct IcomPlugin {
    model: String,
    civ_address: u8,
}

impl IcomPlugin {
    /// Generic plugin using the default CI-V address
    pub fn new() -> Self {
        Self::with_address("All models", DEFAULT_CIV_ADDRESS)
    }

    pub fn with_address(model: impl Into<String>, civ_address: u8) -> Self {
        Self {
            model: model.into(),
            civ_address,
        }
    }

    /// Plugin for a known model, using its factory address
    pub fn for_model(model: &str) -> Option<Self> {
        let (name, addr) = KNOWN_ADDRESSES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(model))?;
        Some(Self::with_address(*name, *addr))
    }

    pub fn civ_address(&self) -> u8 {
        self.civ_address
    }

    /// Build a frame addressed to the radio
    fn frame(&self, cmd: u8, sub_cmd: Option<u8>, data: &[u8]) -> Vec<u8> {
        let mut frame = vec![PREAMBLE, PREAMBLE, self.civ_address, CONTROLLER_ADDR, cmd];
        frame.extend(sub_cmd);
        frame.extend_from_slice(data);
        frame.push(TERMINATOR);
        frame
    }

    fn read_transaction(&self, cmd: u8) -> Transaction {
        Transaction::new(self.frame(cmd, None, &[])).with_post_write_delay(READ_POST_WRITE_DELAY)
    }

    /// Interpret one complete frame, preamble to terminator
    fn parse(&self, frame: &[u8]) -> Result<Option<RigDescriptor>, ParseError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(ParseError::FrameTooShort { len: frame.len() });
        }
        if frame[3] != self.civ_address {
            debug!(
                "CI-V frame from 0x{:02X}, expecting 0x{:02X}",
                frame[3], self.civ_address
            );
            return Ok(None);
        }

        let data = &frame[5..frame.len() - 1];
        let descriptor = match frame[4] {
            CFM_POSITIVE => RigDescriptor::confirmation(Confirmation::Positive),
            CFM_NEGATIVE => RigDescriptor::confirmation(Confirmation::Negative),
            CMD_SEND_FREQ | CMD_READ_FREQ => RigDescriptor {
                frequency: Some(FrequencyReport {
                    hz: bcd_to_frequency(data)?,
                    vfo: Vfo::Current,
                }),
                ..RigDescriptor::default()
            },
            CMD_SEND_MODE | CMD_READ_MODE => {
                let code = *data
                    .first()
                    .ok_or(ParseError::FrameTooShort { len: frame.len() })?;
                let mode = mode_from_code(code)
                    .ok_or_else(|| ParseError::InvalidMode(format!("0x{:02X}", code)))?;
                RigDescriptor {
                    mode: Some(ModeReport {
                        mode,
                        vfo: Vfo::Current,
                    }),
                    ..RigDescriptor::default()
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(descriptor))
    }
}

impl Default for IcomPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl RigPlugin for IcomPlugin {
    fn manufacturer(&self) -> &str {
        "Icom"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn available_modes(&self) -> Vec<RadioMode> {
        MODE_CODES.iter().map(|(mode, _)| *mode).collect()
    }

    fn encode(&self, command: &RigCommand) -> Result<Vec<Transaction>, ProtocolError> {
        let transactions = match command {
            RigCommand::SetFrequency { hz, .. } => {
                if *hz > MAX_FREQUENCY_HZ {
                    return Err(ProtocolError::ValueOutOfRange {
                        what: "frequency",
                        value: *hz,
                        max: MAX_FREQUENCY_HZ,
                    });
                }
                vec![
                    Transaction::new(self.frame(CMD_SET_FREQ, None, &frequency_to_bcd(*hz)))
                        .with_confirmation(),
                ]
            }
            RigCommand::GetFrequency { .. } => vec![self.read_transaction(CMD_READ_FREQ)],
            RigCommand::SetMode { mode, .. } => {
                let code = mode_code(*mode).ok_or_else(|| ProtocolError::UnsupportedMode {
                    mode: mode.to_string(),
                    rig: self.name(),
                })?;
                vec![Transaction::new(self.frame(CMD_SET_MODE, Some(code), &[])).with_confirmation()]
            }
            RigCommand::GetMode { .. } => vec![self.read_transaction(CMD_READ_MODE)],
            RigCommand::Poll => vec![
                self.read_transaction(CMD_READ_FREQ),
                self.read_transaction(CMD_READ_MODE),
            ],
            RigCommand::Init
            | RigCommand::Cleanup
            | RigCommand::GetActiveVfo
            | RigCommand::SendCw { .. }
            | RigCommand::SetKeyerSpeed { .. }
            | RigCommand::InterruptCw
            | RigCommand::SetAutoInfo { .. } => {
                debug!("Icom has no encoding for {:?}", command);
                Vec::new()
            }
        };
        Ok(transactions)
    }

    fn decode(&self, buf: &[u8]) -> Decoded<RigDescriptor> {
        let Some(mut start) = buf
            .windows(2)
            .position(|w| w[0] == PREAMBLE && w[1] == PREAMBLE)
        else {
            return Decoded::Incomplete;
        };
        // Some radios pad with extra preamble bytes
        while buf.get(start + 2) == Some(&PREAMBLE) {
            start += 1;
        }
        let Some(len) = buf[start..].iter().position(|&b| b == TERMINATOR) else {
            return Decoded::Incomplete;
        };
        let end = start + len;
        let frame = &buf[start..=end];

        let descriptor = match self.parse(frame) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => RigDescriptor::not_supported(printable(frame)),
            Err(e) => {
                debug!("CI-V frame {} not parsed: {}", printable(frame), e);
                RigDescriptor::not_supported(printable(frame))
            }
        };

        Decoded::Complete {
            consumed: end + 1,
            frame: descriptor,
        }
    }
}

/// Convert BCD-encoded bytes to frequency in Hz (least significant first)
pub fn bcd_to_frequency(data: &[u8]) -> Result<u64, ParseError> {
    let mut freq: u64 = 0;
    let mut multiplier: u64 = 1;

    for &byte in data {
        let low = u64::from(byte & 0x0F);
        let high = u64::from(byte >> 4);

        if low > 9 || high > 9 {
            return Err(ParseError::InvalidBcd(byte));
        }

        for digit in [low, high] {
            freq = digit
                .checked_mul(multiplier)
                .and_then(|value| freq.checked_add(value))
                .ok_or_else(|| ParseError::InvalidFrequency(format!("{:02X?}", data)))?;
            multiplier = multiplier.saturating_mul(10);
        }
    }

    Ok(freq)
}

/// Convert frequency in Hz to 10 BCD digits, least significant first
pub fn frequency_to_bcd(hz: u64) -> [u8; FREQUENCY_BCD_LEN] {
    let mut result = [0u8; FREQUENCY_BCD_LEN];
    let mut remaining = hz;

    for byte in result.iter_mut() {
        let low = (remaining % 10) as u8;
        remaining /= 10;
        let high = (remaining % 10) as u8;
        remaining /= 10;
        *byte = (high << 4) | low;
    }

    result
}
