//! Kenwood CAT Protocol
//!
//! ASCII commands with a two-letter prefix, terminated by `;`.
//!
//! # Commands sent
//! - `FA`/`FB` - set or query the frequency of VFO A/B (11 digits, Hz)
//! - `MD` - set or query the mode
//! - `FR` - query the active VFO
//! - `IF` - status snapshot (frequency, mode, VFO)
//! - `KY`/`KS` - send CW text, set keyer speed
//! - `AI` - auto-information (unsolicited status reports)
//!
//! # Replies decoded
//! `FA`, `FB`, `FR`, `MD`, `IF` and `SM`. Anything else is reported as not
//! supported.

use tracing::{debug, warn};

use super::{printable, FrequencyReport, ModeReport, RadioMode, RigCommand, RigDescriptor, RigPlugin, Vfo};
use crate::codec::Decoded;
use crate::error::{ParseError, ProtocolError};
use crate::transaction::Transaction;

/// Command terminator
pub const TERMINATOR: u8 = b';';

/// Longest text the keyer buffer accepts in one `KY` command
pub const MAX_CW_TEXT_LEN: usize = 24;

/// Highest frequency the 11-digit field can carry
const MAX_FREQUENCY_HZ: u64 = 99_999_999_999;

const AUTO_INFO_ON: &str = "AI2;";
const AUTO_INFO_OFF: &str = "AI0;";

// Offsets into an `IF` answer
const IF_FREQUENCY: std::ops::Range<usize> = 2..13;
const IF_MODE: usize = 29;
const IF_VFO: usize = 30;

const MODE_CODES: [(RadioMode, u8); 8] = [
    (RadioMode::Lsb, 1),
    (RadioMode::Usb, 2),
    (RadioMode::Cw, 3),
    (RadioMode::Fm, 4),
    (RadioMode::Am, 5),
    (RadioMode::Rtty, 6),
    (RadioMode::Cwr, 7),
    (RadioMode::Rttyr, 9),
];

fn mode_code(mode: RadioMode) -> Option<u8> {
    MODE_CODES
        .iter()
        .find(|(m, _)| *m == mode)
        .map(|(_, code)| *code)
}

fn mode_from_code(code: u8) -> Option<RadioMode> {
    MODE_CODES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(mode, _)| *mode)
}

/// Kenwood transceivers
#[derive(Debug, Clone)]
pub struct KenwoodPlugin {
    model: String,
}

impl KenwoodPlugin {
    pub fn new() -> Self {
        Self {
            model: "All models".to_string(),
        }
    }

    fn vfo_letter(vfo: Vfo) -> char {
        match vfo {
            Vfo::B => 'B',
            Vfo::A | Vfo::Current => 'A',
        }
    }

    fn encode_text(&self, command: &RigCommand) -> Result<Option<String>, ProtocolError> {
        let text = match command {
            RigCommand::Init => AUTO_INFO_ON.to_string(),
            RigCommand::Cleanup => return Ok(None),
            RigCommand::SetFrequency { hz, vfo } => {
                if *hz > MAX_FREQUENCY_HZ {
                    return Err(ProtocolError::ValueOutOfRange {
                        what: "frequency",
                        value: *hz,
                        max: MAX_FREQUENCY_HZ,
                    });
                }
                format!("F{}{:011};", Self::vfo_letter(*vfo), hz)
            }
            RigCommand::GetFrequency { vfo } => format!("F{};", Self::vfo_letter(*vfo)),
            RigCommand::SetMode { mode, .. } => {
                let code = mode_code(*mode).ok_or_else(|| ProtocolError::UnsupportedMode {
                    mode: mode.to_string(),
                    rig: self.name(),
                })?;
                format!("MD{};", code)
            }
            RigCommand::GetMode { .. } => "MD;".to_string(),
            RigCommand::GetActiveVfo => "FR;".to_string(),
            RigCommand::SendCw { text } => {
                if text.chars().count() > MAX_CW_TEXT_LEN {
                    warn!(
                        "CW text is {} characters, keyer takes {}",
                        text.chars().count(),
                        MAX_CW_TEXT_LEN
                    );
                }
                format!("KY {:<width$};", text, width = MAX_CW_TEXT_LEN)
            }
            RigCommand::SetKeyerSpeed { wpm } => format!("KS{:03};", wpm),
            RigCommand::InterruptCw => "KY0;".to_string(),
            RigCommand::Poll => "IF;".to_string(),
            RigCommand::SetAutoInfo { enabled } => {
                let text = if *enabled { AUTO_INFO_ON } else { AUTO_INFO_OFF };
                text.to_string()
            }
        };
        Ok(Some(text))
    }

    /// Parse one complete command, terminator included
    fn parse(frame: &[u8]) -> Result<Option<RigDescriptor>, ParseError> {
        let text = std::str::from_utf8(frame).map_err(|_| ParseError::NotAscii)?;
        let body = text.strip_suffix(';').unwrap_or(text);
        let params = body.get(2..).unwrap_or("");

        let descriptor = match body.get(..2) {
            Some("FA") => Self::frequency(params, Vfo::A)?,
            Some("FB") => Self::frequency(params, Vfo::B)?,
            Some("FR") => RigDescriptor {
                active_vfo: Some(Self::vfo_digit(params.as_bytes().first().copied())?),
                ..RigDescriptor::default()
            },
            Some("MD") => RigDescriptor {
                mode: Some(ModeReport {
                    mode: Self::mode_digit(params.as_bytes().first().copied())?,
                    vfo: Vfo::Current,
                }),
                ..RigDescriptor::default()
            },
            Some("IF") => Self::info(body)?,
            Some("SM") => {
                let value = params
                    .parse::<i32>()
                    .map_err(|_| ParseError::InvalidField(params.to_string()))?;
                RigDescriptor {
                    smeter: Some(value),
                    ..RigDescriptor::default()
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(descriptor))
    }

    fn frequency(digits: &str, vfo: Vfo) -> Result<RigDescriptor, ParseError> {
        let hz = digits
            .parse::<u64>()
            .map_err(|_| ParseError::InvalidFrequency(digits.to_string()))?;
        Ok(RigDescriptor {
            frequency: Some(FrequencyReport { hz, vfo }),
            ..RigDescriptor::default()
        })
    }

    fn vfo_digit(digit: Option<u8>) -> Result<Vfo, ParseError> {
        match digit {
            Some(b'0') => Ok(Vfo::A),
            Some(_) => Ok(Vfo::B),
            None => Err(ParseError::InvalidField("missing VFO".into())),
        }
    }

    fn mode_digit(digit: Option<u8>) -> Result<RadioMode, ParseError> {
        digit
            .filter(u8::is_ascii_digit)
            .and_then(|d| mode_from_code(d - b'0'))
            .ok_or_else(|| ParseError::InvalidMode(format!("{:?}", digit.map(char::from))))
    }

    /// `IF` answer: frequency at 2..13, mode digit at 29, VFO digit at 30
    fn info(body: &str) -> Result<RigDescriptor, ParseError> {
        let bytes = body.as_bytes();
        if bytes.len() <= IF_VFO {
            return Err(ParseError::FrameTooShort { len: bytes.len() });
        }
        let digits = body
            .get(IF_FREQUENCY)
            .ok_or_else(|| ParseError::InvalidFrequency(body.to_string()))?;
        let hz = digits
            .parse::<u64>()
            .map_err(|_| ParseError::InvalidFrequency(digits.to_string()))?;
        let mode = Self::mode_digit(Some(bytes[IF_MODE]))?;
        let vfo = Self::vfo_digit(Some(bytes[IF_VFO]))?;

        Ok(RigDescriptor {
            frequency: Some(FrequencyReport { hz, vfo }),
            mode: Some(ModeReport { mode, vfo }),
            active_vfo: Some(vfo),
            ..RigDescriptor::default()
        })
    }
}

impl Default for KenwoodPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl RigPlugin for KenwoodPlugin {
    fn manufacturer(&self) -> &str {
        "Kenwood"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn available_modes(&self) -> Vec<RadioMode> {
        MODE_CODES.iter().map(|(mode, _)| *mode).collect()
    }

    fn encode(&self, command: &RigCommand) -> Result<Vec<Transaction>, ProtocolError> {
        let encoded = self.encode_text(command)?;
        debug!("Kenwood {:?} -> {:?}", command, encoded);
        Ok(encoded
            .map(|text| Transaction::new(text.into_bytes()))
            .into_iter()
            .collect())
    }

    fn decode(&self, buf: &[u8]) -> Decoded<RigDescriptor> {
        let Some(end) = buf.iter().position(|&b| b == TERMINATOR) else {
            return Decoded::Incomplete;
        };
        let frame = &buf[..=end];

        let descriptor = match Self::parse(frame) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => RigDescriptor::not_supported(printable(frame)),
            Err(e) => {
                debug!("Kenwood frame {:?} not parsed: {}", printable(frame), e);
                RigDescriptor::not_supported(printable(frame))
            }
        };

        Decoded::Complete {
            consumed: end + 1,
            frame: descriptor,
        }
    }
}
