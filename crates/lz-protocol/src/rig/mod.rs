//! Pluggable CAT rig protocols
//!
//! A rig plugin knows one radio family's wire format. It turns high level
//! [`RigCommand`]s into [`Transaction`]s and decodes incoming bytes into a
//! [`RigDescriptor`], a flat report of whatever the frame told us.
//!
//! Plugins are stateless with respect to the link. The serial engine owns
//! the receive buffer and calls [`RigPlugin::decode`] with everything it
//! has accumulated so far.

use std::fmt;
use std::str::FromStr;

use crate::codec::{Confirmation, Decoded};
use crate::error::{ParseError, ProtocolError};
use crate::transaction::Transaction;

pub mod icom;
pub mod kenwood;
mod registry;

pub use icom::IcomPlugin;
pub use kenwood::KenwoodPlugin;
pub use registry::PluginRegistry;

/// Operating modes known to the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RadioMode {
    Am,
    Cw,
    Usb,
    Lsb,
    Rtty,
    Fm,
    Wfm,
    /// CW reverse
    Cwr,
    /// RTTY reverse
    Rttyr,
    /// AM synchronous
    Ams,
    PktLsb,
    PktUsb,
    PktFm,
    EcssUsb,
    EcssLsb,
    Fax,
    Sam,
    Sal,
    Sah,
    Dsb,
}

impl RadioMode {
    pub const ALL: [RadioMode; 20] = [
        RadioMode::Am,
        RadioMode::Cw,
        RadioMode::Usb,
        RadioMode::Lsb,
        RadioMode::Rtty,
        RadioMode::Fm,
        RadioMode::Wfm,
        RadioMode::Cwr,
        RadioMode::Rttyr,
        RadioMode::Ams,
        RadioMode::PktLsb,
        RadioMode::PktUsb,
        RadioMode::PktFm,
        RadioMode::EcssUsb,
        RadioMode::EcssLsb,
        RadioMode::Fax,
        RadioMode::Sam,
        RadioMode::Sal,
        RadioMode::Sah,
        RadioMode::Dsb,
    ];

    /// Lowercase name used in logs and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            RadioMode::Am => "am",
            RadioMode::Cw => "cw",
            RadioMode::Usb => "usb",
            RadioMode::Lsb => "lsb",
            RadioMode::Rtty => "rtty",
            RadioMode::Fm => "fm",
            RadioMode::Wfm => "wfm",
            RadioMode::Cwr => "cwr",
            RadioMode::Rttyr => "rttyr",
            RadioMode::Ams => "ams",
            RadioMode::PktLsb => "pktlsb",
            RadioMode::PktUsb => "pktusb",
            RadioMode::PktFm => "pktfm",
            RadioMode::EcssUsb => "ecssusb",
            RadioMode::EcssLsb => "ecsslsb",
            RadioMode::Fax => "fax",
            RadioMode::Sam => "sam",
            RadioMode::Sal => "sal",
            RadioMode::Sah => "sah",
            RadioMode::Dsb => "dsb",
        }
    }
}

impl fmt::Display for RadioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RadioMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        RadioMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == lower)
            .ok_or_else(|| ParseError::InvalidMode(s.to_string()))
    }
}

/// VFO selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Vfo {
    /// Whichever VFO is active, or the protocol does not say
    #[default]
    Current,
    A,
    B,
}

/// High level commands a rig plugin can encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RigCommand {
    /// Sent once after the port opens
    Init,
    /// Sent once before the port closes
    Cleanup,
    SetFrequency { hz: u64, vfo: Vfo },
    GetFrequency { vfo: Vfo },
    SetMode { mode: RadioMode, vfo: Vfo },
    GetMode { vfo: Vfo },
    GetActiveVfo,
    SendCw { text: String },
    SetKeyerSpeed { wpm: u32 },
    InterruptCw,
    /// Ask for a status snapshot (frequency, mode, VFO)
    Poll,
    /// Toggle unsolicited status reports from the rig
    SetAutoInfo { enabled: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrequencyReport {
    pub hz: u64,
    pub vfo: Vfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModeReport {
    pub mode: RadioMode,
    pub vfo: Vfo,
}

/// Everything one decoded rig frame reported
///
/// A single frame can carry several facts at once (a Kenwood `IF` answer
/// holds frequency, mode and the active VFO).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RigDescriptor {
    pub confirmation: Option<Confirmation>,
    pub frequency: Option<FrequencyReport>,
    pub mode: Option<ModeReport>,
    pub active_vfo: Option<Vfo>,
    pub smeter: Option<i32>,
    /// Printable form of a frame the plugin could not interpret
    pub not_supported: Option<String>,
}

impl RigDescriptor {
    pub fn confirmation(confirmation: Confirmation) -> Self {
        Self {
            confirmation: Some(confirmation),
            ..Self::default()
        }
    }

    pub fn not_supported(data: impl Into<String>) -> Self {
        Self {
            not_supported: Some(data.into()),
            ..Self::default()
        }
    }

    /// True when the frame carried nothing the plugin understood
    pub fn is_empty(&self) -> bool {
        self.confirmation.is_none()
            && self.frequency.is_none()
            && self.mode.is_none()
            && self.active_vfo.is_none()
            && self.smeter.is_none()
            && self.not_supported.is_none()
    }
}

/// A radio protocol implementation
pub trait RigPlugin: Send + Sync + fmt::Debug {
    fn manufacturer(&self) -> &str;

    fn model(&self) -> &str;

    /// Registry name, `"<manufacturer> <model>"`
    fn name(&self) -> String {
        format!("{} {}", self.manufacturer(), self.model())
    }

    /// Modes this rig can be switched to
    fn available_modes(&self) -> Vec<RadioMode>;

    /// Encode a command. An empty list means the rig has nothing to send
    /// for it.
    fn encode(&self, command: &RigCommand) -> Result<Vec<Transaction>, ProtocolError>;

    /// Decode the next frame from the front of `buf`
    fn decode(&self, buf: &[u8]) -> Decoded<RigDescriptor>;
}

/// Render a frame for logs, as text when printable
pub(crate) fn printable(frame: &[u8]) -> String {
    match std::str::from_utf8(frame) {
        Ok(text) if text.chars().all(|c| !c.is_control()) => text.to_string(),
        _ => frame
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
