//! Events emitted by the radio link

use lz_protocol::{Confirmation, Confirms, RadioMode, Vfo};
use serde::Serialize;

/// Something the radio told us
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RadioEvent {
    Frequency { hz: u64, vfo: Vfo },
    Mode { mode: RadioMode, vfo: Vfo },
    ActiveVfo { vfo: Vfo },
    Confirmation { confirmation: Confirmation },
    Smeter { value: i32 },
    /// A frame the rig plugin could not interpret
    Unsupported { data: String },
}

impl Confirms for RadioEvent {
    fn confirmation(&self) -> Option<Confirmation> {
        match self {
            RadioEvent::Confirmation { confirmation } => Some(*confirmation),
            _ => None,
        }
    }
}
