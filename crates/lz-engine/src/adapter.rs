//! Mapping from rig plugin reports to radio events

use lz_protocol::RigDescriptor;

use crate::events::RadioEvent;

/// Turns one decoded rig frame into the events listeners see
pub trait DescriptorAdapter: Send {
    fn adapt(&self, descriptor: RigDescriptor) -> Vec<RadioEvent>;
}

/// One event per reported fact, confirmation first
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAdapter;

impl DescriptorAdapter for StandardAdapter {
    fn adapt(&self, descriptor: RigDescriptor) -> Vec<RadioEvent> {
        let mut events = Vec::new();
        if let Some(confirmation) = descriptor.confirmation {
            events.push(RadioEvent::Confirmation { confirmation });
        }
        if let Some(freq) = descriptor.frequency {
            events.push(RadioEvent::Frequency {
                hz: freq.hz,
                vfo: freq.vfo,
            });
        }
        if let Some(mode) = descriptor.mode {
            events.push(RadioEvent::Mode {
                mode: mode.mode,
                vfo: mode.vfo,
            });
        }
        if let Some(vfo) = descriptor.active_vfo {
            events.push(RadioEvent::ActiveVfo { vfo });
        }
        if let Some(value) = descriptor.smeter {
            events.push(RadioEvent::Smeter { value });
        }
        if let Some(data) = descriptor.not_supported {
            events.push(RadioEvent::Unsupported { data });
        }
        events
    }
}
