//! LZ Device Simulation Library
//!
//! Stand-ins for the hardware the logger drives, speaking the real wire
//! protocols:
//!
//! - **VirtualTuner**: the LZ1AQ antenna tuner, with a simple load model
//!   that produces telemetry from the relay positions
//! - **VirtualIcom**: an Icom CI-V transceiver answering frequency and mode
//!   commands
//!
//! Either device can be run behind a `tokio::io::duplex` stream with
//! [`run_virtual_device_task`], which is how the console's simulate mode and
//! the engine's integration tests use them.
//!
//! # Example
//!
//! ```rust
//! use lz_protocol::atu::{AtuCommand, AtuFrame};
//! use lz_sim::{VirtualDevice, VirtualTuner};
//!
//! let mut tuner = VirtualTuner::new("sim");
//! let reply = tuner.process_bytes(&AtuCommand::TuneMode { enabled: true }.encode());
//! assert_eq!(reply, AtuFrame::PositiveConfirmation.encode());
//! assert!(tuner.tune_mode());
//! ```

use serde::{Deserialize, Serialize};

pub mod icom;
pub mod task;
pub mod tuner;

pub use icom::{IcomSimState, VirtualIcom};
pub use task::{run_virtual_device_task, VirtualDeviceCommand};
pub use tuner::{TunerSimState, VirtualTuner};

/// How a virtual device answers commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Act on commands and confirm them
    #[default]
    Normal,
    /// Ignore commands and send nothing back
    Silent,
    /// Reject every command with a negative confirmation
    Reject,
}

/// A simulated device behind a byte stream
pub trait VirtualDevice: Send {
    /// Snapshot published after state changes
    type State: Clone + PartialEq + std::fmt::Debug + Send + 'static;

    fn id(&self) -> &str;

    /// Feed bytes written by the host, returning the device's reply bytes
    fn process_bytes(&mut self, data: &[u8]) -> Vec<u8>;

    fn state(&self) -> Self::State;

    fn set_response_mode(&mut self, mode: ResponseMode);
}
