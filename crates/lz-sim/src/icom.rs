//! Virtual Icom transceiver
//!
//! Answers the CI-V subset the logger uses: set and read frequency, set and
//! read mode. Frames addressed to another radio are ignored, as on a shared
//! CI-V bus.

use lz_protocol::rig::icom::{
    bcd_to_frequency, frequency_to_bcd, mode_from_code, CFM_NEGATIVE, CFM_POSITIVE,
    CMD_READ_FREQ, CMD_READ_MODE, CMD_SEND_FREQ, CMD_SET_FREQ, CMD_SET_MODE, CONTROLLER_ADDR,
    DEFAULT_CIV_ADDRESS, PREAMBLE, TERMINATOR,
};
use lz_protocol::RadioMode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{ResponseMode, VirtualDevice};

/// Filter byte sent with mode replies
const FILTER_NORMAL: u8 = 0x01;

/// Snapshot of the virtual transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IcomSimState {
    pub frequency_hz: u64,
    pub mode: Option<RadioMode>,
}

/// A simulated Icom rig
#[derive(Debug, Clone)]
pub struct VirtualIcom {
    id: String,
    address: u8,
    frequency_hz: u64,
    mode_code: u8,
    response_mode: ResponseMode,
    buffer: Vec<u8>,
}

impl VirtualIcom {
    /// A rig on the default CI-V address, on 14.025 MHz CW
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_address(id, DEFAULT_CIV_ADDRESS)
    }

    pub fn with_address(id: impl Into<String>, address: u8) -> Self {
        Self {
            id: id.into(),
            address,
            frequency_hz: 14_025_000,
            mode_code: 0x03,
            response_mode: ResponseMode::Normal,
            buffer: Vec::new(),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }

    pub fn mode(&self) -> Option<RadioMode> {
        mode_from_code(self.mode_code)
    }

    /// Turn the VFO knob
    ///
    /// Returns the transceive frame the rig broadcasts for the change.
    pub fn tune_to(&mut self, hz: u64) -> Vec<u8> {
        self.frequency_hz = hz;
        self.frame(CMD_SEND_FREQ, &frequency_to_bcd(hz))
    }

    /// Build a frame from this rig to the controller
    fn frame(&self, cmd: u8, data: &[u8]) -> Vec<u8> {
        let mut frame = vec![PREAMBLE, PREAMBLE, CONTROLLER_ADDR, self.address, cmd];
        frame.extend_from_slice(data);
        frame.push(TERMINATOR);
        frame
    }

    fn ack(&self, positive: bool) -> Vec<u8> {
        let code = if positive { CFM_POSITIVE } else { CFM_NEGATIVE };
        self.frame(code, &[])
    }

    /// Handle one frame from preamble to terminator
    fn handle_frame(&mut self, frame: &[u8]) -> Vec<u8> {
        // FE FE to from cmd .. FD
        if frame.len() < 6 || frame[2] != self.address {
            return Vec::new();
        }
        let cmd = frame[4];
        let data = &frame[5..frame.len() - 1];
        debug!(
            "Virtual Icom {} got command 0x{:02X} with {:02X?}",
            self.id, cmd, data
        );

        match self.response_mode {
            ResponseMode::Silent => return Vec::new(),
            ResponseMode::Reject => return self.ack(false),
            ResponseMode::Normal => {}
        }

        match cmd {
            CMD_SET_FREQ => match bcd_to_frequency(data) {
                Ok(hz) => {
                    self.frequency_hz = hz;
                    self.ack(true)
                }
                Err(e) => {
                    warn!("Virtual Icom {} rejected frequency: {}", self.id, e);
                    self.ack(false)
                }
            },
            CMD_SET_MODE => match data.first().copied().filter(|&c| mode_from_code(c).is_some()) {
                Some(code) => {
                    self.mode_code = code;
                    self.ack(true)
                }
                None => self.ack(false),
            },
            CMD_READ_FREQ => self.frame(CMD_READ_FREQ, &frequency_to_bcd(self.frequency_hz)),
            CMD_READ_MODE => self.frame(CMD_READ_MODE, &[self.mode_code, FILTER_NORMAL]),
            _ => self.ack(false),
        }
    }
}

impl VirtualDevice for VirtualIcom {
    type State = IcomSimState;

    fn id(&self) -> &str {
        &self.id
    }

    fn process_bytes(&mut self, data: &[u8]) -> Vec<u8> {
        self.buffer.extend_from_slice(data);
        let mut reply = Vec::new();

        while let Some(start) = self
            .buffer
            .windows(2)
            .position(|w| w[0] == PREAMBLE && w[1] == PREAMBLE)
        {
            let Some(len) = self.buffer[start..].iter().position(|&b| b == TERMINATOR) else {
                self.buffer.drain(..start);
                return reply;
            };
            let end = start + len;
            let frame: Vec<u8> = self.buffer.drain(..=end).skip(start).collect();
            reply.extend(self.handle_frame(&frame));
        }

        // Keep a lone trailing preamble byte, drop anything else
        let keep_last = self.buffer.last() == Some(&PREAMBLE);
        self.buffer.clear();
        if keep_last {
            self.buffer.push(PREAMBLE);
        }
        reply
    }

    fn state(&self) -> IcomSimState {
        IcomSimState {
            frequency_hz: self.frequency_hz,
            mode: self.mode(),
        }
    }

    fn set_response_mode(&mut self, mode: ResponseMode) {
        self.response_mode = mode;
    }
}
