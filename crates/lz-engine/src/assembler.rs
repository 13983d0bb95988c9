//! Receive buffer reassembly
//!
//! Serial reads deliver arbitrary slices of the device's byte stream. The
//! assembler keeps everything not yet decoded and hands the whole buffer
//! to the codec until no further frame can be extracted.

use lz_protocol::{Decoded, FrameCodec};
use tracing::warn;

/// Buffer size past which undecodable bytes are thrown away
pub const DEFAULT_GARBAGE_LIMIT: usize = 1000;

/// Accumulates received bytes and extracts frames with a codec
#[derive(Debug)]
pub struct ReceiveAssembler<C> {
    codec: C,
    buffer: Vec<u8>,
    garbage_limit: usize,
}

impl<C: FrameCodec> ReceiveAssembler<C> {
    pub fn new(codec: C) -> Self {
        Self::with_garbage_limit(codec, DEFAULT_GARBAGE_LIMIT)
    }

    pub fn with_garbage_limit(codec: C, garbage_limit: usize) -> Self {
        Self {
            codec,
            buffer: Vec::with_capacity(garbage_limit.min(4096)),
            garbage_limit,
        }
    }

    /// Append freshly read bytes and decode every complete frame
    ///
    /// Events come back in stream order.
    pub fn on_bytes_received(&mut self, bytes: &[u8]) -> Vec<C::Event> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        loop {
            match self.codec.decode(&self.buffer) {
                Decoded::Complete { consumed, frame } if consumed > 0 => {
                    let consumed = consumed.min(self.buffer.len());
                    self.buffer.drain(..consumed);
                    events.extend(frame);
                }
                _ => break,
            }
        }

        if self.buffer.len() > self.garbage_limit {
            warn!(
                "Discarding {} undecodable bytes: {:02X?}",
                self.buffer.len(),
                &self.buffer[..self.buffer.len().min(32)]
            );
            self.buffer.clear();
        }

        events
    }

    /// Bytes waiting for the rest of their frame
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
