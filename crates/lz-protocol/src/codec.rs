//! Streaming decode contract shared by every device protocol

use std::fmt::Debug;

/// Result of one decode attempt against the front of a receive buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// No complete frame is buffered yet. Nothing was consumed.
    Incomplete,
    /// A frame was extracted. `consumed` counts every byte up to and
    /// including the end of the frame, garbage skipped before it included.
    Complete { consumed: usize, frame: T },
}

impl<T> Decoded<T> {
    /// Number of bytes the caller should drop from its buffer
    pub fn consumed(&self) -> usize {
        match self {
            Decoded::Incomplete => 0,
            Decoded::Complete { consumed, .. } => *consumed,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Decoded::Incomplete)
    }

    /// Transform the decoded frame, keeping the consumed count
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Decoded::Incomplete => Decoded::Incomplete,
            Decoded::Complete { consumed, frame } => Decoded::Complete {
                consumed,
                frame: f(frame),
            },
        }
    }

    /// The decoded frame, if any
    pub fn into_frame(self) -> Option<T> {
        match self {
            Decoded::Incomplete => None,
            Decoded::Complete { frame, .. } => Some(frame),
        }
    }
}

/// Device acknowledgment of the most recently written transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Confirmation {
    Positive,
    Negative,
}

/// Implemented by decoded events so the engine can route confirmations to
/// the writer before any listener sees them
pub trait Confirms {
    fn confirmation(&self) -> Option<Confirmation>;
}

/// A streaming frame decoder for one device protocol
///
/// Implementations must not assume the buffer starts on a frame boundary.
/// They return [`Decoded::Incomplete`] when no full frame is present and
/// must never report a `Complete` result that consumes zero bytes.
pub trait FrameCodec: Send + 'static {
    /// Event type emitted to listeners
    type Event: Confirms + Clone + Debug + Send + Sync + 'static;

    /// Try to extract the next frame from the front of `buf`
    fn decode(&mut self, buf: &[u8]) -> Decoded<Vec<Self::Event>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumed_of_incomplete_is_zero() {
        let decoded: Decoded<u8> = Decoded::Incomplete;
        assert_eq!(decoded.consumed(), 0);
        assert!(decoded.is_incomplete());
    }

    #[test]
    fn test_map_keeps_consumed() {
        let decoded = Decoded::Complete {
            consumed: 7,
            frame: 2u8,
        };
        let mapped = decoded.map(|v| vec![v; 2]);
        assert_eq!(
            mapped,
            Decoded::Complete {
                consumed: 7,
                frame: vec![2, 2]
            }
        );
        assert_eq!(mapped.into_frame(), Some(vec![2, 2]));
    }
}
