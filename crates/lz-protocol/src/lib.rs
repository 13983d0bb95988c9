//! LZ Protocol Library
//!
//! Wire-level encoding and decoding for the devices driven by the LZ1AQ
//! contest logger:
//!
//! - **ATU**: the LZ1AQ antenna tuner's binary protocol. Frames start with a
//!   `FE FE` marker and carry confirmations or ADC telemetry.
//! - **CAT rigs**: pluggable radio protocols behind the [`RigPlugin`] trait.
//!   Kenwood (ASCII, `;` terminated) and Icom CI-V (framed binary) ship
//!   with the crate.
//!
//! # Architecture
//!
//! Everything here is transport-free. Encoders turn high level commands into
//! [`Transaction`]s. Decoders implement [`FrameCodec`] and are fed an
//! accumulated receive buffer, reporting how many bytes they consumed.
//! The serial engine that owns the port lives in `lz-engine`.
//!
//! # Example
//!
//! ```rust
//! use lz_protocol::atu::{decode_frame, AtuFrame};
//! use lz_protocol::Decoded;
//!
//! // A positive confirmation preceded by one garbage byte
//! let decoded = decode_frame(&[0x45, 0xFE, 0xFE, 0x01]);
//! assert_eq!(
//!     decoded,
//!     Decoded::Complete { consumed: 4, frame: AtuFrame::PositiveConfirmation }
//! );
//! ```

pub mod atu;
pub mod codec;
pub mod error;
pub mod rig;
pub mod transaction;

pub use codec::{Confirmation, Confirms, Decoded, FrameCodec};
pub use error::{ParseError, ProtocolError};
pub use rig::{
    FrequencyReport, ModeReport, PluginRegistry, RadioMode, RigCommand, RigDescriptor, RigPlugin,
    Vfo,
};
pub use transaction::Transaction;
