//! LZ Serial Engine
//!
//! Drives the two serial devices of the LZ1AQ contest logger, a transceiver
//! and an antenna tuner, over half-duplex links.
//!
//! # Architecture
//!
//! Each device gets its own [`Engine`]:
//!
//! - a bounded [`CommandQueue`] that never blocks producers
//! - a [`Writer`] task delivering one [`Transaction`](lz_protocol::Transaction)
//!   at a time with retry, timeout and confirmation semantics
//! - a reader task feeding a [`ReceiveAssembler`] and handing decoded
//!   events to the [`EventDispatcher`]
//! - a [`ConfirmationGate`] connecting reader and writer
//!
//! [`Radio`] and [`Tuner`] wrap an engine with the device's command set.
//! Both accept any `AsyncRead + AsyncWrite` stream, so tests and the
//! simulator use `tokio::io::duplex` in place of a serial port.

pub mod adapter;
pub mod assembler;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod queue;
pub mod radio;
pub mod transport;
pub mod tuner;
pub mod writer;

pub use adapter::{DescriptorAdapter, StandardAdapter};
pub use assembler::ReceiveAssembler;
pub use config::{
    EngineOptions, FlowControl, Parity, RadioConfig, SerialSettings, StopBits, TunerConfig,
};
pub use dispatcher::{DeviceListener, EventDispatcher, ListenerId};
pub use engine::Engine;
pub use error::EngineError;
pub use events::RadioEvent;
pub use gate::{ConfirmationGate, GateState, WaitOutcome};
pub use queue::CommandQueue;
pub use radio::{CatCodec, Radio};
pub use tuner::{Tuner, TunerState};
pub use writer::Writer;
