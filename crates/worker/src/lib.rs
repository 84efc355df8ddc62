//! Worker process supervision and the line-framed JSON protocol crossing its
//! standard streams.
//!
//! The worker is an external executable holding all decision logic. It
//! receives one JSON frame per line on stdin and answers with command frames
//! (or free-text diagnostics) on stdout; stderr is logged, never parsed.

pub mod error;
pub mod frames;
pub mod process;

pub use {
    error::{Error, Result},
    frames::{InboundLine, OutboundFrame, WorkerCommand, classify},
    process::{WorkerConfig, WorkerEvent, WorkerSupervisor},
};
