//! Glissade socket protocol types
//!
//! Typed commands consumed by the motion engine and the telemetry envelope
//! broadcast back to clients. Framing (WebSocket/JSON transport, reconnects,
//! time sync plumbing) lives outside the core; this crate only fixes the
//! shapes both sides agree on. Unknown fields are ignored on decode so the
//! schema stays forward-compatible.

#![no_std]
#![deny(unsafe_code)]

pub mod command;
pub mod telemetry;

pub use command::{Command, CyclePauseTarget, SequenceCommand};
pub use telemetry::Telemetry;
