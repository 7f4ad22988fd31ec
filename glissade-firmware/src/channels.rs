//! Inter-core communication channels
//!
//! The service core enqueues decoded commands; the motion core drains them
//! between ticks and publishes status snapshots and engine events back.
//! Channel capacity bounds the service core's burstiness; the motion loop
//! never blocks on any of these.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use glissade_core::config::hardware::MAX_SEQUENCE_LINES;
use glissade_core::sequence::SequenceLine;
use glissade_core::state::EngineEvent;
use glissade_core::status::StatusSnapshot;
use glissade_protocol::Command;

/// Command backlog from the service core
const COMMAND_CHANNEL_SIZE: usize = 8;

/// Engine events awaiting service-core fan-out (persistence, notifications)
const EVENT_CHANNEL_SIZE: usize = 8;

/// Decoded commands for the motion engine
pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, Command, COMMAND_CHANNEL_SIZE> =
    Channel::new();

/// Engine events for the service core
pub static EVENT_CHANNEL: Channel<CriticalSectionRawMutex, EngineEvent, EVENT_CHANNEL_SIZE> =
    Channel::new();

/// Latest status snapshot (periodic and on GET_STATUS)
pub static STATUS_SIGNAL: Signal<CriticalSectionRawMutex, StatusSnapshot> = Signal::new();

/// Sequence program export, produced on a SEQ export command
pub static SEQUENCE_EXPORT: Signal<
    CriticalSectionRawMutex,
    heapless::Vec<SequenceLine, MAX_SEQUENCE_LINES>,
> = Signal::new();

/// Wall-clock epoch offset from SYNC_TIME, for the persistence layer
pub static EPOCH_OFFSET_MS: Signal<CriticalSectionRawMutex, u64> = Signal::new();
