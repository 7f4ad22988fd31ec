//! System state machine and engine events

pub mod events;
pub mod machine;

pub use events::{EngineEvent, FaultKind};
pub use machine::{ExecutionContext, MovementType, SystemState};
