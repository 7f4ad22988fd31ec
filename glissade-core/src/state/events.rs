//! Events returned by controllers to the supervisor
//!
//! Controllers never call into each other or into the platform; they return
//! typed events from `process()` and the engine dispatches them (sequencer
//! advancement, telemetry, persistence triggers).

/// Safety fault kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Start-side limit contact fired during motion
    HardDriftStart,
    /// End-side limit contact fired during motion
    HardDriftEnd,
    /// Calibration watchdog expired without finding a contact
    CalibrationTimeout,
}

/// Events emitted by the engine's per-tick processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineEvent {
    /// One movement cycle finished (back-and-forth pivot, oscillation period,
    /// chaos duration). Drives sequencer line accounting.
    MovementComplete,
    /// Travel discovery finished; total travel published
    CalibrationFinished { total_steps: i32 },
    /// Oscillation reached its configured cycle count and wound down
    OscillationFinished,
    /// Chaos hit its duration timeout
    ChaosFinished,
    /// Sequence program ran to completion (non-loop mode)
    SequenceFinished,
    /// A safety fault halted step emission
    SafetyFault(FaultKind),
    /// Accumulated stats should be persisted by the service core
    PersistStats,
}

impl EngineEvent {
    /// Events that end the current movement for sequencer accounting
    pub fn completes_movement(&self) -> bool {
        matches!(
            self,
            EngineEvent::MovementComplete
                | EngineEvent::OscillationFinished
                | EngineEvent::ChaosFinished
        )
    }
}
