//! System state definition
//!
//! Step emission is a function of the current state: only `Running` permits
//! controller steps, with calibration driving its own moves while
//! `Calibrating`. `Error` is sticky until an explicit return-to-start or
//! recalibration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Global system state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SystemState {
    /// Power-on initialization, hardware checks
    #[default]
    Init,
    /// Travel discovery or return-to-start in progress
    Calibrating,
    /// Calibrated and idle
    Ready,
    /// A controller is authorized to emit steps
    Running,
    /// User pause; motor holds position
    Paused,
    /// Safety fault; sticky until homing recovers
    Error,
}

impl SystemState {
    /// Check if a movement controller may emit steps in this state
    pub fn may_emit_steps(&self) -> bool {
        matches!(self, SystemState::Running)
    }

    /// Check if this is the sticky error state
    pub fn is_error(&self) -> bool {
        matches!(self, SystemState::Error)
    }

    /// Check if a movement start command is acceptable
    pub fn accepts_start(&self) -> bool {
        matches!(
            self,
            SystemState::Ready | SystemState::Paused | SystemState::Running
        )
    }
}

/// Active movement family. At most one is active; the engine dispatches each
/// tick to the corresponding controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MovementType {
    /// Back-and-forth traversal ("va-et-vient")
    #[default]
    Vaet,
    /// Continuous waveform oscillation
    Oscillation,
    /// Pseudo-random pattern scheduler
    Chaos,
    /// Real-time target pursuit
    Pursuit,
    /// Homing / travel discovery
    Calibration,
}

/// Who drives the controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExecutionContext {
    /// Manual execution from the UI
    #[default]
    Standalone,
    /// Automatic execution from the sequence executor
    Sequencer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_emits_steps() {
        assert!(SystemState::Running.may_emit_steps());
        for state in [
            SystemState::Init,
            SystemState::Calibrating,
            SystemState::Ready,
            SystemState::Paused,
            SystemState::Error,
        ] {
            assert!(!state.may_emit_steps());
        }
    }

    #[test]
    fn error_is_sticky_for_start() {
        assert!(!SystemState::Error.accepts_start());
        assert!(!SystemState::Init.accepts_start());
        assert!(SystemState::Ready.accepts_start());
        assert!(SystemState::Paused.accepts_start());
        assert!(SystemState::Running.accepts_start());
    }
}
