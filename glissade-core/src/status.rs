//! Status snapshot
//!
//! Assembled by the engine under the motion mutex and handed to the service
//! core for broadcast. Values are per-field fresh within one snapshot; no
//! stronger consistency is promised.

use crate::config::MotionConfig;
use crate::motion::patterns::ChaosPattern;
use crate::state::{ExecutionContext, MovementType, SystemState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Oscillation summary
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OscillationStatus {
    pub completed_cycles: u32,
    pub is_ramping_in: bool,
    pub is_ramping_out: bool,
    pub is_pausing: bool,
}

/// Chaos summary
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChaosStatus {
    pub current_pattern: Option<ChaosPattern>,
    pub patterns_executed: u32,
    pub min_reached_mm: f32,
    pub max_reached_mm: f32,
}

/// Sequence summary
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SequenceStatus {
    pub is_running: bool,
    pub is_loop_mode: bool,
    pub current_line_index: usize,
    pub loop_count: u32,
}

/// Full engine status snapshot
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusSnapshot {
    pub system_state: SystemState,
    pub movement_type: MovementType,
    pub execution_context: ExecutionContext,
    pub current_position_mm: f32,
    pub current_step: i32,
    pub total_distance_mm: f32,
    pub effective_max_distance_mm: f32,
    pub motion: MotionConfig,
    pub oscillation: OscillationStatus,
    pub chaos: ChaosStatus,
    pub sequence: SequenceStatus,
    /// Cumulative travel this session, in steps
    pub stats_total_steps: u32,
}
