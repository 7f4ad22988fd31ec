//! Sequence executor
//!
//! A line-by-line program runner. Each line selects a movement family with
//! its own parameters, a cycle count, and a pause after the line. The
//! executor never touches the controllers directly: it returns typed
//! actions and the engine performs the transitions (stop previous
//! controller, position the carriage, start the next line).

use heapless::Vec;

use crate::config::hardware::MAX_SEQUENCE_LINES;
use crate::config::{ChaosRuntimeConfig, CyclePauseConfig, OscillationConfig, ZoneEffectConfig};
use crate::engine::CommandError;
use crate::state::MovementType;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One program line: movement type plus the union of per-mode parameters
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SequenceLine {
    pub id: u16,
    pub enabled: bool,
    pub movement_type: MovementType,

    // Back-and-forth parameters
    pub start_position_mm: f32,
    pub distance_mm: f32,
    pub speed_forward: f32,
    pub speed_backward: f32,
    pub vaet_zone_effect: ZoneEffectConfig,
    pub vaet_cycle_pause: CyclePauseConfig,

    // Oscillation parameters
    pub oscillation: OscillationConfig,

    // Chaos parameters
    pub chaos: ChaosRuntimeConfig,

    // Common
    pub cycle_count: u32,
    pub pause_after_ms: u32,
}

impl Default for SequenceLine {
    fn default() -> Self {
        Self {
            id: 0,
            enabled: true,
            movement_type: MovementType::Vaet,
            start_position_mm: 0.0,
            distance_mm: 100.0,
            speed_forward: 5.0,
            speed_backward: 5.0,
            vaet_zone_effect: ZoneEffectConfig::default(),
            vaet_cycle_pause: CyclePauseConfig::default(),
            oscillation: OscillationConfig {
                center_mm: 100.0,
                amplitude_mm: 50.0,
                enable_ramp_in: false,
                enable_ramp_out: false,
                ..Default::default()
            },
            chaos: ChaosRuntimeConfig {
                duration_s: 30,
                ..Default::default()
            },
            cycle_count: 1,
            pause_after_ms: 0,
        }
    }
}

impl SequenceLine {
    /// Carriage position required before this line may start.
    pub fn start_target_mm(&self) -> f32 {
        match self.movement_type {
            MovementType::Vaet => self.start_position_mm,
            MovementType::Oscillation => {
                self.oscillation.center_mm - self.oscillation.amplitude_mm
            }
            MovementType::Chaos => self.chaos.center_mm,
            // Pursuit and calibration are not sequenceable; position 0 keeps
            // a malformed program harmless.
            _ => 0.0,
        }
    }
}

/// Actions the executor asks the engine to perform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeqAction {
    /// Move the carriage to the line's start before delegating
    PositionTo { target_mm: f32 },
    /// Configure and start the controller for the given line
    StartLine { index: usize },
    /// Stop the current controller; the executor handles the post-line pause
    LineDone,
    /// Program finished (non-loop mode); context returns to standalone
    Finished,
}

/// Executor runtime state
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceExecutionState {
    pub is_running: bool,
    pub is_loop_mode: bool,
    pub current_line_index: usize,
    pub current_cycle_in_line: u32,
    pub is_waiting_pause: bool,
    pub pause_end_ms: u64,
    pub loop_count: u32,
}

/// The sequence program and its executor
#[derive(Debug, Default)]
pub struct SequenceExecutor {
    lines: Vec<SequenceLine, MAX_SEQUENCE_LINES>,
    state: SequenceExecutionState,
    next_line_id: u16,
}

impl SequenceExecutor {
    pub fn state(&self) -> &SequenceExecutionState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn lines(&self) -> &[SequenceLine] {
        &self.lines
    }

    pub fn current_line(&self) -> Option<&SequenceLine> {
        self.lines.get(self.state.current_line_index)
    }

    // ------------------------------------------------------------------
    // Program CRUD
    // ------------------------------------------------------------------

    /// Append a line, assigning it a fresh id. Fails when the fixed program
    /// capacity is exhausted.
    pub fn add_line(&mut self, mut line: SequenceLine) -> Result<u16, CommandError> {
        self.next_line_id += 1;
        line.id = self.next_line_id;
        let id = line.id;
        self.lines
            .push(line)
            .map_err(|_| CommandError::SequenceFull)?;
        Ok(id)
    }

    pub fn update_line(&mut self, index: usize, line: SequenceLine) -> Result<(), CommandError> {
        let slot = self
            .lines
            .get_mut(index)
            .ok_or(CommandError::LineOutOfRange)?;
        let id = slot.id;
        *slot = line;
        slot.id = id;
        Ok(())
    }

    pub fn delete_line(&mut self, index: usize) -> Result<(), CommandError> {
        if index >= self.lines.len() {
            return Err(CommandError::LineOutOfRange);
        }
        self.lines.remove(index);
        Ok(())
    }

    /// Move a line to a new position, shifting the lines in between.
    pub fn move_line(&mut self, from: usize, to: usize) -> Result<(), CommandError> {
        if from >= self.lines.len() || to >= self.lines.len() {
            return Err(CommandError::LineOutOfRange);
        }
        if from == to {
            return Ok(());
        }
        let line = self.lines.remove(from);
        // Capacity unchanged by the remove, the insert cannot fail.
        let _ = self.lines.insert(to, line);
        Ok(())
    }

    pub fn duplicate_line(&mut self, index: usize) -> Result<u16, CommandError> {
        let line = self
            .lines
            .get(index)
            .ok_or(CommandError::LineOutOfRange)?
            .clone();
        if self.lines.is_full() {
            return Err(CommandError::SequenceFull);
        }
        self.next_line_id += 1;
        let mut copy = line;
        copy.id = self.next_line_id;
        let id = copy.id;
        let _ = self.lines.insert(index + 1, copy);
        Ok(id)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Replace the whole program (import).
    pub fn import(&mut self, lines: &[SequenceLine]) -> Result<(), CommandError> {
        if lines.len() > MAX_SEQUENCE_LINES {
            return Err(CommandError::SequenceFull);
        }
        self.lines.clear();
        for line in lines {
            let _ = self.lines.push(line.clone());
            self.next_line_id = self.next_line_id.max(line.id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Start the program. Returns the positioning action for the first
    /// enabled line.
    pub fn start(&mut self, loop_mode: bool) -> Result<SeqAction, CommandError> {
        let first = self
            .first_enabled_from(0)
            .ok_or(CommandError::SequenceEmpty)?;

        self.state = SequenceExecutionState {
            is_running: true,
            is_loop_mode: loop_mode,
            current_line_index: first,
            ..Default::default()
        };

        Ok(SeqAction::PositionTo {
            target_mm: self.lines[first].start_target_mm(),
        })
    }

    pub fn stop(&mut self) {
        self.state.is_running = false;
        self.state.is_waiting_pause = false;
    }

    fn first_enabled_from(&self, start: usize) -> Option<usize> {
        self.lines
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, line)| line.enabled)
            .map(|(i, _)| i)
    }

    /// Positioning preamble finished: delegate to the line's controller.
    pub fn on_position_reached(&mut self) -> Option<SeqAction> {
        if !self.state.is_running {
            return None;
        }
        Some(SeqAction::StartLine {
            index: self.state.current_line_index,
        })
    }

    /// A movement cycle completed.
    ///
    /// `controller_stopped` is true when the completion also stopped the
    /// controller (chaos duration timeout), so another cycle needs a restart.
    pub fn on_movement_complete(
        &mut self,
        now_ms: u64,
        controller_stopped: bool,
    ) -> Option<SeqAction> {
        if !self.state.is_running || self.state.is_waiting_pause {
            return None;
        }

        self.state.current_cycle_in_line += 1;
        let line = self.lines.get(self.state.current_line_index)?;

        if self.state.current_cycle_in_line < line.cycle_count.max(1) {
            if controller_stopped {
                return Some(SeqAction::StartLine {
                    index: self.state.current_line_index,
                });
            }
            return None;
        }

        // Line complete: pause, then advance.
        self.state.is_waiting_pause = true;
        self.state.pause_end_ms = now_ms + line.pause_after_ms as u64;
        Some(SeqAction::LineDone)
    }

    /// Timer tick: advance past the inter-line pause.
    pub fn tick(&mut self, now_ms: u64) -> Option<SeqAction> {
        if !self.state.is_running || !self.state.is_waiting_pause {
            return None;
        }
        if now_ms < self.state.pause_end_ms {
            return None;
        }
        self.state.is_waiting_pause = false;
        self.advance_line()
    }

    /// Move to the next enabled line, looping or finishing at the end.
    fn advance_line(&mut self) -> Option<SeqAction> {
        self.state.current_cycle_in_line = 0;

        if let Some(next) = self.first_enabled_from(self.state.current_line_index + 1) {
            self.state.current_line_index = next;
            return Some(SeqAction::PositionTo {
                target_mm: self.lines[next].start_target_mm(),
            });
        }

        if self.state.is_loop_mode {
            self.state.loop_count += 1;
            if let Some(first) = self.first_enabled_from(0) {
                self.state.current_line_index = first;
                return Some(SeqAction::PositionTo {
                    target_mm: self.lines[first].start_target_mm(),
                });
            }
        }

        self.state.is_running = false;
        Some(SeqAction::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vaet_line(start_mm: f32, cycles: u32, pause_after_ms: u32) -> SequenceLine {
        SequenceLine {
            movement_type: MovementType::Vaet,
            start_position_mm: start_mm,
            cycle_count: cycles,
            pause_after_ms,
            ..Default::default()
        }
    }

    fn osc_line(center: f32, amplitude: f32, cycles: u32) -> SequenceLine {
        let mut line = SequenceLine {
            movement_type: MovementType::Oscillation,
            cycle_count: cycles,
            ..Default::default()
        };
        line.oscillation.center_mm = center;
        line.oscillation.amplitude_mm = amplitude;
        line
    }

    #[test]
    fn crud_round_trip() {
        let mut seq = SequenceExecutor::default();
        let id_a = seq.add_line(vaet_line(0.0, 3, 0)).unwrap();
        let id_b = seq.add_line(osc_line(100.0, 20.0, 5)).unwrap();
        assert_ne!(id_a, id_b);
        assert_eq!(seq.lines().len(), 2);

        // Update keeps the id.
        seq.update_line(0, vaet_line(10.0, 1, 0)).unwrap();
        assert_eq!(seq.lines()[0].id, id_a);
        assert!((seq.lines()[0].start_position_mm - 10.0).abs() < 1e-3);

        let id_c = seq.duplicate_line(1).unwrap();
        assert_eq!(seq.lines().len(), 3);
        assert_eq!(seq.lines()[2].id, id_c);

        seq.move_line(2, 0).unwrap();
        assert_eq!(seq.lines()[0].id, id_c);

        seq.delete_line(0).unwrap();
        assert_eq!(seq.lines().len(), 2);

        seq.clear();
        assert!(seq.lines().is_empty());
        assert_eq!(seq.delete_line(0), Err(CommandError::LineOutOfRange));
    }

    #[test]
    fn capacity_is_bounded() {
        let mut seq = SequenceExecutor::default();
        for _ in 0..MAX_SEQUENCE_LINES {
            seq.add_line(SequenceLine::default()).unwrap();
        }
        assert_eq!(
            seq.add_line(SequenceLine::default()),
            Err(CommandError::SequenceFull)
        );
    }

    #[test]
    fn empty_program_refuses_start() {
        let mut seq = SequenceExecutor::default();
        assert_eq!(seq.start(false), Err(CommandError::SequenceEmpty));

        // A program with only disabled lines is empty too.
        let mut line = SequenceLine::default();
        line.enabled = false;
        seq.add_line(line).unwrap();
        assert_eq!(seq.start(false), Err(CommandError::SequenceEmpty));
    }

    #[test]
    fn two_line_flow_with_pause() {
        let mut seq = SequenceExecutor::default();
        seq.add_line(vaet_line(0.0, 3, 500)).unwrap();
        seq.add_line(osc_line(100.0, 20.0, 5)).unwrap();

        // Start positions to line A's start.
        let action = seq.start(false).unwrap();
        assert_eq!(action, SeqAction::PositionTo { target_mm: 0.0 });
        assert_eq!(
            seq.on_position_reached(),
            Some(SeqAction::StartLine { index: 0 })
        );

        // A runs 3 cycles: the first two keep the controller going.
        assert_eq!(seq.on_movement_complete(1000, false), None);
        assert_eq!(seq.on_movement_complete(2000, false), None);
        assert_eq!(
            seq.on_movement_complete(3000, false),
            Some(SeqAction::LineDone)
        );

        // The 500 ms pause gates the advance.
        assert_eq!(seq.tick(3200), None);
        let action = seq.tick(3600).unwrap();
        // Line B positions to center − amplitude = 80 mm.
        assert_eq!(action, SeqAction::PositionTo { target_mm: 80.0 });
        assert_eq!(
            seq.on_position_reached(),
            Some(SeqAction::StartLine { index: 1 })
        );

        // B runs 5 cycles.
        for i in 0..4 {
            assert_eq!(seq.on_movement_complete(4000 + i, false), None);
        }
        assert_eq!(
            seq.on_movement_complete(5000, false),
            Some(SeqAction::LineDone)
        );

        // No pause on line B: next tick finishes the program.
        assert_eq!(seq.tick(5000), Some(SeqAction::Finished));
        assert!(!seq.is_running());
    }

    #[test]
    fn loop_mode_restarts_program() {
        let mut seq = SequenceExecutor::default();
        seq.add_line(vaet_line(5.0, 1, 0)).unwrap();

        seq.start(true).unwrap();
        seq.on_position_reached();
        assert_eq!(seq.on_movement_complete(100, false), Some(SeqAction::LineDone));

        let action = seq.tick(100).unwrap();
        assert_eq!(action, SeqAction::PositionTo { target_mm: 5.0 });
        assert_eq!(seq.state().loop_count, 1);
        assert!(seq.is_running());
    }

    #[test]
    fn stopped_controller_restarts_for_remaining_cycles() {
        let mut seq = SequenceExecutor::default();
        let mut line = SequenceLine {
            movement_type: MovementType::Chaos,
            cycle_count: 2,
            ..Default::default()
        };
        line.chaos.duration_s = 10;
        seq.add_line(line).unwrap();

        seq.start(false).unwrap();
        seq.on_position_reached();

        // Chaos timed out once: one cycle done, re-invoke the controller.
        assert_eq!(
            seq.on_movement_complete(10_000, true),
            Some(SeqAction::StartLine { index: 0 })
        );
        assert_eq!(
            seq.on_movement_complete(20_000, true),
            Some(SeqAction::LineDone)
        );
        assert_eq!(seq.tick(20_000), Some(SeqAction::Finished));
    }

    #[test]
    fn disabled_lines_are_skipped() {
        let mut seq = SequenceExecutor::default();
        seq.add_line(vaet_line(0.0, 1, 0)).unwrap();
        let mut disabled = vaet_line(50.0, 1, 0);
        disabled.enabled = false;
        seq.add_line(disabled).unwrap();
        seq.add_line(vaet_line(90.0, 1, 0)).unwrap();

        seq.start(false).unwrap();
        seq.on_position_reached();
        seq.on_movement_complete(100, false);

        // Advance skips the disabled middle line.
        let action = seq.tick(100).unwrap();
        assert_eq!(action, SeqAction::PositionTo { target_mm: 90.0 });
        assert_eq!(seq.state().current_line_index, 2);
    }
}
