//! Travel discovery and precise return-to-zero
//!
//! Drives the axis to the start contact, backs off until the contact
//! releases, advances a fixed safety offset (that point is position 0), then
//! repeats the procedure against the end contact to measure total travel,
//! and finally homes back to zero. Return-to-start reuses the same contact +
//! decontact + offset protocol so position 0 is bit-identical to calibration
//! zero regardless of accumulated drift.
//!
//! The state machine advances one step per `process()` call; a watchdog step
//! budget per phase guards against a missing or broken contact.

use crate::config::hardware::{
    CALIBRATION_SPEED_LEVEL, CALIBRATION_WATCHDOG_STEPS, CONTACT_SAMPLE_DELAY_US,
    DECONTACT_SPEED_LEVEL, END_CONTACT_CHECKS, SAFETY_OFFSET_STEPS, START_CONTACT_CHECKS,
};
use crate::engine::{Hardware, Shared};
use crate::motion::math::{chaos_step_delay, steps_to_mm};
use crate::state::{EngineEvent, FaultKind, SystemState};
use crate::traits::{Clock, ContactProbe, StepPulser};

/// Homing phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationPhase {
    #[default]
    Idle,
    /// Approaching the start contact (backward)
    MovingToStart,
    /// Backing off the start contact until release, then the safety offset
    LeavingStart,
    /// Approaching the end contact (forward)
    MovingToEnd,
    /// Backing off the end contact until release, then the safety offset
    LeavingEnd,
    Finished,
    Failed,
}

/// Calibration / homing controller
#[derive(Debug, Default)]
pub struct CalibrationManager {
    phase: CalibrationPhase,
    /// Full travel discovery (true) or return-to-start only (false)
    full: bool,
    /// Steps emitted in the current phase, for the watchdog
    steps_in_phase: u32,
    /// Steps still to go in the post-release safety offset
    offset_remaining: i32,
    /// Contact has released during the leaving phase
    contact_released: bool,
    last_step_us: u64,
}

impl CalibrationManager {
    /// Begin full travel discovery.
    pub fn start_full<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
    ) {
        hw.motor.enable();
        shared.config.state = SystemState::Calibrating;
        self.full = true;
        self.enter_phase(CalibrationPhase::MovingToStart);
    }

    /// Begin a return-to-start. Recovers from the error state.
    pub fn start_return_to_start<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
    ) {
        hw.motor.enable();
        shared.config.state = SystemState::Calibrating;
        self.full = false;
        self.enter_phase(CalibrationPhase::MovingToStart);
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        !matches!(
            self.phase,
            CalibrationPhase::Idle | CalibrationPhase::Finished | CalibrationPhase::Failed
        )
    }

    fn enter_phase(&mut self, phase: CalibrationPhase) {
        self.phase = phase;
        self.steps_in_phase = 0;
        self.offset_remaining = 0;
        self.contact_released = false;
        self.last_step_us = 0;
    }

    /// Advance the homing state machine by at most one step.
    pub fn process<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
    ) -> Option<EngineEvent> {
        if !self.is_active() {
            return None;
        }
        if shared.config.state != SystemState::Calibrating {
            return None;
        }

        let now_us = hw.clock.now_us();
        let delay = match self.phase {
            CalibrationPhase::MovingToStart | CalibrationPhase::MovingToEnd => {
                chaos_step_delay(CALIBRATION_SPEED_LEVEL)
            }
            _ => chaos_step_delay(DECONTACT_SPEED_LEVEL),
        };
        if now_us.wrapping_sub(self.last_step_us) < delay as u64 {
            return None;
        }
        self.last_step_us = now_us;

        match self.phase {
            CalibrationPhase::MovingToStart => self.seek(hw, shared, false),
            CalibrationPhase::LeavingStart => self.leave_start(hw, shared),
            CalibrationPhase::MovingToEnd => self.seek(hw, shared, true),
            CalibrationPhase::LeavingEnd => self.leave_end(hw, shared),
            _ => None,
        }
    }

    /// Approach a contact, one step per call.
    fn seek<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
        forward: bool,
    ) -> Option<EngineEvent> {
        let pressed = if forward {
            hw.contacts
                .is_end_active(END_CONTACT_CHECKS, CONTACT_SAMPLE_DELAY_US)
        } else {
            hw.contacts
                .is_start_active(START_CONTACT_CHECKS, CONTACT_SAMPLE_DELAY_US)
        };

        if pressed {
            let next = if forward {
                CalibrationPhase::LeavingEnd
            } else {
                CalibrationPhase::LeavingStart
            };
            self.enter_phase(next);
            return None;
        }

        if let Some(event) = self.watchdog(shared) {
            return Some(event);
        }

        hw.motor.set_direction(forward);
        hw.motor.step();
        shared.current_step += if forward { 1 } else { -1 };
        self.steps_in_phase += 1;
        None
    }

    /// Back off the start contact, then advance the safety offset forward.
    /// The offset endpoint defines position 0.
    fn leave_start<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
    ) -> Option<EngineEvent> {
        if !self.contact_released {
            if !hw
                .contacts
                .is_start_active(START_CONTACT_CHECKS, CONTACT_SAMPLE_DELAY_US)
            {
                self.contact_released = true;
                self.offset_remaining = SAFETY_OFFSET_STEPS;
            }
        }

        if self.contact_released && self.offset_remaining == 0 {
            // This point is calibration zero.
            shared.current_step = 0;
            shared.config.min_step = 0;
            shared.stats.sync_position(0);

            if self.full {
                self.enter_phase(CalibrationPhase::MovingToEnd);
                return None;
            }

            self.phase = CalibrationPhase::Finished;
            shared.config.state = SystemState::Ready;
            return Some(EngineEvent::CalibrationFinished {
                total_steps: shared.config.max_step,
            });
        }

        if let Some(event) = self.watchdog(shared) {
            return Some(event);
        }

        hw.motor.set_direction(true);
        hw.motor.step();
        shared.current_step += 1;
        self.steps_in_phase += 1;
        if self.contact_released {
            self.offset_remaining -= 1;
        }
        None
    }

    /// Back off the end contact, then the safety offset backward. The offset
    /// endpoint defines the total travel.
    fn leave_end<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
    ) -> Option<EngineEvent> {
        if !self.contact_released {
            if !hw
                .contacts
                .is_end_active(END_CONTACT_CHECKS, CONTACT_SAMPLE_DELAY_US)
            {
                self.contact_released = true;
                self.offset_remaining = SAFETY_OFFSET_STEPS;
            }
        }

        if self.contact_released && self.offset_remaining == 0 {
            let total_steps = shared.current_step;
            shared.config.max_step = total_steps;
            shared.config.total_distance_mm = steps_to_mm(total_steps);
            // Finish the discovery by homing back to zero; the completion
            // event fires when the carriage is parked at position 0.
            self.full = false;
            self.enter_phase(CalibrationPhase::MovingToStart);
            return None;
        }

        if let Some(event) = self.watchdog(shared) {
            return Some(event);
        }

        hw.motor.set_direction(false);
        hw.motor.step();
        shared.current_step -= 1;
        self.steps_in_phase += 1;
        if self.contact_released {
            self.offset_remaining -= 1;
        }
        None
    }

    /// Per-phase step budget. Expiring means a contact was never found.
    fn watchdog(&mut self, shared: &mut Shared) -> Option<EngineEvent> {
        if self.steps_in_phase < CALIBRATION_WATCHDOG_STEPS {
            return None;
        }
        self.phase = CalibrationPhase::Failed;
        shared.config.state = SystemState::Error;
        Some(EngineEvent::SafetyFault(FaultKind::CalibrationTimeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testkit::{run_until, FakeHardware};

    #[test]
    fn full_calibration_discovers_travel() {
        // Axis simulated at 4000 steps of physical travel, starting mid-way.
        let mut hw = FakeHardware::with_travel(4000, 1500);
        let mut shared = Shared::default();
        let mut cal = CalibrationManager::default();

        cal.start_full(&mut hw, &mut shared);
        assert_eq!(shared.config.state, SystemState::Calibrating);

        let event = run_until(400_000, || {
            hw.advance_us(400);
            cal.process(&mut hw, &mut shared)
        });
        match event {
            Some(EngineEvent::CalibrationFinished { total_steps }) => {
                // Total travel is the physical span minus both safety offsets.
                assert_eq!(total_steps, 4000 - 2 * SAFETY_OFFSET_STEPS);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(shared.config.state, SystemState::Ready);
        assert_eq!(shared.config.min_step, 0);
        assert_eq!(shared.config.max_step, 4000 - 2 * SAFETY_OFFSET_STEPS);
        assert!(shared.config.is_calibrated());
        // The discovery ends parked at position 0.
        assert_eq!(shared.current_step, 0);
        assert_eq!(hw.physical_step(), SAFETY_OFFSET_STEPS);
    }

    #[test]
    fn return_to_start_rezeros() {
        let mut hw = FakeHardware::with_travel(4000, 1500);
        let mut shared = Shared::default();
        let mut cal = CalibrationManager::default();

        cal.start_full(&mut hw, &mut shared);
        run_until(400_000, || {
            hw.advance_us(400);
            cal.process(&mut hw, &mut shared)
        });

        // Inject drift: logical position no longer matches physical.
        shared.current_step += 37;

        cal.start_return_to_start(&mut hw, &mut shared);
        let event = run_until(400_000, || {
            hw.advance_us(400);
            cal.process(&mut hw, &mut shared)
        });
        assert!(matches!(
            event,
            Some(EngineEvent::CalibrationFinished { .. })
        ));
        assert_eq!(shared.current_step, 0);
        // Physical position equals the safety offset above the start contact.
        assert_eq!(hw.physical_step(), SAFETY_OFFSET_STEPS);
        assert_eq!(shared.config.state, SystemState::Ready);
    }

    #[test]
    fn watchdog_fails_without_contact() {
        // No contacts anywhere: travel so long the watchdog expires first.
        let mut hw = FakeHardware::with_travel(10_000_000, 5_000_000);
        let mut shared = Shared::default();
        let mut cal = CalibrationManager::default();

        cal.start_full(&mut hw, &mut shared);
        let event = run_until(CALIBRATION_WATCHDOG_STEPS as usize + 10, || {
            hw.advance_us(400);
            cal.process(&mut hw, &mut shared)
        });

        assert_eq!(
            event,
            Some(EngineEvent::SafetyFault(FaultKind::CalibrationTimeout))
        );
        assert_eq!(cal.phase(), CalibrationPhase::Failed);
        assert_eq!(shared.config.state, SystemState::Error);
    }
}
