//! Real-time position pursuit
//!
//! Chases a stream of target positions from the command interface. The step
//! rate ramps down with the remaining error so arrivals are soft; there is
//! no cycle logic and no completion event.

use crate::config::hardware::MAX_SPEED_LEVEL;
use crate::engine::{CommandError, Hardware, Shared};
use crate::motion::math::{mm_to_steps, pursuit_step_delay, steps_to_mm};
use crate::state::{EngineEvent, FaultKind, SystemState};
use crate::supervision;
use crate::traits::{Clock, ContactProbe, StepPulser};

/// Pursuit runtime state
#[derive(Debug, Clone, Copy)]
pub struct PursuitState {
    pub target_step: i32,
    pub last_target_step: i32,
    pub max_speed_level: f32,
    pub step_delay_us: u32,
    pub is_moving: bool,
    pub direction_forward: bool,
}

impl Default for PursuitState {
    fn default() -> Self {
        Self {
            target_step: 0,
            last_target_step: 0,
            max_speed_level: 10.0,
            step_delay_us: 1000,
            is_moving: false,
            direction_forward: true,
        }
    }
}

/// Pursuit controller
#[derive(Debug, Default)]
pub struct PursuitController {
    state: PursuitState,
    last_step_us: u64,
}

impl PursuitController {
    pub fn is_moving(&self) -> bool {
        self.state.is_moving
    }

    pub fn at_target(&self, shared: &Shared) -> bool {
        shared.current_step == self.state.target_step
    }

    pub fn target_step(&self) -> i32 {
        self.state.target_step
    }

    /// Update the pursuit target. Clamped to the usable travel; the speed
    /// ceiling is clamped to the platform maximum.
    pub fn set_target(
        &mut self,
        shared: &mut Shared,
        target_mm: f32,
        max_speed_level: f32,
    ) -> Result<(), CommandError> {
        if !shared.config.is_calibrated() {
            return Err(CommandError::NotCalibrated);
        }
        if shared.config.state.is_error() {
            return Err(CommandError::SystemInError);
        }

        let clamped_mm = target_mm.clamp(0.0, shared.config.effective_max_distance_mm());
        self.state.last_target_step = self.state.target_step;
        self.state.target_step = mm_to_steps(clamped_mm)
            .clamp(shared.config.min_step, shared.config.max_step);
        self.state.max_speed_level = max_speed_level.clamp(0.0, MAX_SPEED_LEVEL);
        self.state.is_moving = true;
        Ok(())
    }

    pub fn on_stop(&mut self) {
        self.state.is_moving = false;
    }

    pub fn process<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
    ) -> Option<EngineEvent> {
        if shared.config.state != SystemState::Running {
            return None;
        }

        let error_steps = self.state.target_step - shared.current_step;
        if error_steps == 0 {
            self.state.is_moving = false;
            return None;
        }
        self.state.is_moving = true;

        let error_mm = steps_to_mm(error_steps.abs());
        self.state.step_delay_us = pursuit_step_delay(error_mm, self.state.max_speed_level);

        let now_us = hw.clock.now_us();
        if now_us.wrapping_sub(self.last_step_us) < self.state.step_delay_us as u64 {
            return None;
        }
        self.last_step_us = now_us;

        let forward = error_steps > 0;
        self.state.direction_forward = forward;
        let position_mm = steps_to_mm(shared.current_step);

        if forward {
            if supervision::soft_drift_end(shared.current_step, shared.config.max_step) {
                return None;
            }
            if supervision::hard_drift_end(
                &mut hw.contacts,
                position_mm,
                shared.config.total_distance_mm,
            ) {
                shared.config.state = SystemState::Error;
                return Some(EngineEvent::SafetyFault(FaultKind::HardDriftEnd));
            }
        } else {
            if supervision::soft_drift_start(shared.current_step, shared.config.min_step) {
                return None;
            }
            if supervision::hard_drift_start(&mut hw.contacts, position_mm) {
                shared.config.state = SystemState::Error;
                return Some(EngineEvent::SafetyFault(FaultKind::HardDriftStart));
            }
        }

        hw.motor.set_direction(forward);
        hw.motor.step();
        shared.current_step += if forward { 1 } else { -1 };
        shared.stats.track_delta(shared.current_step);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testkit::FakeHardware;

    fn calibrated_shared(total_mm: f32) -> Shared {
        let mut shared = Shared::default();
        shared.config.total_distance_mm = total_mm;
        shared.config.limit_percent = 100.0;
        shared.config.max_step = mm_to_steps(total_mm);
        shared.config.state = SystemState::Running;
        shared
    }

    #[test]
    fn reaches_target_and_settles() {
        let mut hw = FakeHardware::with_travel(16_000, 0);
        let mut shared = calibrated_shared(200.0);
        let mut pursuit = PursuitController::default();

        pursuit.set_target(&mut shared, 50.0, 10.0).unwrap();
        assert!(pursuit.is_moving());

        for _ in 0..400_000 {
            hw.advance_us(60);
            pursuit.process(&mut hw, &mut shared);
            if pursuit.at_target(&shared) {
                break;
            }
        }

        assert_eq!(shared.current_step, mm_to_steps(50.0));
        // One more tick clears the moving flag.
        hw.advance_us(60);
        pursuit.process(&mut hw, &mut shared);
        assert!(!pursuit.is_moving());
    }

    #[test]
    fn target_clamps_to_effective_travel() {
        let mut shared = calibrated_shared(200.0);
        shared.config.limit_percent = 95.0;
        let mut pursuit = PursuitController::default();

        pursuit.set_target(&mut shared, 500.0, 10.0).unwrap();
        assert_eq!(pursuit.target_step(), mm_to_steps(190.0));
    }

    #[test]
    fn approach_slows_near_target() {
        let mut hw = FakeHardware::with_travel(16_000, 0);
        let mut shared = calibrated_shared(200.0);
        let mut pursuit = PursuitController::default();

        pursuit.set_target(&mut shared, 50.0, 10.0).unwrap();

        // Sample the computed delay far from and close to the target.
        hw.advance_us(60);
        pursuit.process(&mut hw, &mut shared);
        let fast_delay = pursuit.state.step_delay_us;

        shared.current_step = mm_to_steps(50.0) - 20; // 0.25 mm away
        hw.advance_us(60);
        pursuit.process(&mut hw, &mut shared);
        let slow_delay = pursuit.state.step_delay_us;

        assert!(slow_delay > fast_delay);
    }

    #[test]
    fn retarget_mid_flight_reverses() {
        let mut hw = FakeHardware::with_travel(16_000, 0);
        let mut shared = calibrated_shared(200.0);
        let mut pursuit = PursuitController::default();

        pursuit.set_target(&mut shared, 100.0, 15.0).unwrap();
        for _ in 0..50_000 {
            hw.advance_us(60);
            pursuit.process(&mut hw, &mut shared);
        }
        let mid = shared.current_step;
        assert!(mid > 0);

        pursuit.set_target(&mut shared, 0.0, 15.0).unwrap();
        for _ in 0..50_000 {
            hw.advance_us(60);
            pursuit.process(&mut hw, &mut shared);
        }
        assert!(shared.current_step < mid);
    }

    #[test]
    fn requires_calibration() {
        let mut shared = Shared::default();
        let mut pursuit = PursuitController::default();
        assert_eq!(
            pursuit.set_target(&mut shared, 10.0, 5.0),
            Err(CommandError::NotCalibrated)
        );
    }
}
