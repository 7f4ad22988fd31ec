//! Continuous waveform oscillation controller
//!
//! Authors a target position from an accumulated phase and drives the
//! carriage toward it every tick. Phase accumulation (rather than absolute
//! time) keeps the waveform continuous across frequency changes; frequency,
//! center and amplitude each have an independent linear transition so live
//! edits never jerk the carriage.

use libm::{fabsf, floorf};

use crate::config::{CyclePauseConfig, CyclePauseState, OscillationConfig};
use crate::engine::{CommandError, Hardware, Shared};
use crate::motion::math::{effective_frequency, mm_to_steps, steps_to_mm, waveform_value};
use crate::state::{EngineEvent, FaultKind, SystemState};
use crate::supervision;
use crate::traits::{Clock, ContactProbe, StepPulser};

/// Duration of frequency/center/amplitude transitions (ms)
const TRANSITION_DURATION_MS: f32 = 2000.0;

/// Tolerance for the initial positioning approach (steps)
const POSITIONING_TOLERANCE_STEPS: i32 = 2;

/// Step cadence for the initial positioning approach (µs)
const POSITIONING_STEP_DELAY_US: u64 = 150;

/// Bounded catch-up when the carriage falls behind the waveform
const CATCH_UP_MAX_STEPS: i32 = 6;

/// Minimum interval between repeated throttled warnings (ms)
const WARN_THROTTLE_MS: u64 = 1000;

/// One linear parameter transition (frequency, center or amplitude)
#[derive(Debug, Clone, Copy, Default)]
struct Transition {
    active: bool,
    start_ms: u64,
    old: f32,
    target: f32,
}

impl Transition {
    fn begin(&mut self, now_ms: u64, old: f32, target: f32) {
        self.active = true;
        self.start_ms = now_ms;
        self.old = old;
        self.target = target;
    }

    /// Interpolated value at `now_ms`; deactivates itself on completion.
    fn value(&mut self, now_ms: u64) -> f32 {
        if !self.active {
            return self.target;
        }
        let elapsed = now_ms.wrapping_sub(self.start_ms) as f32;
        if elapsed >= TRANSITION_DURATION_MS {
            self.active = false;
            return self.target;
        }
        self.old + (self.target - self.old) * (elapsed / TRANSITION_DURATION_MS)
    }
}

/// Oscillation runtime state, reset on every start
#[derive(Debug, Clone, Copy, Default)]
struct OscillationState {
    start_ms: u64,
    ramp_start_ms: u64,
    completed_cycles: u32,
    is_ramping_in: bool,
    is_ramping_out: bool,
    is_returning: bool,
    is_initial_positioning: bool,
    /// Monotonically growing phase in cycles
    accumulated_phase: f32,
    last_phase_update_ms: u64,
    /// Previous phase value, for integer-crossing cycle detection
    last_phase: f32,
    frequency: Transition,
    center: Transition,
    amplitude: Transition,
}

/// Oscillation controller
#[derive(Debug, Default)]
pub struct OscillationController {
    /// Controller selected and started; cleared by a supervisor stop
    active: bool,
    /// Staged configuration; read at `start()`, transitioned into while live
    pub config: OscillationConfig,
    state: OscillationState,
    pause_state: CyclePauseState,
    last_step_us: u64,
    last_cap_warn_ms: u64,
    last_catchup_warn_ms: u64,
}

impl OscillationController {
    pub fn completed_cycles(&self) -> u32 {
        self.state.completed_cycles
    }

    pub fn is_ramping_in(&self) -> bool {
        self.state.is_ramping_in
    }

    pub fn is_ramping_out(&self) -> bool {
        self.state.is_ramping_out
    }

    pub fn is_pausing(&self) -> bool {
        self.pause_state.is_pausing
    }

    pub fn is_positioning(&self) -> bool {
        self.state.is_initial_positioning
    }

    /// Reject a center/amplitude pair that leaves the usable travel.
    pub fn validate_amplitude(
        center_mm: f32,
        amplitude_mm: f32,
        shared: &Shared,
    ) -> Result<(), CommandError> {
        if amplitude_mm < 0.0
            || center_mm - amplitude_mm < 0.0
            || center_mm + amplitude_mm > shared.config.effective_max_distance_mm()
        {
            return Err(CommandError::AmplitudeOutOfRange);
        }
        Ok(())
    }

    /// Stage a new configuration.
    ///
    /// While oscillation is live, frequency, center and amplitude changes
    /// become independent transitions rebased from the current interpolated
    /// values; everything else applies directly.
    pub fn set_config(
        &mut self,
        shared: &Shared,
        new: OscillationConfig,
        now_ms: u64,
        live: bool,
    ) -> Result<(), CommandError> {
        Self::validate_amplitude(new.center_mm, new.amplitude_mm, shared)?;

        if live {
            if fabsf(new.frequency_hz - self.config.frequency_hz) > f32::EPSILON {
                let current = self.state.frequency.value(now_ms);
                self.state.frequency.begin(now_ms, current, new.frequency_hz);
            }
            if fabsf(new.center_mm - self.config.center_mm) > f32::EPSILON {
                let current = self.state.center.value(now_ms);
                self.state.center.begin(now_ms, current, new.center_mm);
            }
            if fabsf(new.amplitude_mm - self.config.amplitude_mm) > f32::EPSILON {
                let current = self.state.amplitude.value(now_ms);
                self.state.amplitude.begin(now_ms, current, new.amplitude_mm);
            }
        }

        self.config = new;
        if !live {
            self.state.frequency = Transition {
                target: self.config.frequency_hz,
                ..Default::default()
            };
            self.state.center = Transition {
                target: self.config.center_mm,
                ..Default::default()
            };
            self.state.amplitude = Transition {
                target: self.config.amplitude_mm,
                ..Default::default()
            };
        }
        Ok(())
    }

    /// Replace the inter-cycle pause configuration.
    pub fn set_cycle_pause(&mut self, config: CyclePauseConfig) {
        self.config.cycle_pause = config;
        if !config.enabled {
            self.pause_state.is_pausing = false;
        }
    }

    /// Start oscillating with the staged configuration.
    pub fn start<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
    ) -> Result<(), CommandError> {
        if !shared.config.is_calibrated() {
            return Err(CommandError::NotCalibrated);
        }
        if shared.config.state.is_error() {
            return Err(CommandError::SystemInError);
        }
        Self::validate_amplitude(self.config.center_mm, self.config.amplitude_mm, shared)?;

        self.state = OscillationState {
            is_initial_positioning: true,
            frequency: Transition {
                target: self.config.frequency_hz,
                ..Default::default()
            },
            center: Transition {
                target: self.config.center_mm,
                ..Default::default()
            },
            amplitude: Transition {
                target: self.config.amplitude_mm,
                ..Default::default()
            },
            ..Default::default()
        };
        self.pause_state = CyclePauseState::default();
        self.last_step_us = 0;
        self.active = true;

        hw.motor.enable();
        shared.stats.sync_position(shared.current_step);
        shared.config.state = SystemState::Running;
        Ok(())
    }

    /// Freeze the phase clock (user pause resume) to avoid a jerk.
    pub fn freeze_phase(&mut self, now_ms: u64) {
        self.state.last_phase_update_ms = now_ms;
    }

    pub fn on_stop(&mut self) {
        self.active = false;
        self.pause_state.is_pausing = false;
        self.state.is_returning = false;
        self.state.is_ramping_out = false;
    }

    // ------------------------------------------------------------------
    // Per-tick processing
    // ------------------------------------------------------------------

    pub fn process<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
    ) -> Option<EngineEvent> {
        if !self.active || shared.config.state != SystemState::Running {
            return None;
        }

        let now_ms = hw.clock.now_ms();
        let now_us = hw.clock.now_us();

        if self.state.is_initial_positioning {
            return self.run_positioning(hw, shared, now_ms, now_us);
        }

        if self.pause_state.is_pausing {
            if now_ms.wrapping_sub(self.pause_state.start_ms) >= self.pause_state.duration_ms {
                self.pause_state.is_pausing = false;
                // Phase stood still during the pause.
                self.state.last_phase_update_ms = now_ms;
            }
            return None;
        }

        if self.state.is_returning {
            return self.run_return(hw, shared, now_us);
        }

        // Effective parameters for this tick.
        let eff_amplitude = self.effective_amplitude(now_ms);
        let eff_center = self.state.center.value(now_ms);

        // Phase advance with the capped instantaneous frequency.
        let requested_hz = self.state.frequency.value(now_ms);
        let hz = effective_frequency(requested_hz, eff_amplitude);
        if hz < requested_hz && now_ms.wrapping_sub(self.last_cap_warn_ms) >= WARN_THROTTLE_MS {
            self.last_cap_warn_ms = now_ms;
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "oscillation frequency capped to {} Hz by speed limit",
                hz
            );
        }

        let delta_ms = now_ms.wrapping_sub(self.state.last_phase_update_ms);
        self.state.accumulated_phase += hz * delta_ms as f32 / 1000.0;
        self.state.last_phase_update_ms = now_ms;

        // Cycle edge: the accumulated phase crossed an integer.
        let cycle_done =
            floorf(self.state.accumulated_phase) > floorf(self.state.last_phase);
        self.state.last_phase = self.state.accumulated_phase;

        let mut event = None;
        if cycle_done {
            self.state.completed_cycles += 1;
            event = Some(EngineEvent::MovementComplete);

            let target_reached = self.config.cycle_count > 0
                && self.state.completed_cycles >= self.config.cycle_count;
            if target_reached && !self.state.is_ramping_out {
                if self.config.enable_ramp_out {
                    self.state.is_ramping_out = true;
                    self.state.ramp_start_ms = now_ms;
                } else {
                    return Some(self.wind_down());
                }
            } else if self.config.cycle_pause.enabled && !self.state.is_ramping_out {
                self.pause_state.duration_ms =
                    self.config.cycle_pause.duration_ms(&mut shared.rng);
                self.pause_state.is_pausing = true;
                self.pause_state.start_ms = now_ms;
                return event;
            }
        }

        // Ramp-out completion ends the oscillation.
        if self.state.is_ramping_out {
            let elapsed = now_ms.wrapping_sub(self.state.ramp_start_ms) as f32;
            if elapsed >= self.config.ramp_out_duration_ms {
                return Some(self.wind_down());
            }
        }

        // Target from the waveform.
        let phase = self.state.accumulated_phase - floorf(self.state.accumulated_phase);
        let target_mm = eff_center + eff_amplitude * waveform_value(self.config.waveform, phase);
        let target_step = mm_to_steps(target_mm);

        if let Some(fault) = self.execute_steps(hw, shared, target_step, now_ms) {
            return Some(fault);
        }
        event
    }

    /// Cycle target reached: return to center or finish in place.
    fn wind_down(&mut self) -> EngineEvent {
        self.state.is_ramping_out = false;
        if self.config.return_to_center {
            self.state.is_returning = true;
            // The finish event fires when the carriage reaches center.
            EngineEvent::MovementComplete
        } else {
            EngineEvent::OscillationFinished
        }
    }

    /// Move to `center − amplitude` before the waveform starts.
    fn run_positioning<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
        now_ms: u64,
        now_us: u64,
    ) -> Option<EngineEvent> {
        let target_step = mm_to_steps(self.config.center_mm - self.config.amplitude_mm);
        let error = target_step - shared.current_step;

        if error.abs() <= POSITIONING_TOLERANCE_STEPS {
            self.state.is_initial_positioning = false;
            self.state.start_ms = now_ms;
            self.state.accumulated_phase = 0.0;
            self.state.last_phase = 0.0;
            self.state.last_phase_update_ms = now_ms;
            if self.config.enable_ramp_in {
                self.state.is_ramping_in = true;
                self.state.ramp_start_ms = now_ms;
            }
            return None;
        }

        if now_us.wrapping_sub(self.last_step_us) < POSITIONING_STEP_DELAY_US {
            return None;
        }
        self.last_step_us = now_us;
        self.step_toward(hw, shared, error > 0)
    }

    /// Return to center after the final cycle.
    fn run_return<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
        now_us: u64,
    ) -> Option<EngineEvent> {
        let target_step = mm_to_steps(self.config.center_mm);
        let error = target_step - shared.current_step;

        if error.abs() <= POSITIONING_TOLERANCE_STEPS {
            self.state.is_returning = false;
            return Some(EngineEvent::OscillationFinished);
        }

        if now_us.wrapping_sub(self.last_step_us) < POSITIONING_STEP_DELAY_US {
            return None;
        }
        self.last_step_us = now_us;
        self.step_toward(hw, shared, error > 0)
    }

    /// Amplitude with transitions and ramps applied.
    fn effective_amplitude(&mut self, now_ms: u64) -> f32 {
        let mut amplitude = self.state.amplitude.value(now_ms);

        if self.state.is_ramping_in {
            let elapsed = now_ms.wrapping_sub(self.state.ramp_start_ms) as f32;
            if elapsed >= self.config.ramp_in_duration_ms {
                self.state.is_ramping_in = false;
            } else if self.config.ramp_in_duration_ms > 0.0 {
                amplitude *= elapsed / self.config.ramp_in_duration_ms;
            }
        }

        if self.state.is_ramping_out {
            let elapsed = now_ms.wrapping_sub(self.state.ramp_start_ms) as f32;
            if self.config.ramp_out_duration_ms > 0.0 {
                let scale = 1.0 - (elapsed / self.config.ramp_out_duration_ms).min(1.0);
                amplitude *= scale;
            } else {
                amplitude = 0.0;
            }
        }

        amplitude
    }

    /// Step toward the waveform target with bounded catch-up.
    fn execute_steps<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
        target_step: i32,
        now_ms: u64,
    ) -> Option<EngineEvent> {
        let mut error = target_step - shared.current_step;
        if error == 0 {
            return None;
        }

        if error.abs() > CATCH_UP_MAX_STEPS
            && now_ms.wrapping_sub(self.last_catchup_warn_ms) >= WARN_THROTTLE_MS
        {
            self.last_catchup_warn_ms = now_ms;
            #[cfg(feature = "defmt")]
            defmt::warn!("oscillation behind schedule by {} steps", error);
        }

        let mut budget = CATCH_UP_MAX_STEPS;
        while error != 0 && budget > 0 {
            if let Some(fault) = self.step_toward(hw, shared, error > 0) {
                return Some(fault);
            }
            error = target_step - shared.current_step;
            budget -= 1;
        }
        None
    }

    /// One guarded step in the given direction.
    fn step_toward<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
        forward: bool,
    ) -> Option<EngineEvent> {
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
