//! Chaos movement controller
//!
//! A pattern scheduler: picks a pattern from the enabled set (weighted),
//! runs it for a craziness-shrunk duration, then picks the next. Each
//! pattern is a small trajectory generator producing sub-targets or a
//! continuous target curve; the step emitter chases whatever the active
//! generator authors, clamped to the chaos band and the physical travel.

use libm::{fabsf, sinf};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use core::f32::consts::PI;

use crate::config::ChaosRuntimeConfig;
use crate::engine::{CommandError, Hardware, Shared};
use crate::motion::math::{chaos_step_delay, chaos_safe_duration, mm_to_steps, steps_to_mm};
use crate::motion::patterns::{
    base_config, pick_pattern, ChaosPattern, BRUTE_FORCE_DIR, BRUTE_FORCE_MULTI, CALM_PAUSE,
    CALM_SIN, LIBERATOR_DIR, LIBERATOR_MULTI, WAVE_SIN,
};
use crate::state::{EngineEvent, FaultKind, SystemState};
use crate::supervision;
use crate::traits::{Clock, ContactProbe, StepPulser};

/// Sine cycles a spiral completes while its radius grows
const SPIRAL_CYCLES: f32 = 3.0;

/// Small-delta share of the drawn jump for the drift walk
const DRIFT_DELTA_SCALE: f32 = 0.3;

/// Chaos runtime state, reset on every start
#[derive(Debug, Clone, Copy)]
struct ChaosState {
    is_running: bool,
    is_positioning: bool,
    pattern: ChaosPattern,
    start_ms: u64,
    pattern_start_ms: u64,
    pattern_duration_ms: u64,
    next_change_ms: u64,
    target_mm: f32,
    speed_level: f32,
    step_delay_us: u32,
    last_step_us: u64,
    min_reached_mm: f32,
    max_reached_mm: f32,
    patterns_executed: u32,
    /// Amplitude jump drawn at pattern entry
    jump_mm: f32,
    // SWEEP extremes
    sweep_low_mm: f32,
    sweep_high_mm: f32,
    // PULSE two-phase
    pulse_return_phase: bool,
    pulse_center_mm: f32,
    // WAVE / CALM sinusoid
    wave_amplitude_mm: f32,
    wave_frequency_hz: f32,
    last_calm_sine: f32,
    // PENDULUM side
    moving_positive: bool,
    // BRUTE_FORCE / LIBERATOR phases: 0 = thrust, 1 = return, 2 = pause
    phase_index: u8,
    phase2_speed_level: f32,
    thrust_forward: bool,
    // Pattern-internal pause (CALM peaks, multi-phase rest)
    in_pattern_pause: bool,
    pause_start_ms: u64,
    pause_duration_ms: u64,
}

impl Default for ChaosState {
    fn default() -> Self {
        Self {
            is_running: false,
            is_positioning: false,
            pattern: ChaosPattern::Zigzag,
            start_ms: 0,
            pattern_start_ms: 0,
            pattern_duration_ms: 0,
            next_change_ms: 0,
            target_mm: 0.0,
            speed_level: 0.0,
            step_delay_us: 1000,
            last_step_us: 0,
            min_reached_mm: f32::MAX,
            max_reached_mm: 0.0,
            patterns_executed: 0,
            jump_mm: 0.0,
            sweep_low_mm: 0.0,
            sweep_high_mm: 0.0,
            pulse_return_phase: false,
            pulse_center_mm: 0.0,
            wave_amplitude_mm: 0.0,
            wave_frequency_hz: 0.0,
            last_calm_sine: 0.0,
            moving_positive: true,
            phase_index: 0,
            phase2_speed_level: 0.0,
            thrust_forward: true,
            in_pattern_pause: false,
            pause_start_ms: 0,
            pause_duration_ms: 0,
        }
    }
}

/// Chaos controller
#[derive(Debug, Default)]
pub struct ChaosController {
    pub config: ChaosRuntimeConfig,
    state: ChaosState,
}

impl ChaosController {
    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn current_pattern(&self) -> Option<ChaosPattern> {
        self.state.is_running.then_some(self.state.pattern)
    }

    pub fn patterns_executed(&self) -> u32 {
        self.state.patterns_executed
    }

    pub fn min_reached_mm(&self) -> f32 {
        if self.state.min_reached_mm == f32::MAX {
            0.0
        } else {
            self.state.min_reached_mm
        }
    }

    pub fn max_reached_mm(&self) -> f32 {
        self.state.max_reached_mm
    }

    /// Start chaos with the staged configuration.
    ///
    /// Seeds the shared RNG: an explicit seed reproduces a run exactly, a
    /// zero seed derives one from the microsecond clock.
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
        if !self.config.any_pattern_enabled() {
            return Err(CommandError::NoPatternsEnabled);
        }

        let seed = if self.config.seed != 0 {
            self.config.seed
        } else {
            hw.clock.now_us()
        };
        shared.rng = SmallRng::seed_from_u64(seed);

        self.state = ChaosState {
            is_running: true,
            is_positioning: true,
            target_mm: self.clamp_target(shared, self.config.center_mm),
            step_delay_us: chaos_step_delay(self.config.max_speed_level),
            ..Default::default()
        };

        hw.motor.enable();
        shared.stats.sync_position(shared.current_step);
        shared.config.state = SystemState::Running;
        Ok(())
    }

    pub fn on_stop(&mut self) {
        self.state.is_running = false;
        self.state.in_pattern_pause = false;
    }

    /// Clamp a target to the chaos band and the physical travel.
    fn clamp_target(&self, shared: &Shared, mm: f32) -> f32 {
        let lo = (self.config.center_mm - self.config.amplitude_mm).max(0.0);
        let hi = (self.config.center_mm + self.config.amplitude_mm)
            .min(shared.config.total_distance_mm);
        mm.clamp(lo, hi.max(lo))
    }

    fn craziness(&self) -> f32 {
        (self.config.craziness_percent / 100.0).clamp(0.0, 1.0)
    }

    // ------------------------------------------------------------------
    // Per-tick processing
    // ------------------------------------------------------------------

    pub fn process<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
    ) -> Option<EngineEvent> {
        if !self.state.is_running || shared.config.state != SystemState::Running {
            return None;
        }

        let now_ms = hw.clock.now_ms();
        let now_us = hw.clock.now_us();

        // Approach the center before the first pattern.
        if self.state.is_positioning {
            let target_step = mm_to_steps(self.state.target_mm);
            if shared.current_step == target_step {
                self.state.is_positioning = false;
                self.state.start_ms = now_ms;
                self.enter_pattern(shared, now_ms);
            } else if now_us.wrapping_sub(self.state.last_step_us)
                >= self.state.step_delay_us as u64
            {
                self.state.last_step_us = now_us;
                return self.emit_step(hw, shared, target_step);
            }
            return None;
        }

        // Overall duration timeout.
        if self.config.duration_s > 0
            && now_ms.wrapping_sub(self.state.start_ms) >= self.config.duration_s as u64 * 1000
        {
            self.state.is_running = false;
            return Some(EngineEvent::ChaosFinished);
        }

        // Pattern-internal pause.
        if self.state.in_pattern_pause {
            if now_ms.wrapping_sub(self.state.pause_start_ms) >= self.state.pause_duration_ms {
                self.state.in_pattern_pause = false;
                if matches!(
                    self.state.pattern,
                    ChaosPattern::BruteForce | ChaosPattern::Liberator
                ) && self.state.phase_index == 2
                {
                    self.begin_thrust(shared);
                }
            }
            return None;
        }

        // Pattern change on schedule.
        if now_ms >= self.state.next_change_ms {
            self.enter_pattern(shared, now_ms);
        }

        // Continuous generators re-author the target every tick.
        self.update_continuous_target(shared, now_ms);

        // Step toward the target; on arrival let the generator pick the next
        // sub-target.
        let target_step = mm_to_steps(self.state.target_mm);
        if shared.current_step == target_step {
            self.next_sub_target(shared, now_ms);
            return None;
        }

        if now_us.wrapping_sub(self.state.last_step_us) >= self.state.step_delay_us as u64 {
            self.state.last_step_us = now_us;
            return self.emit_step(hw, shared, target_step);
        }
        None
    }

    /// One guarded step toward `target_step`, tracking the reached band.
    fn emit_step<M: StepPulser, C: ContactProbe, K: Clock>(
        &mut self,
        hw: &mut Hardware<M, C, K>,
        shared: &mut Shared,
        target_step: i32,
    ) -> Option<EngineEvent> {
        let forward = target_step > shared.current_step;
        let position_mm = steps_to_mm(shared.current_step);

        // Hard-drift contact tests only run inside the end windows.
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
                self.state.is_running = false;
                return Some(EngineEvent::SafetyFault(FaultKind::HardDriftEnd));
            }
        } else {
            if supervision::soft_drift_start(shared.current_step, shared.config.min_step) {
                return None;
            }
            if supervision::hard_drift_start(&mut hw.contacts, position_mm) {
                shared.config.state = SystemState::Error;
                self.state.is_running = false;
                return Some(EngineEvent::SafetyFault(FaultKind::HardDriftStart));
            }
        }

        hw.motor.set_direction(forward);
        hw.motor.step();
        shared.current_step += if forward { 1 } else { -1 };
        shared.stats.track_delta(shared.current_step);

        let reached_mm = steps_to_mm(shared.current_step);
        self.state.min_reached_mm = self.state.min_reached_mm.min(reached_mm);
        self.state.max_reached_mm = self.state.max_reached_mm.max(reached_mm);
        None
    }

    // ------------------------------------------------------------------
    // Pattern scheduling
    // ------------------------------------------------------------------

    /// Select and initialize a new pattern.
    fn enter_pattern(&mut self, shared: &mut Shared, now_ms: u64) {
        let Some(pattern) = pick_pattern(&self.config.patterns_enabled, &mut shared.rng) else {
            // Every pattern disabled mid-run: hold position until stop.
            self.state.next_change_ms = now_ms + 1000;
            return;
        };

        let craziness = self.craziness();
        let cfg = base_config(pattern);

        let (dur_min, dur_max) = chaos_safe_duration(cfg, craziness, 1.0);
        let duration = shared.rng.gen_range(dur_min..=dur_max);

        self.state.pattern = pattern;
        self.state.patterns_executed += 1;
        self.state.pattern_start_ms = now_ms;
        self.state.pattern_duration_ms = duration;
        self.state.next_change_ms = now_ms + duration;
        self.state.speed_level =
            cfg.draw_speed(self.config.max_speed_level, craziness, &mut shared.rng);
        self.state.step_delay_us = chaos_step_delay(self.state.speed_level);
        self.state.jump_mm = cfg.draw_jump(self.config.amplitude_mm, &mut shared.rng);
        self.state.in_pattern_pause = false;
        self.state.phase_index = 0;

        let center = self.config.center_mm;
        match pattern {
            ChaosPattern::Zigzag | ChaosPattern::Burst => {
                self.state.target_mm = self.random_target(shared);
            }
            ChaosPattern::Sweep => {
                let low_jump = self.state.jump_mm;
                let high_jump = cfg.draw_jump(self.config.amplitude_mm, &mut shared.rng);
                self.state.sweep_low_mm = self.clamp_target(shared, center - low_jump);
                self.state.sweep_high_mm = self.clamp_target(shared, center + high_jump);
                self.state.target_mm = self.state.sweep_high_mm;
            }
            ChaosPattern::Pulse => {
                self.state.pulse_center_mm =
                    self.clamp_target(shared, steps_to_mm(shared.current_step));
                self.state.pulse_return_phase = false;
                let outward: bool = shared.rng.gen();
                let offset = if outward {
                    self.state.jump_mm
                } else {
                    -self.state.jump_mm
                };
                self.state.target_mm =
                    self.clamp_target(shared, self.state.pulse_center_mm + offset);
            }
            ChaosPattern::Drift => {
                self.state.target_mm =
                    self.clamp_target(shared, steps_to_mm(shared.current_step));
            }
            ChaosPattern::Wave => {
                self.state.wave_amplitude_mm = self.state.jump_mm;
                let duration_s = (duration as f32 / 1000.0).max(0.1);
                self.state.wave_frequency_hz = WAVE_SIN.cycles_over_duration as f32 / duration_s;
            }
            ChaosPattern::Pendulum => {
                self.state.moving_positive = true;
                self.state.target_mm = self.clamp_target(shared, center + self.state.jump_mm);
            }
            ChaosPattern::Spiral => {
                self.state.target_mm = self.clamp_target(shared, center);
            }
            ChaosPattern::Calm => {
                self.state.wave_amplitude_mm = self.state.jump_mm;
                self.state.wave_frequency_hz = shared
                    .rng
                    .gen_range(CALM_SIN.frequency_min_hz..=CALM_SIN.frequency_max_hz);
                self.state.last_calm_sine = 0.0;
            }
            ChaosPattern::BruteForce => {
                self.state.phase2_speed_level = BRUTE_FORCE_MULTI.draw_phase2_speed(
                    self.config.max_speed_level,
                    craziness,
                    &mut shared.rng,
                );
                self.roll_thrust_direction(shared, BRUTE_FORCE_DIR.forward_chance(craziness));
                self.begin_thrust(shared);
            }
            ChaosPattern::Liberator => {
                self.state.phase2_speed_level = LIBERATOR_MULTI.draw_phase2_speed(
                    self.config.max_speed_level,
                    craziness,
                    &mut shared.rng,
                );
                self.roll_thrust_direction(shared, LIBERATOR_DIR.forward_chance(craziness));
                self.begin_thrust(shared);
            }
        }
    }

    /// Uniform target within the chaos band.
    fn random_target(&self, shared: &mut Shared) -> f32 {
        let t: f32 = shared.rng.gen_range(-1.0..1.0);
        self.clamp_target(
            shared,
            self.config.center_mm + t * self.config.amplitude_mm,
        )
    }

    fn roll_thrust_direction(&mut self, shared: &mut Shared, forward_chance: u8) {
        let roll: u8 = shared.rng.gen_range(0..100);
        self.state.thrust_forward = roll < forward_chance;
    }

    /// Multi-phase thrust: phase 0 at the pattern's primary speed.
    fn begin_thrust(&mut self, shared: &mut Shared) {
        self.state.phase_index = 0;
        self.state.step_delay_us = chaos_step_delay(self.state.speed_level);
        let offset = if self.state.thrust_forward {
            self.state.jump_mm
        } else {
            -self.state.jump_mm
        };
        self.state.target_mm = self.clamp_target(shared, self.config.center_mm + offset);
    }

    /// Re-author the target for continuous generators (WAVE, CALM, SPIRAL).
    fn update_continuous_target(&mut self, shared: &mut Shared, now_ms: u64) {
        let elapsed_s = now_ms.wrapping_sub(self.state.pattern_start_ms) as f32 / 1000.0;
        let center = self.config.center_mm;

        match self.state.pattern {
            ChaosPattern::Wave => {
                let s = sinf(2.0 * PI * self.state.wave_frequency_hz * elapsed_s);
                self.state.target_mm =
                    self.clamp_target(shared, center + self.state.wave_amplitude_mm * s);
            }
            ChaosPattern::Calm => {
                let s = sinf(2.0 * PI * self.state.wave_frequency_hz * elapsed_s);
                self.state.target_mm =
                    self.clamp_target(shared, center + self.state.wave_amplitude_mm * s);

                // At the sine extremes, sometimes hold the breath.
                let threshold = CALM_PAUSE.pause_trigger_threshold;
                if fabsf(s) > threshold && fabsf(self.state.last_calm_sine) <= threshold {
                    let roll: f32 = shared.rng.gen_range(0.0..100.0);
                    if roll < CALM_PAUSE.pause_chance_percent {
                        self.state.in_pattern_pause = true;
                        self.state.pause_start_ms = now_ms;
                        self.state.pause_duration_ms = shared
                            .rng
                            .gen_range(CALM_PAUSE.pause_min_ms..=CALM_PAUSE.pause_max_ms)
                            as u64;
                    }
                }
                self.state.last_calm_sine = s;
            }
            ChaosPattern::Spiral => {
                let duration_s = (self.state.pattern_duration_ms as f32 / 1000.0).max(0.1);
                let progress = (elapsed_s / duration_s).min(1.0);
                let radius = self.config.amplitude_mm * (0.1 + 0.9 * progress);
                let s = sinf(2.0 * PI * SPIRAL_CYCLES * progress);
                self.state.target_mm = self.clamp_target(shared, center + radius * s);
            }
            _ => {}
        }
    }

    /// Discrete generators: the carriage reached the target, pick the next.
    fn next_sub_target(&mut self, shared: &mut Shared, now_ms: u64) {
        match self.state.pattern {
            ChaosPattern::Zigzag | ChaosPattern::Burst => {
                self.state.target_mm = self.random_target(shared);
            }
            ChaosPattern::Sweep => {
                // Reverse at each extreme.
                self.state.target_mm = if self.state.target_mm >= self.state.sweep_high_mm {
                    self.state.sweep_low_mm
                } else {
                    self.state.sweep_high_mm
                };
            }
            ChaosPattern::Pulse => {
                if !self.state.pulse_return_phase {
                    self.state.pulse_return_phase = true;
                    self.state.target_mm = self.state.pulse_center_mm;
                } else {
                    // New pulse: fresh amplitude, fresh direction.
                    self.state.pulse_return_phase = false;
                    self.state.jump_mm = base_config(ChaosPattern::Pulse)
                        .draw_jump(self.config.amplitude_mm, &mut shared.rng);
                    let outward: bool = shared.rng.gen();
                    let offset = if outward {
                        self.state.jump_mm
                    } else {
                        -self.state.jump_mm
                    };
                    self.state.target_mm =
                        self.clamp_target(shared, self.state.pulse_center_mm + offset);
                }
            }
            ChaosPattern::Drift => {
                let delta: f32 = shared.rng.gen_range(-1.0..1.0);
                self.state.target_mm = self.clamp_target(
                    shared,
                    self.state.target_mm + delta * DRIFT_DELTA_SCALE * self.state.jump_mm,
                );
            }
            ChaosPattern::Pendulum => {
                self.state.moving_positive = !self.state.moving_positive;
                let offset = if self.state.moving_positive {
                    self.state.jump_mm
                } else {
                    -self.state.jump_mm
                };
                self.state.target_mm = self.clamp_target(shared, self.config.center_mm + offset);
            }
            ChaosPattern::BruteForce | ChaosPattern::Liberator => match self.state.phase_index {
                0 => {
                    // Thrust done: creep back to center at the second speed.
                    self.state.phase_index = 1;
                    self.state.step_delay_us = chaos_step_delay(self.state.phase2_speed_level);
                    self.state.target_mm = self.clamp_target(shared, self.config.center_mm);
                }
                _ => {
                    // Return done: rest, then thrust again.
                    self.state.phase_index = 2;
                    let multi = if self.state.pattern == ChaosPattern::BruteForce {
                        &BRUTE_FORCE_MULTI
                    } else {
                        &LIBERATOR_MULTI
                    };
                    self.state.in_pattern_pause = true;
                    self.state.pause_start_ms = now_ms;
                    self.state.pause_duration_ms = multi.draw_pause_ms(&mut shared.rng);
                    // Fresh direction and reach for the next thrust.
                    let craziness = self.craziness();
                    let dir = if self.state.pattern == ChaosPattern::BruteForce {
                        &BRUTE_FORCE_DIR
                    } else {
                        &LIBERATOR_DIR
                    };
                    self.roll_thrust_direction(shared, dir.forward_chance(craziness));
                    self.state.jump_mm = base_config(self.state.pattern)
                        .draw_jump(self.config.amplitude_mm, &mut shared.rng);
                }
            },
            // Continuous patterns have no arrival logic.
            ChaosPattern::Wave | ChaosPattern::Calm | ChaosPattern::Spiral => {}
        }
    }
}
