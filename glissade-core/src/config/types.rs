//! Runtime configuration structures
//!
//! Created once with safe defaults at boot, mutated only by command handlers
//! or the sequence executor, never destroyed. Execution state lives with the
//! controllers; only the small pause/zone state structs are here because the
//! sequencer copies their configs line-by-line and resets the state wholesale.

use rand::{rngs::SmallRng, Rng};

use crate::state::{ExecutionContext, SystemState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of chaos patterns (indexes the enable bitmap)
pub const CHAOS_PATTERN_COUNT: usize = 11;

/// Global system configuration, shared across cores behind a mutex
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SystemConfig {
    /// Physical travel discovered by calibration (0 = not calibrated)
    pub total_distance_mm: f32,
    /// Share of the physical travel exposed to movement commands (%)
    pub limit_percent: f32,
    /// Lowest legal step position (0 after calibration)
    pub min_step: i32,
    /// Highest legal step position (total travel in steps)
    pub max_step: i32,
    /// Current system state
    pub state: SystemState,
    /// Standalone or sequencer-driven execution
    pub context: ExecutionContext,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            total_distance_mm: 0.0,
            limit_percent: super::hardware::DEFAULT_LIMIT_PERCENT,
            min_step: 0,
            max_step: 0,
            state: SystemState::Init,
            context: ExecutionContext::Standalone,
        }
    }
}

impl SystemConfig {
    /// Ceiling enforced by validators, below the physical travel.
    pub fn effective_max_distance_mm(&self) -> f32 {
        self.total_distance_mm * self.limit_percent / 100.0
    }

    /// A movement command is only legal once travel has been discovered.
    pub fn is_calibrated(&self) -> bool {
        self.total_distance_mm > 0.0
    }
}

/// Back-and-forth movement parameters
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MotionConfig {
    /// Start of the traversal window (mm from position zero)
    pub start_position_mm: f32,
    /// Traversal length (mm)
    pub target_distance_mm: f32,
    /// Speed level for the forward leg
    pub speed_level_forward: f32,
    /// Speed level for the backward leg
    pub speed_level_backward: f32,
    /// Inter-cycle pause
    pub cycle_pause: CyclePauseConfig,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            start_position_mm: 0.0,
            target_distance_mm: 50.0,
            speed_level_forward: 5.0,
            speed_level_backward: 5.0,
            cycle_pause: CyclePauseConfig::default(),
        }
    }
}

/// Shadow copy of motion parameters queued while a cycle is running.
///
/// Applied atomically at the backward-to-forward pivot so one cycle is always
/// consistent with one config snapshot.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingMotionConfig {
    pub start_position_mm: f32,
    pub distance_mm: f32,
    pub speed_level_forward: f32,
    pub speed_level_backward: f32,
    pub has_changes: bool,
}

/// Pause between cycles (back-and-forth and oscillation modes)
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CyclePauseConfig {
    pub enabled: bool,
    /// Fixed duration in seconds, used when `is_random` is false
    pub fixed_duration_s: f32,
    pub is_random: bool,
    pub min_s: f32,
    pub max_s: f32,
}

impl Default for CyclePauseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fixed_duration_s: 1.5,
            is_random: false,
            min_s: 0.5,
            max_s: 5.0,
        }
    }
}

impl CyclePauseConfig {
    /// Compute the duration of the next pause in milliseconds.
    pub fn duration_ms(&self, rng: &mut SmallRng) -> u64 {
        if self.is_random {
            let lo = self.min_s.min(self.max_s);
            let hi = self.min_s.max(self.max_s);
            let offset: f32 = rng.gen_range(0.0..1.0);
            ((lo + offset * (hi - lo)) * 1000.0) as u64
        } else {
            (self.fixed_duration_s * 1000.0) as u64
        }
    }
}

/// Runtime state of a cycle pause
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CyclePauseState {
    pub is_pausing: bool,
    pub start_ms: u64,
    pub duration_ms: u64,
}

/// Speed modulation applied inside a zone (mutually exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpeedEffect {
    #[default]
    None,
    /// Slow down approaching the zone boundary
    Decel,
    /// Punch effect: speed up approaching the boundary
    Accel,
}

/// Shape of the speed modulation across the zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpeedCurve {
    #[default]
    Linear,
    /// Smooth S-curve
    Sine,
    /// Weak at entry, strong at the boundary
    TriangleInv,
    /// Sine inverted: weak at entry, strong at the boundary
    SineInv,
}

/// Position-dependent effects near the traversal endpoints
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZoneEffectConfig {
    pub enabled: bool,
    pub enable_start: bool,
    pub enable_end: bool,
    /// Zones stay at their physical position regardless of direction
    pub mirror_on_return: bool,
    /// Zone size (mm)
    pub zone_mm: f32,
    pub speed_effect: SpeedEffect,
    pub speed_curve: SpeedCurve,
    /// Effect intensity, 0-100 %
    pub speed_intensity: f32,
    pub random_turnback_enabled: bool,
    /// Chance per zone entry, 0-100 %
    pub turnback_chance: u8,
    pub end_pause_enabled: bool,
    pub end_pause_is_random: bool,
    pub end_pause_duration_s: f32,
    pub end_pause_min_s: f32,
    pub end_pause_max_s: f32,
}

impl Default for ZoneEffectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enable_start: true,
            enable_end: true,
            mirror_on_return: false,
            zone_mm: 50.0,
            speed_effect: SpeedEffect::Decel,
            speed_curve: SpeedCurve::Sine,
            speed_intensity: 75.0,
            random_turnback_enabled: false,
            turnback_chance: 30,
            end_pause_enabled: false,
            end_pause_is_random: false,
            end_pause_duration_s: 1.0,
            end_pause_min_s: 0.5,
            end_pause_max_s: 2.0,
        }
    }
}

impl ZoneEffectConfig {
    /// Clamp the config to the current traversal length.
    ///
    /// With both zones enabled each may cover at most half the travel; the
    /// zone never shrinks below 10 mm. Returns true when anything changed so
    /// the caller can surface a warning.
    pub fn sanitize(&mut self, movement_mm: f32) -> bool {
        if !self.enabled || movement_mm <= 0.0 {
            return false;
        }

        let mut adjusted = false;

        let max_zone = if self.enable_start && self.enable_end {
            movement_mm / 2.0
        } else {
            movement_mm
        };

        if self.zone_mm < 10.0 {
            self.zone_mm = 10.0;
            adjusted = true;
        }
        if self.zone_mm > max_zone {
            self.zone_mm = max_zone;
            adjusted = true;
        }
        if self.turnback_chance > 100 {
            self.turnback_chance = 100;
            adjusted = true;
        }
        if self.end_pause_min_s < 0.1 {
            self.end_pause_min_s = 0.1;
            adjusted = true;
        }
        if self.end_pause_max_s < self.end_pause_min_s {
            self.end_pause_max_s = self.end_pause_min_s + 0.5;
            adjusted = true;
        }
        if self.end_pause_duration_s < 0.1 {
            self.end_pause_duration_s = 0.1;
            adjusted = true;
        }

        adjusted
    }

    /// Duration of the next end pause in milliseconds.
    pub fn end_pause_duration_ms(&self, rng: &mut SmallRng) -> u64 {
        if self.end_pause_is_random {
            let lo = self.end_pause_min_s * 1000.0;
            let hi = self.end_pause_max_s * 1000.0;
            let offset: f32 = rng.gen_range(0.0..1.0);
            (lo + offset * (hi - lo)) as u64
        } else {
            (self.end_pause_duration_s * 1000.0) as u64
        }
    }
}

/// Per-pass zone effect decisions, reset on each cycle completion
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ZoneEffectState {
    /// Turnback decision latched for this pass
    pub has_pending_turnback: bool,
    /// Dice already rolled for this zone entry
    pub has_rolled: bool,
    /// Distance into the zone at which to reverse
    pub turnback_point_mm: f32,
    pub is_pausing: bool,
    pub pause_start_ms: u64,
    pub pause_duration_ms: u64,
}

impl ZoneEffectState {
    /// Clear the per-pass turnback latch (next entry rolls again).
    pub fn reset_turnback(&mut self) {
        self.has_pending_turnback = false;
        self.has_rolled = false;
        self.turnback_point_mm = 0.0;
    }
}

/// Oscillation waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Square,
}

/// Continuous waveform oscillation parameters
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OscillationConfig {
    /// Center of the oscillation (mm)
    pub center_mm: f32,
    /// Half peak-to-peak amplitude (mm)
    pub amplitude_mm: f32,
    pub waveform: Waveform,
    pub frequency_hz: f32,
    pub enable_ramp_in: bool,
    pub ramp_in_duration_ms: f32,
    pub enable_ramp_out: bool,
    pub ramp_out_duration_ms: f32,
    /// Cycles to run (0 = infinite)
    pub cycle_count: u32,
    /// Return to the center position after completion
    pub return_to_center: bool,
    pub cycle_pause: CyclePauseConfig,
}

impl Default for OscillationConfig {
    fn default() -> Self {
        Self {
            center_mm: 0.0,
            amplitude_mm: 20.0,
            waveform: Waveform::Sine,
            frequency_hz: 0.5,
            enable_ramp_in: true,
            ramp_in_duration_ms: 2000.0,
            enable_ramp_out: true,
            ramp_out_duration_ms: 2000.0,
            cycle_count: 0,
            return_to_center: true,
            cycle_pause: CyclePauseConfig::default(),
        }
    }
}

/// Chaos mode runtime parameters
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChaosRuntimeConfig {
    pub center_mm: f32,
    /// Maximum deviation from center (mm, ±)
    pub amplitude_mm: f32,
    pub max_speed_level: f32,
    /// Total duration in seconds (0 = infinite)
    pub duration_s: u32,
    /// Random seed (0 = derive from the microsecond clock)
    pub seed: u64,
    /// Degree of madness, 0-100 %: faster patterns, shorter durations
    pub craziness_percent: f32,
    /// Per-pattern enable flags, indexed by pattern ordinal
    pub patterns_enabled: [bool; CHAOS_PATTERN_COUNT],
}

impl Default for ChaosRuntimeConfig {
    fn default() -> Self {
        Self {
            center_mm: 110.0,
            amplitude_mm: 50.0,
            max_speed_level: 5.0,
            duration_s: 0,
            seed: 0,
            craziness_percent: 50.0,
            patterns_enabled: [true; CHAOS_PATTERN_COUNT],
        }
    }
}

impl ChaosRuntimeConfig {
    /// Chaos cannot start without at least one enabled pattern.
    pub fn any_pattern_enabled(&self) -> bool {
        self.patterns_enabled.iter().any(|&e| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn effective_max_tracks_limit_percent() {
        let config = SystemConfig {
            total_distance_mm: 200.0,
            limit_percent: 95.0,
            ..Default::default()
        };
        assert!((config.effective_max_distance_mm() - 190.0).abs() < 1e-3);
    }

    #[test]
    fn fixed_pause_duration() {
        let mut rng = SmallRng::seed_from_u64(1);
        let pause = CyclePauseConfig {
            enabled: true,
            fixed_duration_s: 1.5,
            ..Default::default()
        };
        assert_eq!(pause.duration_ms(&mut rng), 1500);
    }

    #[test]
    fn random_pause_duration_in_bounds() {
        let mut rng = SmallRng::seed_from_u64(7);
        let pause = CyclePauseConfig {
            enabled: true,
            is_random: true,
            min_s: 0.5,
            max_s: 2.0,
            ..Default::default()
        };
        for _ in 0..100 {
            let d = pause.duration_ms(&mut rng);
            assert!((500..=2000).contains(&d));
        }
    }

    #[test]
    fn random_pause_tolerates_swapped_bounds() {
        let mut rng = SmallRng::seed_from_u64(7);
        let pause = CyclePauseConfig {
            is_random: true,
            min_s: 2.0,
            max_s: 0.5,
            ..Default::default()
        };
        let d = pause.duration_ms(&mut rng);
        assert!((500..=2000).contains(&d));
    }

    #[test]
    fn zone_sanitize_caps_to_half_travel() {
        let mut zone = ZoneEffectConfig {
            enabled: true,
            enable_start: true,
            enable_end: true,
            zone_mm: 80.0,
            ..Default::default()
        };
        assert!(zone.sanitize(100.0));
        assert!((zone.zone_mm - 50.0).abs() < 1e-3);
    }

    #[test]
    fn zone_sanitize_enforces_minimum() {
        let mut zone = ZoneEffectConfig {
            enabled: true,
            zone_mm: 4.0,
            ..Default::default()
        };
        assert!(zone.sanitize(100.0));
        assert!((zone.zone_mm - 10.0).abs() < 1e-3);
    }

    #[test]
    fn zone_sanitize_skips_disabled() {
        let mut zone = ZoneEffectConfig {
            enabled: false,
            zone_mm: 1.0,
            ..Default::default()
        };
        assert!(!zone.sanitize(100.0));
        assert!((zone.zone_mm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn chaos_pattern_gate() {
        let mut config = ChaosRuntimeConfig::default();
        assert!(config.any_pattern_enabled());
        config.patterns_enabled = [false; CHAOS_PATTERN_COUNT];
        assert!(!config.any_pattern_enabled());
    }
}
