//! Chaos pattern catalog
//!
//! Eleven named trajectory generators, each with a base configuration
//! (speed range, duration range, craziness coupling, amplitude jumps) and
//! optional extensions. All tuning constants live here so pattern behavior
//! can be adjusted without touching the controller.

use rand::{rngs::SmallRng, Rng};

use crate::config::types::CHAOS_PATTERN_COUNT;

/// Named chaos pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChaosPattern {
    /// Rapid back-and-forth with random targets
    Zigzag,
    /// Smooth sweeps between two random extremes
    Sweep,
    /// Quick two-phase pulses from center
    Pulse,
    /// Slow wandering walk
    Drift,
    /// High-speed random jumps
    Burst,
    /// Continuous sinusoidal motion
    Wave,
    /// Regular back-and-forth at constant amplitude
    Pendulum,
    /// Progressive spiral, radius growing over the pattern
    Spiral,
    /// Breathing rhythm with random peak pauses
    Calm,
    /// Three phases: fast in, slow out, pause
    BruteForce,
    /// Mirror of brute force: slow in, fast out, pause
    Liberator,
}

/// All patterns in bitmap order
pub const ALL_PATTERNS: [ChaosPattern; CHAOS_PATTERN_COUNT] = [
    ChaosPattern::Zigzag,
    ChaosPattern::Sweep,
    ChaosPattern::Pulse,
    ChaosPattern::Drift,
    ChaosPattern::Burst,
    ChaosPattern::Wave,
    ChaosPattern::Pendulum,
    ChaosPattern::Spiral,
    ChaosPattern::Calm,
    ChaosPattern::BruteForce,
    ChaosPattern::Liberator,
];

/// Selection weights when all patterns are enabled (percent, sums to ~110;
/// the draw renormalizes over the enabled subset)
const PATTERN_WEIGHTS: [u8; CHAOS_PATTERN_COUNT] = [12, 12, 8, 8, 5, 15, 12, 8, 10, 10, 10];

impl ChaosPattern {
    /// Bitmap index of this pattern
    pub fn index(self) -> usize {
        ALL_PATTERNS.iter().position(|&p| p == self).unwrap_or(0)
    }
}

/// Weighted draw over the enabled patterns.
///
/// Returns `None` when every pattern is disabled.
pub fn pick_pattern(
    enabled: &[bool; CHAOS_PATTERN_COUNT],
    rng: &mut SmallRng,
) -> Option<ChaosPattern> {
    let total: u32 = ALL_PATTERNS
        .iter()
        .enumerate()
        .filter(|(i, _)| enabled[*i])
        .map(|(i, _)| PATTERN_WEIGHTS[i] as u32)
        .sum();
    if total == 0 {
        return None;
    }

    let mut roll = rng.gen_range(0..total);
    for (i, &pattern) in ALL_PATTERNS.iter().enumerate() {
        if !enabled[i] {
            continue;
        }
        let w = PATTERN_WEIGHTS[i] as u32;
        if roll < w {
            return Some(pattern);
        }
        roll -= w;
    }
    None
}

/// Base configuration shared by every pattern
#[derive(Debug, Clone, Copy)]
pub struct PatternBaseConfig {
    /// Speed range as a fraction of the configured max level
    pub speed_min: f32,
    pub speed_max: f32,
    /// Speed added at 100 % craziness (fraction of max level)
    pub speed_craziness_boost: f32,
    /// Pattern duration range (ms)
    pub duration_min_ms: u32,
    pub duration_max_ms: u32,
    /// Duration removed at 100 % craziness (ms)
    pub duration_craziness_reduction_ms: u32,
    /// Jump / amplitude range as a fraction of the configured amplitude
    pub amplitude_jump_min: f32,
    pub amplitude_jump_max: f32,
}

impl PatternBaseConfig {
    /// Draw a speed level for this pattern.
    pub fn draw_speed(&self, max_level: f32, craziness: f32, rng: &mut SmallRng) -> f32 {
        let base: f32 = rng.gen_range(self.speed_min..=self.speed_max);
        let boosted = base + self.speed_craziness_boost * craziness;
        (boosted * max_level).clamp(0.0, max_level.max(0.0))
    }

    /// Draw an amplitude jump for this pattern.
    pub fn draw_jump(&self, amplitude_mm: f32, rng: &mut SmallRng) -> f32 {
        let frac: f32 = rng.gen_range(self.amplitude_jump_min..=self.amplitude_jump_max);
        frac * amplitude_mm
    }
}

/// Extension for sinusoidal patterns (WAVE, CALM)
#[derive(Debug, Clone, Copy)]
pub struct SinusoidalExt {
    /// Frequency range (Hz); ignored when `cycles_over_duration` > 0
    pub frequency_min_hz: f32,
    pub frequency_max_hz: f32,
    /// Fixed cycle count spread over the pattern duration (0 = random Hz)
    pub cycles_over_duration: u32,
}

/// Extension for multi-phase patterns (PULSE, BRUTE_FORCE, LIBERATOR)
#[derive(Debug, Clone, Copy)]
pub struct MultiPhaseExt {
    /// Second-phase speed range (fraction of max level)
    pub phase2_speed_min: f32,
    pub phase2_speed_max: f32,
    pub phase2_speed_craziness_boost: f32,
    /// Inter-phase pause range (ms)
    pub pause_min_ms: u32,
    pub pause_max_ms: u32,
}

impl MultiPhaseExt {
    /// Draw the second-phase speed level.
    pub fn draw_phase2_speed(&self, max_level: f32, craziness: f32, rng: &mut SmallRng) -> f32 {
        let base: f32 = rng.gen_range(self.phase2_speed_min..=self.phase2_speed_max);
        let boosted = base + self.phase2_speed_craziness_boost * craziness;
        (boosted * max_level).clamp(0.0, max_level.max(0.0))
    }

    /// Draw an inter-phase pause duration.
    pub fn draw_pause_ms(&self, rng: &mut SmallRng) -> u64 {
        rng.gen_range(self.pause_min_ms..=self.pause_max_ms) as u64
    }
}

/// Extension for patterns with random internal pauses (CALM)
#[derive(Debug, Clone, Copy)]
pub struct PauseExt {
    pub pause_min_ms: u32,
    pub pause_max_ms: u32,
    /// Pause probability at each trigger (0-100)
    pub pause_chance_percent: f32,
    /// |sin| threshold that arms a pause roll
    pub pause_trigger_threshold: f32,
}

/// Extension for directional patterns (BRUTE_FORCE, LIBERATOR)
#[derive(Debug, Clone, Copy)]
pub struct DirectionExt {
    /// Forward probability at 0 % craziness (0-100)
    pub forward_chance_min: u8,
    /// Forward probability at 100 % craziness (0-100)
    pub forward_chance_max: u8,
}

impl DirectionExt {
    /// Interpolated forward chance for the given craziness in [0, 1].
    pub fn forward_chance(&self, craziness: f32) -> u8 {
        let lo = self.forward_chance_min as f32;
        let hi = self.forward_chance_max as f32;
        (lo + (hi - lo) * craziness) as u8
    }
}

// ZIGZAG: rapid random jumps
pub const ZIGZAG_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.40,
    speed_max: 0.70,
    speed_craziness_boost: 0.30,
    duration_min_ms: 2000,
    duration_max_ms: 4000,
    duration_craziness_reduction_ms: 600,
    amplitude_jump_min: 0.60,
    amplitude_jump_max: 1.00,
};

// SWEEP: large edge-to-edge sweeps
pub const SWEEP_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.30,
    speed_max: 0.60,
    speed_craziness_boost: 0.40,
    duration_min_ms: 3000,
    duration_max_ms: 5000,
    duration_craziness_reduction_ms: 1400,
    amplitude_jump_min: 0.75,
    amplitude_jump_max: 1.00,
};

// PULSE: quick out-and-back pulses
pub const PULSE_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.50,
    speed_max: 0.80,
    speed_craziness_boost: 0.20,
    duration_min_ms: 800,
    duration_max_ms: 1500,
    duration_craziness_reduction_ms: 400,
    amplitude_jump_min: 0.40,
    amplitude_jump_max: 1.00,
};

// DRIFT: slow wandering
pub const DRIFT_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.20,
    speed_max: 0.40,
    speed_craziness_boost: 0.30,
    duration_min_ms: 4000,
    duration_max_ms: 9000,
    duration_craziness_reduction_ms: 1500,
    amplitude_jump_min: 0.25,
    amplitude_jump_max: 0.75,
};

// BURST: fast explosive jumps
pub const BURST_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.60,
    speed_max: 0.90,
    speed_craziness_boost: 0.10,
    duration_min_ms: 600,
    duration_max_ms: 1200,
    duration_craziness_reduction_ms: 300,
    amplitude_jump_min: 0.70,
    amplitude_jump_max: 1.00,
};

// WAVE: sinusoidal continuous motion
pub const WAVE_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.25,
    speed_max: 0.50,
    speed_craziness_boost: 0.25,
    duration_min_ms: 6000,
    duration_max_ms: 12_000,
    duration_craziness_reduction_ms: 2000,
    amplitude_jump_min: 0.50,
    amplitude_jump_max: 1.00,
};
pub const WAVE_SIN: SinusoidalExt = SinusoidalExt {
    frequency_min_hz: 0.0,
    frequency_max_hz: 0.0,
    cycles_over_duration: 3,
};

// PENDULUM: regular back-and-forth
pub const PENDULUM_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.30,
    speed_max: 0.60,
    speed_craziness_boost: 0.30,
    duration_min_ms: 5000,
    duration_max_ms: 8000,
    duration_craziness_reduction_ms: 1200,
    amplitude_jump_min: 0.60,
    amplitude_jump_max: 1.00,
};

// SPIRAL: progressive in/out, radius 10 % → 100 %
pub const SPIRAL_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.20,
    speed_max: 0.45,
    speed_craziness_boost: 0.30,
    duration_min_ms: 5000,
    duration_max_ms: 10_000,
    duration_craziness_reduction_ms: 2500,
    amplitude_jump_min: 0.10,
    amplitude_jump_max: 1.00,
};

// CALM: slow breathing with pauses at the extremes
pub const CALM_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.05,
    speed_max: 0.10,
    speed_craziness_boost: 0.10,
    duration_min_ms: 5000,
    duration_max_ms: 8000,
    duration_craziness_reduction_ms: 800,
    amplitude_jump_min: 0.10,
    amplitude_jump_max: 0.30,
};
pub const CALM_SIN: SinusoidalExt = SinusoidalExt {
    frequency_min_hz: 0.2,
    frequency_max_hz: 1.0,
    cycles_over_duration: 0,
};
pub const CALM_PAUSE: PauseExt = PauseExt {
    pause_min_ms: 500,
    pause_max_ms: 2000,
    pause_chance_percent: 20.0,
    pause_trigger_threshold: 0.95,
};

// BRUTE_FORCE: fast in, slow out, pause
pub const BRUTE_FORCE_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.70,
    speed_max: 1.00,
    speed_craziness_boost: 0.30,
    duration_min_ms: 3000,
    duration_max_ms: 5000,
    duration_craziness_reduction_ms: 750,
    amplitude_jump_min: 0.60,
    amplitude_jump_max: 0.90,
};
pub const BRUTE_FORCE_MULTI: MultiPhaseExt = MultiPhaseExt {
    phase2_speed_min: 0.01,
    phase2_speed_max: 0.10,
    phase2_speed_craziness_boost: 0.09,
    pause_min_ms: 500,
    pause_max_ms: 2000,
};
pub const BRUTE_FORCE_DIR: DirectionExt = DirectionExt {
    forward_chance_min: 90,
    forward_chance_max: 60,
};

// LIBERATOR: slow in, fast out, pause
pub const LIBERATOR_CONFIG: PatternBaseConfig = PatternBaseConfig {
    speed_min: 0.05,
    speed_max: 0.15,
    speed_craziness_boost: 0.10,
    duration_min_ms: 3000,
    duration_max_ms: 5000,
    duration_craziness_reduction_ms: 750,
    amplitude_jump_min: 0.60,
    amplitude_jump_max: 0.90,
};
pub const LIBERATOR_MULTI: MultiPhaseExt = MultiPhaseExt {
    phase2_speed_min: 0.70,
    phase2_speed_max: 1.00,
    phase2_speed_craziness_boost: 0.30,
    pause_min_ms: 500,
    pause_max_ms: 2000,
};
pub const LIBERATOR_DIR: DirectionExt = DirectionExt {
    forward_chance_min: 90,
    forward_chance_max: 60,
};

/// Base config lookup by pattern
pub fn base_config(pattern: ChaosPattern) -> &'static PatternBaseConfig {
    match pattern {
        ChaosPattern::Zigzag => &ZIGZAG_CONFIG,
        ChaosPattern::Sweep => &SWEEP_CONFIG,
        ChaosPattern::Pulse => &PULSE_CONFIG,
        ChaosPattern::Drift => &DRIFT_CONFIG,
        ChaosPattern::Burst => &BURST_CONFIG,
        ChaosPattern::Wave => &WAVE_CONFIG,
        ChaosPattern::Pendulum => &PENDULUM_CONFIG,
        ChaosPattern::Spiral => &SPIRAL_CONFIG,
        ChaosPattern::Calm => &CALM_CONFIG,
        ChaosPattern::BruteForce => &BRUTE_FORCE_CONFIG,
        ChaosPattern::Liberator => &LIBERATOR_CONFIG,
    }
}
