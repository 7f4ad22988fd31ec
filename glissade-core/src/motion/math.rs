//! Pure motion math
//!
//! Deterministic, side-effect-free formulas shared by all controllers, kept
//! free of hardware and state so unit tests exercise the real production
//! math instead of local mirrors.

use core::f32::consts::PI;

use libm::{cosf, roundf, sinf};

use crate::config::hardware::{
    CHAOS_MAX_STEP_DELAY_US, MAX_SPEED_LEVEL, MIN_STEP_DELAY_US, OSC_MAX_SPEED_MM_S,
    SPEED_COMPENSATION_FACTOR, STEPS_PER_MM, STEP_EXECUTION_TIME_US,
};
use crate::config::{SpeedCurve, SpeedEffect, Waveform};
use crate::motion::patterns::PatternBaseConfig;

/// Convert millimeters to steps
pub fn mm_to_steps(mm: f32) -> i32 {
    roundf(mm * STEPS_PER_MM) as i32
}

/// Convert steps to millimeters
pub fn steps_to_mm(steps: i32) -> f32 {
    steps as f32 / STEPS_PER_MM
}

/// Convert a speed level (0-`MAX_SPEED_LEVEL`) to cycles per minute
pub fn speed_level_to_cpm(level: f32) -> f32 {
    (level * 10.0).clamp(0.0, MAX_SPEED_LEVEL * 10.0)
}

/// Step delay for the back-and-forth mode (µs)
///
/// Derived from the half-cycle time at the requested cycles/minute, minus
/// the fixed pulse cost, divided by the compensation factor. Returns 1000 µs
/// on invalid input.
pub fn vaet_step_delay(level: f32, distance_mm: f32) -> u32 {
    if distance_mm <= 0.0 || level <= 0.0 {
        return 1000;
    }

    let cpm = speed_level_to_cpm(level).max(0.1);
    let steps_per_direction = mm_to_steps(distance_mm);
    if steps_per_direction <= 0 {
        return 1000;
    }

    let half_cycle_ms = (60_000.0 / cpm) / 2.0;
    let raw_us = (half_cycle_ms * 1000.0) / steps_per_direction as f32;
    let delay = (raw_us - STEP_EXECUTION_TIME_US) / SPEED_COMPENSATION_FACTOR;

    (delay.max(MIN_STEP_DELAY_US as f32)) as u32
}

/// Step delay for chaos mode (µs), clamped to `[20, CHAOS_MAX_STEP_DELAY_US]`
///
/// Chaos speed levels map to mm/s (× 10) rather than cycles/minute.
pub fn chaos_step_delay(level: f32) -> u32 {
    let mm_per_s = level * 10.0;
    let steps_per_s = mm_per_s * STEPS_PER_MM;

    if steps_per_s <= 0.0 {
        return 10_000;
    }

    let delay = ((1_000_000.0 / steps_per_s) / SPEED_COMPENSATION_FACTOR) as u32;
    delay.clamp(MIN_STEP_DELAY_US, CHAOS_MAX_STEP_DELAY_US)
}

/// Step delay for pursuit mode (µs), ramping speed down as the error shrinks
///
/// Full speed above 5 mm of error, 60 % of it at or below 1 mm, linear in
/// between. Steps/second additionally clamped to `[30, 6000]`.
pub fn pursuit_step_delay(error_mm: f32, max_level: f32) -> u32 {
    let level = if error_mm > 5.0 {
        max_level
    } else if error_mm > 1.0 {
        let ratio = (error_mm - 1.0) / 4.0;
        max_level * (0.6 + ratio * 0.4)
    } else {
        max_level * 0.6
    };

    let steps_per_s = (level * 10.0 * STEPS_PER_MM).clamp(30.0, 6000.0);
    let delay = ((1_000_000.0 / steps_per_s) - STEP_EXECUTION_TIME_US) / SPEED_COMPENSATION_FACTOR;

    (delay.max(MIN_STEP_DELAY_US as f32)) as u32
}

/// Zone speed-adjustment factor
///
/// `progress` runs from 0.0 at the zone boundary (endpoint side) to 1.0 at
/// the zone exit. Returns 1.0 for no effect, > 1.0 to lengthen delays
/// (decelerate), < 1.0 to shorten them (accelerate).
pub fn zone_speed_factor(
    effect: SpeedEffect,
    curve: SpeedCurve,
    intensity: f32,
    progress: f32,
) -> f32 {
    if effect == SpeedEffect::None {
        return 1.0;
    }

    let max_intensity = 1.0 + (intensity / 100.0) * 9.0;
    let curve_value = match curve {
        SpeedCurve::Linear => 1.0 - progress,
        SpeedCurve::Sine => 1.0 - (1.0 - cosf(progress * PI)) / 2.0,
        SpeedCurve::TriangleInv => {
            let inv = 1.0 - progress;
            inv * inv
        }
        SpeedCurve::SineInv => sinf((1.0 - progress) * PI / 2.0),
    };

    match effect {
        SpeedEffect::Decel => 1.0 + curve_value * (max_intensity - 1.0),
        SpeedEffect::Accel => {
            let accel_curve = 1.0 - curve_value;
            let min_factor = 1.0 / max_intensity;
            1.0 - accel_curve * (1.0 - min_factor)
        }
        SpeedEffect::None => 1.0,
    }
}

/// Waveform value in [−1, +1] for a normalized phase in [0, 1)
///
/// Sine uses the −cos convention so phase 0 sits at the negative extreme
/// (the oscillation start position).
pub fn waveform_value(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => -cosf(phase * 2.0 * PI),
        Waveform::Triangle => {
            if phase < 0.5 {
                1.0 - phase * 4.0
            } else {
                -3.0 + phase * 4.0
            }
        }
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

/// Oscillation frequency capped by the hardware speed limit
///
/// Peak linear speed of a sine is `2π·f·A`; the requested frequency is
/// reduced so that product never exceeds `OSC_MAX_SPEED_MM_S`.
pub fn effective_frequency(requested_hz: f32, amplitude_mm: f32) -> f32 {
    if amplitude_mm > 0.0 {
        let max_hz = OSC_MAX_SPEED_MM_S / (2.0 * PI * amplitude_mm);
        if requested_hz > max_hz {
            return max_hz;
        }
    }
    requested_hz
}

/// Safe pattern duration bounds, shrunk by craziness without underflowing
///
/// `craziness` is normalized to [0, 1]. Both bounds clamp to ≥ 100 ms and
/// the upper bound always stays at least 100 ms above the lower.
pub fn chaos_safe_duration(
    config: &PatternBaseConfig,
    craziness: f32,
    max_factor: f32,
) -> (u64, u64) {
    let min = config.duration_min_ms as i64
        - (config.duration_craziness_reduction_ms as f32 * craziness) as i64;
    let max = config.duration_max_ms as i64
        - ((config.duration_max_ms - config.duration_min_ms) as f32 * craziness * max_factor)
            as i64;

    let min = min.max(100);
    let mut max = max.max(100);
    if min >= max {
        max = min + 100;
    }

    (min as u64, max as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_steps_round_trip() {
        assert_eq!(mm_to_steps(10.0), 800);
        assert_eq!(mm_to_steps(0.5), 40);
        assert!((steps_to_mm(800) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn speed_level_clamps() {
        assert_eq!(speed_level_to_cpm(5.0), 50.0);
        assert_eq!(speed_level_to_cpm(-1.0), 0.0);
        assert_eq!(speed_level_to_cpm(100.0), MAX_SPEED_LEVEL * 10.0);
    }

    #[test]
    fn vaet_delay_matches_hand_calc() {
        // 100 mm at level 5: 50 cpm, half cycle 600 ms, 8000 steps/direction,
        // raw 75 µs/step, minus 6 µs pulse, over the compensation factor.
        let expected = ((75.0 - STEP_EXECUTION_TIME_US) / SPEED_COMPENSATION_FACTOR) as u32;
        assert_eq!(vaet_step_delay(5.0, 100.0), expected);
    }

    #[test]
    fn vaet_delay_invalid_inputs() {
        assert_eq!(vaet_step_delay(0.0, 100.0), 1000);
        assert_eq!(vaet_step_delay(5.0, 0.0), 1000);
        assert_eq!(vaet_step_delay(5.0, -3.0), 1000);
    }

    #[test]
    fn vaet_delay_clamps_to_minimum() {
        // Long travel at max level drives the raw delay below the floor.
        assert_eq!(vaet_step_delay(MAX_SPEED_LEVEL, 2000.0), MIN_STEP_DELAY_US);
    }

    #[test]
    fn chaos_delay_bounds() {
        assert_eq!(chaos_step_delay(0.0), 10_000);
        // Level 0.01 → 8 steps/s → far above the upper clamp.
        assert_eq!(chaos_step_delay(0.01), CHAOS_MAX_STEP_DELAY_US);
        // Level 20 → 16 000 steps/s → below the lower clamp.
        assert_eq!(chaos_step_delay(20.0), 54);
    }

    #[test]
    fn pursuit_delay_piecewise() {
        // Large error runs at max level.
        let fast = pursuit_step_delay(50.0, 10.0);
        // Small error runs at 60 % of max level.
        let slow = pursuit_step_delay(0.5, 10.0);
        assert!(slow > fast);

        // Continuity at the 5 mm knee.
        let at_knee = pursuit_step_delay(5.0, 10.0);
        let above_knee = pursuit_step_delay(5.01, 10.0);
        assert!(at_knee.abs_diff(above_knee) <= 1);
    }

    #[test]
    fn pursuit_delay_respects_sps_floor() {
        // Tiny max level would give < 30 steps/s without the clamp.
        let delay = pursuit_step_delay(0.5, 0.01);
        let expected =
            (((1_000_000.0 / 30.0) - STEP_EXECUTION_TIME_US) / SPEED_COMPENSATION_FACTOR) as u32;
        assert_eq!(delay, expected);
    }

    #[test]
    fn zone_factor_none_is_identity() {
        assert_eq!(
            zone_speed_factor(SpeedEffect::None, SpeedCurve::Sine, 100.0, 0.3),
            1.0
        );
    }

    #[test]
    fn zone_factor_decel_boundary_values() {
        // At the endpoint (progress 0) the full intensity applies.
        let at_end = zone_speed_factor(SpeedEffect::Decel, SpeedCurve::Linear, 100.0, 0.0);
        assert!((at_end - 10.0).abs() < 1e-3);
        // At the zone exit (progress 1) the factor is back to 1.
        let at_exit = zone_speed_factor(SpeedEffect::Decel, SpeedCurve::Linear, 100.0, 1.0);
        assert!((at_exit - 1.0).abs() < 1e-3);
    }

    #[test]
    fn zone_factor_accel_shortens_delay() {
        let factor = zone_speed_factor(SpeedEffect::Accel, SpeedCurve::Linear, 100.0, 0.5);
        assert!(factor < 1.0);
        assert!(factor > 0.0);
        // At the endpoint the accel factor reaches 1/max_intensity.
        let at_end = zone_speed_factor(SpeedEffect::Accel, SpeedCurve::Linear, 100.0, 1.0);
        assert!((at_end - 0.1).abs() < 1e-3);
    }

    #[test]
    fn zone_factor_zero_intensity_is_neutral() {
        for curve in [
            SpeedCurve::Linear,
            SpeedCurve::Sine,
            SpeedCurve::TriangleInv,
            SpeedCurve::SineInv,
        ] {
            for p in [0.0, 0.25, 0.5, 1.0] {
                let decel = zone_speed_factor(SpeedEffect::Decel, curve, 0.0, p);
                assert!((decel - 1.0).abs() < 1e-4);
                let accel = zone_speed_factor(SpeedEffect::Accel, curve, 0.0, p);
                assert!((accel - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn sine_waveform_extremes() {
        assert!((waveform_value(Waveform::Sine, 0.0) + 1.0).abs() < 1e-4);
        assert!((waveform_value(Waveform::Sine, 0.5) - 1.0).abs() < 1e-4);
        assert!(waveform_value(Waveform::Sine, 0.25).abs() < 1e-4);
    }

    #[test]
    fn triangle_waveform_is_piecewise_linear() {
        assert!((waveform_value(Waveform::Triangle, 0.0) - 1.0).abs() < 1e-4);
        assert!((waveform_value(Waveform::Triangle, 0.25)).abs() < 1e-4);
        assert!((waveform_value(Waveform::Triangle, 0.5) + 1.0).abs() < 1e-4);
        assert!((waveform_value(Waveform::Triangle, 0.75)).abs() < 1e-4);
    }

    #[test]
    fn square_waveform_switches_at_half() {
        assert_eq!(waveform_value(Waveform::Square, 0.1), 1.0);
        assert_eq!(waveform_value(Waveform::Square, 0.6), -1.0);
    }

    #[test]
    fn frequency_cap_bites_exactly_at_limit() {
        // 2π·f·A > limit triggers the cap.
        let amplitude = 50.0;
        let cap = OSC_MAX_SPEED_MM_S / (2.0 * PI * amplitude);
        assert_eq!(effective_frequency(cap * 0.99, amplitude), cap * 0.99);
        assert!((effective_frequency(2.0, amplitude) - cap).abs() < 1e-4);
        // Zero amplitude passes through untouched.
        assert_eq!(effective_frequency(10.0, 0.0), 10.0);
    }

    #[test]
    fn safe_duration_clamps() {
        let config = PatternBaseConfig {
            speed_min: 0.1,
            speed_max: 0.5,
            speed_craziness_boost: 0.1,
            duration_min_ms: 2000,
            duration_max_ms: 4000,
            duration_craziness_reduction_ms: 600,
            amplitude_jump_min: 0.5,
            amplitude_jump_max: 1.0,
        };

        let (min, max) = chaos_safe_duration(&config, 0.0, 1.0);
        assert_eq!((min, max), (2000, 4000));

        // Full craziness shrinks both bounds but keeps them sane.
        let (min, max) = chaos_safe_duration(&config, 1.0, 1.0);
        assert_eq!(min, 1400);
        assert_eq!(max, 2000);
    }

    #[test]
    fn safe_duration_never_inverts() {
        let config = PatternBaseConfig {
            speed_min: 0.1,
            speed_max: 0.5,
            speed_craziness_boost: 0.1,
            duration_min_ms: 300,
            duration_max_ms: 400,
            duration_craziness_reduction_ms: 5000,
            amplitude_jump_min: 0.5,
            amplitude_jump_max: 1.0,
        };

        let (min, max) = chaos_safe_duration(&config, 1.0, 1.0);
        assert!(min >= 100);
        assert!(max >= min + 100);
    }
}
