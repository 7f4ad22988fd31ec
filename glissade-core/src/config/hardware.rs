//! Platform constants
//!
//! Mechanical and electrical constants for the belt-driven axis and its
//! HSS86-class closed-loop driver. All timing-critical values are grouped
//! here so a different pulley/microstep combination is a one-file change.

/// Full steps × microsteps per millimeter of belt travel
/// (GT2 belt, 20T pulley, 1/16 microstepping)
pub const STEPS_PER_MM: f32 = 80.0;

/// Highest user-facing speed level. Levels map to cycles/minute for the
/// back-and-forth mode and to mm/s elsewhere (× 10).
pub const MAX_SPEED_LEVEL: f32 = 20.0;

/// Minimum inter-step delay the driver accepts (µs)
pub const MIN_STEP_DELAY_US: u32 = 20;

/// Time consumed by one blocking step pulse, high + low phase (µs)
pub const STEP_EXECUTION_TIME_US: f32 = 6.0;

/// Step pulse width, each phase (µs). Datasheet minimum is 2.5 µs.
pub const STEP_PULSE_US: u32 = 3;

/// Hold time after a direction change before the next step (µs)
pub const DIR_CHANGE_DELAY_US: u32 = 5;

/// Empirical correction for loop overhead between steps. Raw delays divide
/// by this so measured cycle rates land on the requested cycles/minute.
pub const SPEED_COMPENSATION_FACTOR: f32 = 1.15;

/// Upper clamp for chaos-mode step delays (µs); slower would look stalled
pub const CHAOS_MAX_STEP_DELAY_US: u32 = 20_000;

/// Peak linear speed the mechanics tolerate in oscillation mode (mm/s)
pub const OSC_MAX_SPEED_MM_S: f32 = 500.0;

/// Window near either travel end where hard-drift contact tests run (mm)
pub const HARD_DRIFT_TEST_ZONE_MM: f32 = 20.0;

/// Logical-limit overrun tolerated before a hard fault; overruns inside the
/// buffer reverse silently (2 mm at 80 steps/mm)
pub const SOFT_DRIFT_BUFFER_STEPS: i32 = 160;

/// Steps backed off a contact after decontact; defines positions 0 and max
pub const SAFETY_OFFSET_STEPS: i32 = 160;

/// Distance from the start step above which the was-at-start latch re-arms
pub const WAS_AT_START_THRESHOLD_STEPS: i32 = 400;

/// Debounce sample counts and spacing
pub const END_CONTACT_CHECKS: u8 = 5;
pub const START_CONTACT_CHECKS: u8 = 3;
pub const CONTACT_SAMPLE_DELAY_US: u32 = 100;

/// Calibration approach and decontact speed levels (well below max)
pub const CALIBRATION_SPEED_LEVEL: f32 = 3.0;
pub const DECONTACT_SPEED_LEVEL: f32 = 1.0;

/// Watchdog: contact must be found within this many steps or calibration
/// fails (3 m of travel at 80 steps/mm)
pub const CALIBRATION_WATCHDOG_STEPS: u32 = 240_000;

/// Share of the discovered travel exposed to movement commands (%)
pub const DEFAULT_LIMIT_PERCENT: f32 = 95.0;

/// Fixed program capacity for the sequence executor
pub const MAX_SEQUENCE_LINES: usize = 16;

/// Speed level used for line-positioning preambles in the sequencer
pub const SEQUENCE_POSITIONING_SPEED_LEVEL: f32 = 8.0;
