//! Drift supervision
//!
//! Two layers of travel protection, integrated into every stepping routine:
//!
//! - **Soft drift**: the logical position has overrun a logical limit by
//!   less than the buffer. Corrected locally by reversing; no error raised.
//! - **Hard drift**: a physical limit contact fires during motion. The
//!   carriage has lost its reference; step emission halts and the system
//!   goes to the sticky error state until homing recovers it.
//!
//! Hard checks read the contacts with full debouncing, so they only run
//! inside a window near each travel end to keep the per-step cost down over
//! the bulk of the travel.

use crate::config::hardware::{
    CONTACT_SAMPLE_DELAY_US, END_CONTACT_CHECKS, HARD_DRIFT_TEST_ZONE_MM, SOFT_DRIFT_BUFFER_STEPS,
    START_CONTACT_CHECKS,
};
use crate::traits::ContactProbe;

/// Soft drift on the end side: position at or beyond `max_step`, within the
/// correction buffer. The caller reverses and clears zone state.
pub fn soft_drift_end(current_step: i32, max_step: i32) -> bool {
    let over = current_step - max_step;
    (0..SOFT_DRIFT_BUFFER_STEPS).contains(&over)
}

/// Soft drift on the start side: position at or below `min_step`, within the
/// correction buffer. The caller stops stepping backward.
pub fn soft_drift_start(current_step: i32, min_step: i32) -> bool {
    let under = min_step - current_step;
    (0..SOFT_DRIFT_BUFFER_STEPS).contains(&under)
}

/// Hard drift check near the end of travel.
///
/// Only samples the contact when the position is inside the test window;
/// returns true when the debounced end contact is active (fault).
pub fn hard_drift_end<C: ContactProbe>(
    contacts: &mut C,
    position_mm: f32,
    total_distance_mm: f32,
) -> bool {
    if total_distance_mm > 0.0 && position_mm < total_distance_mm - HARD_DRIFT_TEST_ZONE_MM {
        return false;
    }
    contacts.is_end_active(END_CONTACT_CHECKS, CONTACT_SAMPLE_DELAY_US)
}

/// Hard drift check near the start of travel. Same windowing as the end side.
pub fn hard_drift_start<C: ContactProbe>(contacts: &mut C, position_mm: f32) -> bool {
    if position_mm > HARD_DRIFT_TEST_ZONE_MM {
        return false;
    }
    contacts.is_start_active(START_CONTACT_CHECKS, CONTACT_SAMPLE_DELAY_US)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe {
        start: bool,
        end: bool,
        end_reads: usize,
    }

    impl ContactProbe for FixedProbe {
        fn start_raw(&mut self) -> bool {
            self.start
        }

        fn end_raw(&mut self) -> bool {
            self.end_reads += 1;
            self.end
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    #[test]
    fn soft_drift_triggers_inside_buffer() {
        assert!(!soft_drift_end(999, 1000));
        assert!(soft_drift_end(1000, 1000));
        assert!(soft_drift_end(1000 + SOFT_DRIFT_BUFFER_STEPS - 1, 1000));
        assert!(!soft_drift_end(1000 + SOFT_DRIFT_BUFFER_STEPS, 1000));

        assert!(!soft_drift_start(1, 0));
        assert!(soft_drift_start(0, 0));
        assert!(soft_drift_start(-(SOFT_DRIFT_BUFFER_STEPS - 1), 0));
    }

    #[test]
    fn hard_check_skipped_outside_window() {
        let mut probe = FixedProbe {
            start: true,
            end: true,
            end_reads: 0,
        };
        // Middle of a 200 mm travel: neither side is sampled.
        assert!(!hard_drift_end(&mut probe, 100.0, 200.0));
        assert_eq!(probe.end_reads, 0);
        assert!(!hard_drift_start(&mut probe, 100.0));
    }

    #[test]
    fn hard_check_fires_inside_window() {
        let mut probe = FixedProbe {
            start: false,
            end: true,
            end_reads: 0,
        };
        assert!(hard_drift_end(&mut probe, 195.0, 200.0));
        assert!(probe.end_reads > 0);
    }

    #[test]
    fn hard_check_clean_contact_passes() {
        let mut probe = FixedProbe {
            start: false,
            end: false,
            end_reads: 0,
        };
        assert!(!hard_drift_end(&mut probe, 195.0, 200.0));
        assert!(!hard_drift_start(&mut probe, 5.0));
    }
}
