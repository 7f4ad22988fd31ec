//! Monotonic clock over the embassy time driver

use embassy_time::Instant;

use glissade_core::traits::Clock;

/// Microsecond clock counting from boot
pub struct UptimeClock;

impl Clock for UptimeClock {
    fn now_us(&self) -> u64 {
        Instant::now().as_micros()
    }
}
