//! Monotonic clock trait

/// Monotonic microsecond clock
///
/// The counter is wide enough (64 bits) that wraparound is not a practical
/// concern; elapsed times are still computed with `wrapping_sub` at the call
/// sites so the math stays correct on any counter width.
pub trait Clock {
    /// Microseconds since an arbitrary epoch.
    fn now_us(&self) -> u64;

    /// Milliseconds since the same epoch.
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }
}
