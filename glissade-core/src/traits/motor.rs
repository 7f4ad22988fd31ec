//! Step/direction motor driver trait
//!
//! Abstracts over the three-wire (STEP, DIR, ENABLE) interface of external
//! closed-loop stepper drivers. The driver executes pulses blindly; position
//! bookkeeping stays in the engine.

/// Trait for step/direction motor drivers
///
/// Implementations own the three GPIOs and the pulse timing. `step()` blocks
/// for the full pulse (high phase plus low hold, about 6 µs total) so the
/// caller's inter-step delay math can treat it as a fixed cost.
pub trait StepPulser {
    /// Emit exactly one step pulse.
    ///
    /// Drives the pulse line high for at least the driver's minimum pulse
    /// width, returns it low, and holds for the same time before returning.
    fn step(&mut self);

    /// Set the travel direction.
    ///
    /// Must be a no-op when the direction is unchanged; otherwise the
    /// implementation waits the driver's direction-change hold time before
    /// the next step is permitted.
    fn set_direction(&mut self, forward: bool);

    /// Current direction (true = forward, toward the end contact).
    fn direction(&self) -> bool;

    /// Latch the enable line active.
    fn enable(&mut self);

    /// Release the enable line. The motor is then free to rotate.
    fn disable(&mut self);

    /// Check whether the driver is enabled.
    fn is_enabled(&self) -> bool;
}
