//! Three-wire stepper driver (STEP / DIR / ENABLE)
//!
//! Drives an HSS86-class closed-loop stepper driver. The driver wants a
//! pulse of at least 2.5 µs and a short hold after direction changes;
//! ENABLE is active low.

use embassy_rp::gpio::Output;
use embassy_time::{block_for, Duration};

use glissade_core::config::hardware::{DIR_CHANGE_DELAY_US, STEP_PULSE_US};
use glissade_core::traits::StepPulser;

/// GPIO step/direction motor driver
pub struct GpioMotor {
    step: Output<'static>,
    dir: Output<'static>,
    /// Active low
    enable: Output<'static>,
    forward: bool,
    enabled: bool,
}

impl GpioMotor {
    /// Takes the three output pins: step idle low, direction forward (high),
    /// enable inactive (high).
    pub fn new(step: Output<'static>, dir: Output<'static>, enable: Output<'static>) -> Self {
        Self {
            step,
            dir,
            enable,
            forward: true,
            enabled: false,
        }
    }
}

impl StepPulser for GpioMotor {
    fn step(&mut self) {
        self.step.set_high();
        block_for(Duration::from_micros(STEP_PULSE_US as u64));
        self.step.set_low();
        block_for(Duration::from_micros(STEP_PULSE_US as u64));
    }

    fn set_direction(&mut self, forward: bool) {
        if forward == self.forward {
            return;
        }
        if forward {
            self.dir.set_high();
        } else {
            self.dir.set_low();
        }
        // The driver needs time to register the level before the next pulse.
        block_for(Duration::from_micros(DIR_CHANGE_DELAY_US as u64));
        self.forward = forward;
    }

    fn direction(&self) -> bool {
        self.forward
    }

    fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.enable.set_low();
        self.enabled = true;
    }

    fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.enable.set_high();
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
