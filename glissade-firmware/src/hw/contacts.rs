//! Limit contact inputs
//!
//! Two normally-open switches to ground with internal pull-ups: the line
//! reads low when the contact is pressed. Debouncing lives in the core
//! trait; this type only provides the raw reads and the sample delay.

use embassy_rp::gpio::Input;
use embassy_time::{block_for, Duration};

use glissade_core::traits::ContactProbe;

/// GPIO contact probe
pub struct GpioContacts {
    start: Input<'static>,
    end: Input<'static>,
}

impl GpioContacts {
    pub fn new(start: Input<'static>, end: Input<'static>) -> Self {
        Self { start, end }
    }
}

impl ContactProbe for GpioContacts {
    fn start_raw(&mut self) -> bool {
        self.start.is_low()
    }

    fn end_raw(&mut self) -> bool {
        self.end.is_low()
    }

    fn delay_us(&mut self, us: u32) {
        block_for(Duration::from_micros(us as u64));
    }
}
