//! Limit contact inputs with majority-vote debouncing
//!
//! Two active-low switches bound the travel. Raw reads come from the
//! implementation; the voting debounce is shared logic so tests exercise the
//! same algorithm as hardware.

/// Trait for the two limit-contact inputs
///
/// `true` means the contact is pressed (input pulled low by the switch).
pub trait ContactProbe {
    /// Raw read of the start-side contact.
    fn start_raw(&mut self) -> bool;

    /// Raw read of the end-side contact.
    fn end_raw(&mut self) -> bool;

    /// Busy-wait between debounce samples.
    fn delay_us(&mut self, us: u32);

    /// Debounced read of the start contact.
    ///
    /// Majority voting over `checks` samples spaced `delay_us` apart, with an
    /// early exit once a majority has agreed. 3 checks require 2 matching
    /// reads, 5 checks require 3.
    fn is_start_active(&mut self, checks: u8, delay_us: u32) -> bool {
        self.read_debounced(false, checks, delay_us)
    }

    /// Debounced read of the end contact. Same voting as the start side.
    fn is_end_active(&mut self, checks: u8, delay_us: u32) -> bool {
        self.read_debounced(true, checks, delay_us)
    }

    /// Shared majority-vote loop.
    fn read_debounced(&mut self, end_side: bool, checks: u8, delay_us: u32) -> bool {
        let required = (checks + 1) / 2;
        let mut active = 0u8;

        for i in 0..checks {
            let pressed = if end_side {
                self.end_raw()
            } else {
                self.start_raw()
            };
            if pressed {
                active += 1;
                if active >= required {
                    return true;
                }
            }
            if i + 1 < checks {
                self.delay_us(delay_us);
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Probe that replays a scripted sample sequence on the end contact.
    struct ScriptedProbe {
        samples: &'static [bool],
        index: usize,
        reads: usize,
    }

    impl ScriptedProbe {
        fn new(samples: &'static [bool]) -> Self {
            Self {
                samples,
                index: 0,
                reads: 0,
            }
        }
    }

    impl ContactProbe for ScriptedProbe {
        fn start_raw(&mut self) -> bool {
            false
        }

        fn end_raw(&mut self) -> bool {
            let s = self.samples[self.index.min(self.samples.len() - 1)];
            self.index += 1;
            self.reads += 1;
            s
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    #[test]
    fn majority_confirms_pressed() {
        let mut probe = ScriptedProbe::new(&[true, false, true, true, true]);
        assert!(probe.is_end_active(5, 10));
    }

    #[test]
    fn majority_rejects_glitch() {
        // One spurious low-going glitch in an otherwise open contact.
        let mut probe = ScriptedProbe::new(&[true, false, false, false, false]);
        assert!(!probe.is_end_active(5, 10));
    }

    #[test]
    fn early_exit_stops_sampling() {
        let mut probe = ScriptedProbe::new(&[true, true, true, true, true]);
        assert!(probe.is_end_active(5, 10));
        // 5 checks require 3 matching reads; sampling stops there.
        assert_eq!(probe.reads, 3);
    }

    #[test]
    fn three_checks_need_two() {
        let mut probe = ScriptedProbe::new(&[false, true, true]);
        assert!(probe.is_end_active(3, 10));
    }
}
