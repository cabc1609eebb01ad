//! Pulse-density modulation of the heater drive.
//!
//! Heater power is quantized to whole AC half-cycles, so a percentage duty
//! value has to be spread over many half-cycles. The accumulator scheme
//! below is exact: over any window of `RESOLUTION` consecutive decisions,
//! the number of "on" half-cycles equals the duty value.

/// The number of decisions over which the duty value is exact.
const RESOLUTION: u16 = 100;

/// Converts a percentage duty value into per-half-cycle on/off decisions.
#[derive(Debug, Clone)]
pub struct DutyCycleCounter {
    /// Upper clamp for the duty value, at most [`RESOLUTION`].
    upper_limit: u16,
    /// The active duty value.
    duty: u16,
    /// Error accumulator, always below [`RESOLUTION`].
    accumulator: u16,
    /// The most recent decision.
    is_on: bool,
}

impl DutyCycleCounter {
    /// Create a counter with the given duty value clamp.
    pub fn new(upper_limit: u16) -> Self {
        Self {
            upper_limit: upper_limit.min(RESOLUTION),
            duty: 0,
            is_on: false,
            accumulator: 0,
        }
    }

    /// Set a new duty value, clamped to the upper limit.
    pub fn set_duty_cycle(&mut self, duty: u16) {
        self.duty = duty.min(self.upper_limit);
    }

    /// The active duty value.
    pub fn duty_cycle(&self) -> u16 {
        self.duty
    }

    /// Advance by one half-cycle and decide whether to drive it.
    pub fn advance(&mut self) -> bool {
        self.accumulator += self.duty;

        self.is_on = if self.accumulator >= RESOLUTION {
            self.accumulator -= RESOLUTION;
            true
        } else {
            false
        };

        self.is_on
    }

    /// The most recent decision.
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    /// Force the output off and drop the accumulated error.
    pub fn reset(&mut self) {
        self.duty = 0;
        self.accumulator = 0;
        self.is_on = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_on(counter: &mut DutyCycleCounter, calls: u32) -> u32 {
        (0..calls).filter(|_| counter.advance()).count() as u32
    }

    #[test]
    fn exact_average_over_full_periods() {
        for duty in 0..=100 {
            let mut counter = DutyCycleCounter::new(100);
            counter.set_duty_cycle(duty);

            assert_eq!(count_on(&mut counter, 300), 3 * duty as u32, "duty {}", duty);
        }
    }

    #[test]
    fn exact_average_from_any_phase() {
        // The accumulator state at the window start must not matter.
        for offset in [1, 17, 50, 99] {
            let mut counter = DutyCycleCounter::new(100);
            counter.set_duty_cycle(37);

            count_on(&mut counter, offset);
            assert_eq!(count_on(&mut counter, 100), 37, "offset {}", offset);
        }
    }

    #[test]
    fn clamps_to_upper_limit() {
        let mut counter = DutyCycleCounter::new(80);
        counter.set_duty_cycle(100);
        assert_eq!(counter.duty_cycle(), 80);

        assert_eq!(count_on(&mut counter, 100), 80);
    }

    #[test]
    fn full_duty_is_always_on() {
        let mut counter = DutyCycleCounter::new(100);
        counter.set_duty_cycle(100);

        for _ in 0..10 {
            assert!(counter.advance());
            assert!(counter.is_on());
        }
    }

    #[test]
    fn reset_forces_off() {
        let mut counter = DutyCycleCounter::new(100);
        counter.set_duty_cycle(100);
        counter.advance();
        assert!(counter.is_on());

        counter.reset();
        assert!(!counter.is_on());
        assert!(!counter.advance());
    }
}
