//! Property tests for the control primitives.

use duostat::control::duty::DutyCycleCounter;
use duostat::control::pid::PidController;
use duostat::control::tbh::TakeBackHalfController;
use duostat::tip::TipSettings;
use duostat::tool::{IronType, properties_for};
use proptest::prelude::*;

proptest! {
    /// Over whole periods, the pulse density matches the duty exactly.
    #[test]
    fn duty_counter_is_exact_over_full_periods(duty in 0u16..=100, periods in 1usize..5) {
        let mut counter = DutyCycleCounter::new(100);
        counter.set_duty_cycle(duty);

        let on = (0..periods * 100).filter(|_| counter.advance()).count();
        prop_assert_eq!(on, periods * duty as usize);
    }

    /// At any point in a run, the delivered pulse count deviates from the
    /// ideal by less than one pulse. No bursts, no droughts.
    #[test]
    fn duty_counter_never_bursts(duty in 0u16..=100, steps in 1usize..1000) {
        let mut counter = DutyCycleCounter::new(100);
        counter.set_duty_cycle(duty);

        let mut on = 0usize;
        for step in 1..=steps {
            if counter.advance() {
                on += 1;
            }
            let ideal = step as f64 * duty as f64 / 100.0;
            prop_assert!((on as f64 - ideal).abs() < 1.0);
        }
    }

    /// The PID output is a percentage under arbitrary inputs.
    #[test]
    fn pid_output_stays_in_percent_bounds(
        samples in proptest::collection::vec((0.0f32..500.0, -50.0f32..600.0), 1..200),
    ) {
        let tip = TipSettings::with_defaults(0, properties_for(IronType::T12).unwrap());
        let mut pid = PidController::new();
        pid.set_control_parameters(&tip);
        pid.enable(true);

        for (target, actual) in samples {
            let output = pid.new_sample(target, actual);
            prop_assert!((0.0..=100.0).contains(&output), "{}", output);
        }
    }

    /// The Take-Back-Half output is a percentage under arbitrary inputs.
    #[test]
    fn tbh_output_stays_in_percent_bounds(
        samples in proptest::collection::vec((0.0f32..500.0, -50.0f32..600.0), 1..200),
    ) {
        let mut tbh = TakeBackHalfController::new(0.5, 0.1, 0.2);
        tbh.enable(true);

        for (target, actual) in samples {
            let output = tbh.new_sample(target, actual);
            prop_assert!((0.0..=100.0).contains(&output), "{}", output);
        }
    }
}
