//! Temperature controller dispatch.
//!
//! The supported algorithms form a closed set, dispatched by match. The
//! wrapper owns the duty-cycle counter that quantizes the percentage
//! output into per-half-cycle drive decisions.

use crate::control::duty::DutyCycleCounter;
use crate::control::pid::PidController;
use crate::control::tbh::TakeBackHalfController;
use crate::tip::TipSettings;

/// The selected control algorithm.
#[derive(Debug, Clone)]
pub enum Algorithm {
    /// Classic PID with asymmetric anti-windup.
    Pid(PidController),
    /// Take-Back-Half for tools without tuned constants.
    TakeBackHalf(TakeBackHalfController),
}

/// A temperature controller with its duty-cycle counter.
#[derive(Debug, Clone)]
pub struct Controller {
    /// The control algorithm.
    algorithm: Algorithm,
    /// Quantizes the percentage output into half-cycle decisions.
    duty: DutyCycleCounter,
}

impl Controller {
    /// Create a disabled PID controller.
    pub fn pid() -> Self {
        Self {
            algorithm: Algorithm::Pid(PidController::new()),
            duty: DutyCycleCounter::new(100),
        }
    }

    /// Create a disabled Take-Back-Half controller.
    pub fn take_back_half(gamma: f32, beta1: f32, beta2: f32) -> Self {
        Self {
            algorithm: Algorithm::TakeBackHalf(TakeBackHalfController::new(gamma, beta1, beta2)),
            duty: DutyCycleCounter::new(100),
        }
    }

    /// Load gains from a tip's stored constants.
    pub fn set_control_parameters(&mut self, tip: &TipSettings) {
        match &mut self.algorithm {
            Algorithm::Pid(pid) => pid.set_control_parameters(tip),
            Algorithm::TakeBackHalf(tbh) => tbh.set_control_parameters(tip),
        }
    }

    /// Enable or disable the controller.
    ///
    /// Disabling also forces the duty counter off (fail-safe).
    pub fn enable(&mut self, on: bool) {
        match &mut self.algorithm {
            Algorithm::Pid(pid) => pid.enable(on),
            Algorithm::TakeBackHalf(tbh) => tbh.enable(on),
        }
        if !on {
            self.duty.reset();
        }
    }

    /// If true, the controller reacts to samples.
    pub fn is_enabled(&self) -> bool {
        match &self.algorithm {
            Algorithm::Pid(pid) => pid.is_enabled(),
            Algorithm::TakeBackHalf(tbh) => tbh.is_enabled(),
        }
    }

    /// Run one control step and load the result into the duty counter.
    pub fn new_sample(&mut self, target_deg_c: f32, actual_deg_c: f32) -> f32 {
        let output = match &mut self.algorithm {
            Algorithm::Pid(pid) => pid.new_sample(target_deg_c, actual_deg_c),
            Algorithm::TakeBackHalf(tbh) => tbh.new_sample(target_deg_c, actual_deg_c),
        };

        if self.is_enabled() {
            self.duty.set_duty_cycle(output as u16);
        }
        output
    }

    /// The most recent output in percent.
    pub fn output(&self) -> f32 {
        match &self.algorithm {
            Algorithm::Pid(pid) => pid.output(),
            Algorithm::TakeBackHalf(tbh) => tbh.output(),
        }
    }

    /// Bypass the algorithm and drive a fixed duty value.
    pub fn set_fixed_duty(&mut self, duty_percent: u16) {
        self.enable(false);
        self.duty.set_duty_cycle(duty_percent);
    }

    /// Advance the duty counter by one half-cycle.
    pub fn advance_duty(&mut self) -> bool {
        self.duty.advance()
    }

    /// The active duty value in percent.
    pub fn duty_cycle(&self) -> u16 {
        self.duty.duty_cycle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_forces_duty_off() {
        let mut controller = Controller::pid();
        controller.set_fixed_duty(100);
        assert!(controller.advance_duty());

        controller.enable(false);
        assert_eq!(controller.duty_cycle(), 0);
        assert!(!controller.advance_duty());
    }

    #[test]
    fn fixed_duty_bypasses_algorithm() {
        let mut controller = Controller::take_back_half(1.0, 0.0, 0.0);
        controller.set_fixed_duty(40);

        // Samples are ignored while disabled.
        controller.new_sample(400.0, 20.0);
        assert_eq!(controller.duty_cycle(), 40);
    }
}
