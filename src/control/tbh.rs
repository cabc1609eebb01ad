//! Take-Back-Half temperature controller.
//!
//! An integrating controller for plants with unknown gain: the output
//! ramps with the error, and at every error sign reversal it is reset to
//! the mean of the current output and the output recorded at the previous
//! reversal. The oscillation amplitude halves at each reversal, which
//! converges without a plant model.

use crate::tip::TipSettings;

/// Lower output clamp in percent.
const OUTPUT_MIN: f32 = 0.0;
/// Upper output clamp in percent.
const OUTPUT_MAX: f32 = 100.0;

/// A Take-Back-Half controller.
#[derive(Debug, Clone)]
pub struct TakeBackHalfController {
    /// Integrating gain in %/°C per sample.
    gamma: f32,
    /// Derivative damping while the temperature moves with the error.
    beta1: f32,
    /// Derivative damping while the temperature moves against the error.
    beta2: f32,

    /// The most recent (or held) output in percent.
    output: f32,
    /// Output recorded at the previous error sign reversal.
    crossing_output: f32,
    /// Error of the previous sample.
    last_error: f32,
    /// Temperature of the previous sample.
    last_temperature: f32,
    /// True until the first sample after (re-)enabling has run.
    first_sample: bool,
    /// If false, samples are ignored and the output is held.
    enabled: bool,
}

impl TakeBackHalfController {
    /// Create a disabled controller with the given gains.
    pub fn new(gamma: f32, beta1: f32, beta2: f32) -> Self {
        Self {
            gamma,
            beta1,
            beta2,
            output: 0.0,
            crossing_output: 0.0,
            last_error: 0.0,
            last_temperature: 0.0,
            first_sample: true,
            enabled: false,
        }
    }

    /// Load gains from a tip's stored fixed-point constants.
    ///
    /// Kp maps to Gamma and Kd to the damping pair; Ki and the integral
    /// limit are not used by this flavor.
    pub fn set_control_parameters(&mut self, tip: &TipSettings) {
        self.gamma = tip.kp_x1000 as f32 / 1000.0;
        self.beta1 = tip.kd_x1000 as f32 / 1000.0;
        self.beta2 = 2.0 * self.beta1;
    }

    /// Enable or disable the controller.
    ///
    /// Disabling holds the output. Enabling keeps the held output as the
    /// new take-back base and discards the error history.
    pub fn enable(&mut self, on: bool) {
        if on && !self.enabled {
            self.crossing_output = self.output;
            self.first_sample = true;
        }
        self.enabled = on;
    }

    /// If true, the controller reacts to samples.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The most recent output in percent.
    pub fn output(&self) -> f32 {
        self.output
    }

    /// Run one control step; call once per control interval.
    pub fn new_sample(&mut self, target_deg_c: f32, actual_deg_c: f32) -> f32 {
        if !self.enabled {
            return self.output;
        }

        let error = target_deg_c - actual_deg_c;
        let delta = if self.first_sample {
            0.0
        } else {
            actual_deg_c - self.last_temperature
        };

        self.output += self.gamma * error;

        // Damp harder while the temperature runs away from the setpoint.
        let beta = if (error >= 0.0) == (delta >= 0.0) {
            self.beta1
        } else {
            self.beta2
        };
        self.output = (self.output - beta * delta).clamp(OUTPUT_MIN, OUTPUT_MAX);

        let crossed = !self.first_sample
            && error != 0.0
            && self.last_error != 0.0
            && (error > 0.0) != (self.last_error > 0.0);
        if crossed {
            self.output = 0.5 * (self.output + self.crossing_output);
            self.crossing_output = self.output;
        }

        self.last_error = error;
        self.last_temperature = actual_deg_c;
        self.first_sample = false;
        self.output
    }
}
