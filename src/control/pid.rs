//! PID temperature controller.
//!
//! Output is a heater duty value in percent. The derivative acts on the
//! measurement instead of the error, so setpoint steps do not kick the
//! output. Integration is asymmetric: thermal plants can only heat, so
//! positive windup is tolerated only while the output is saturated high
//! and integration is slowed while the output sits at the floor.

use crate::control::CONTROL_INTERVAL_S;
use crate::tip::TipSettings;

/// Lower output clamp in percent.
const OUTPUT_MIN: f32 = 0.0;
/// Upper output clamp in percent.
const OUTPUT_MAX: f32 = 100.0;

/// A PID controller with asymmetric anti-windup and bumpless transfer.
#[derive(Debug, Clone)]
pub struct PidController {
    /// Proportional gain in %/°C.
    kp: f32,
    /// Integral gain in %/(°C·s).
    ki: f32,
    /// Derivative gain in %·s/°C.
    kd: f32,
    /// Symmetric bound for the integral term in percent.
    integral_limit: f32,

    /// Accumulated integral term in percent.
    integral: f32,
    /// Previous measurement for the input-derivative term.
    last_input: f32,
    /// The most recent (or held) output in percent.
    output: f32,
    /// If true, the next sample restores the held output exactly.
    resume_pending: bool,
    /// If false, samples are ignored and the output is held.
    enabled: bool,
}

impl PidController {
    /// Create a disabled controller with zero gains.
    pub fn new() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            integral_limit: 0.0,
            integral: 0.0,
            last_input: 0.0,
            output: 0.0,
            resume_pending: false,
            enabled: false,
        }
    }

    /// Load gains from a tip's stored fixed-point constants.
    pub fn set_control_parameters(&mut self, tip: &TipSettings) {
        self.kp = tip.kp_x1000 as f32 / 1000.0;
        self.ki = tip.ki_x1000 as f32 / 1000.0;
        self.kd = tip.kd_x1000 as f32 / 1000.0;
        self.integral_limit = tip.i_limit_x1000 as f32 / 1000.0;
    }

    /// Enable or disable the controller.
    ///
    /// Disabling holds the current output; enabling arms bumpless transfer,
    /// so the first sample after re-enabling resumes at the held output.
    pub fn enable(&mut self, on: bool) {
        if on && !self.enabled {
            self.resume_pending = true;
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

        if self.resume_pending {
            // The derivative history is stale after re-enabling.
            self.last_input = actual_deg_c;
        }

        let error = target_deg_c - actual_deg_c;
        let proportional = self.kp * error;
        let differential = self.kd * (actual_deg_c - self.last_input) / CONTROL_INTERVAL_S;

        if self.resume_pending {
            // Back-calculate the integral so that the first output after
            // re-enabling equals the held output. Not clamped: the
            // asymmetric policy below tolerates over-limit positive
            // integral, and a clamp here would break the exact resume.
            self.resume_pending = false;
            self.integral = self.output - proportional + differential;
        } else {
            let mut step = self.ki * error * CONTROL_INTERVAL_S;
            if self.output <= OUTPUT_MIN {
                // Pinned at the floor: integrate at half rate.
                step *= 0.5;
            }
            self.integral += step;

            // Positive windup is only clamped while the output saturates
            // high with the error still positive; negative windup always.
            if self.output >= OUTPUT_MAX && error > 0.0 && self.integral > self.integral_limit {
                self.integral = self.integral_limit;
            }
            if self.integral < -self.integral_limit {
                self.integral = -self.integral_limit;
            }
        }

        self.last_input = actual_deg_c;
        self.output = (proportional + self.integral - differential).clamp(OUTPUT_MIN, OUTPUT_MAX);
        self.output
    }
}

impl Default for PidController {
    fn default() -> Self {
        Self::new()
    }
}
