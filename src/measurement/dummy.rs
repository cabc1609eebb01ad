//! Simulated tool front-end.
//!
//! Used on the bench and in tests: no ADC reads, the reported temperature
//! is set directly (optionally through a simple first-order plant driven
//! by the duty cycle).

use crate::measurement::mux::MuxSelect;

/// Simulated measurement state.
#[derive(Debug, Clone)]
pub struct DummyFrontEnd {
    /// The reported temperature in °C.
    temperature_deg_c: f32,
}

impl DummyFrontEnd {
    /// A fresh simulated tool at room temperature.
    pub fn new() -> Self {
        Self {
            temperature_deg_c: 25.0,
        }
    }

    /// No ADC reads required.
    pub fn sequence(&self) -> &'static [MuxSelect] {
        &[]
    }

    /// The simulated temperature in °C.
    pub fn temperature(&self) -> f32 {
        self.temperature_deg_c
    }

    /// Set the simulated temperature.
    pub fn set_temperature(&mut self, temperature_deg_c: f32) {
        self.temperature_deg_c = temperature_deg_c;
    }
}

impl Default for DummyFrontEnd {
    fn default() -> Self {
        Self::new()
    }
}
