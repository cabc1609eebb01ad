//! Thermistor front-end (Weller RT tips).
//!
//! The RT tip integrates a resistive sensor in series with the heater.
//! It is read through a biased divider at unity gain; the resistance maps
//! to temperature through the tip's calibration table.

use crate::measurement::mux::MuxSelect;
use crate::measurement::{
    ADC_MAX, MovingAverage, TIP_PRESENT_RATIO, adc_value_to_potential, divider_resistance,
    interpolate_temperature,
};
use crate::tip::{CalibrationIndex, TipSettings};
use uom::si::electrical_resistance::ohm;
use uom::si::f32::ElectricalResistance;

/// Reference resistor of the sensor divider.
const REFERENCE_OHM: f32 = 100.0;

/// Plausible sensor resistance during calibration, in Ohm.
const PLAUSIBLE_OHM: core::ops::RangeInclusive<f32> = 10.0..=500.0;

/// The single biased sensor read per interval.
static SEQUENCE: [MuxSelect; 1] = [MuxSelect::THERMISTOR];

/// Convert a raw divider sample to the sensor resistance in Ohm.
fn raw_to_resistance_ohm(raw: u16) -> f32 {
    divider_resistance(
        adc_value_to_potential(raw),
        ElectricalResistance::new::<ohm>(REFERENCE_OHM),
    )
    .get::<ohm>()
}

/// Thermistor measurement state.
#[derive(Debug, Clone)]
pub struct ThermistorFrontEnd {
    /// Sensor resistance in Ohm.
    resistance_avg: MovingAverage<8>,
    /// Plausibility of the raw signal.
    present: bool,
}

impl ThermistorFrontEnd {
    /// A fresh front-end.
    pub fn new() -> Self {
        Self {
            resistance_avg: MovingAverage::new(),
            present: false,
        }
    }

    /// The ADC reads this front-end needs per interval.
    pub fn sequence(&self) -> &'static [MuxSelect] {
        &SEQUENCE
    }

    /// Fold in one raw sample.
    pub fn process_sample(&mut self, mux: MuxSelect, raw: u16) {
        if mux != MuxSelect::THERMISTOR {
            return;
        }

        self.present = (raw as f32) < TIP_PRESENT_RATIO * ADC_MAX;
        self.resistance_avg.push(raw_to_resistance_ohm(raw));
    }

    /// If true, the sensor resistance is plausible for an inserted tip.
    pub fn tip_present(&self) -> bool {
        self.present
    }

    /// The tool temperature in °C.
    pub fn temperature(&self, tip: &TipSettings, instant: bool) -> f32 {
        let resistance = if instant {
            self.resistance_avg.latest()
        } else {
            self.resistance_avg.average()
        };
        interpolate_temperature(tip, resistance)
    }

    /// Validate and record a calibration point from the latest sample.
    pub fn save_calibration_point(&self, index: CalibrationIndex, tip: &mut TipSettings) -> bool {
        let resistance = self.resistance_avg.latest();
        if !PLAUSIBLE_OHM.contains(&resistance) {
            return false;
        }

        tip.set_calibration_point(index, index.temperature_deg_c(), resistance);
        tip.set_flag(TipSettings::TEMP_CALIBRATED);
        true
    }
}

impl Default for ThermistorFrontEnd {
    fn default() -> Self {
        Self::new()
    }
}
