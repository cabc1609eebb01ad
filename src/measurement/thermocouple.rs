//! Thermocouple front-end (T12, JBC cartridges, hot tweezers).
//!
//! The tip thermocouple is read through the amplifier path; an NTC near
//! the connector provides the cold-junction temperature. Tweezers carry
//! one cartridge per leg and read both, controlled on their mean.

use crate::measurement::mux::{GainPath, MuxSelect, SubChannel};
use crate::measurement::{
    ADC_MAX, MovingAverage, TIP_PRESENT_RATIO, adc_value_to_potential, divider_resistance,
    interpolate_temperature,
};
use crate::tip::{CalibrationIndex, TipSettings};
use micromath::F32Ext;
use uom::si::electric_potential::millivolt;
use uom::si::electrical_resistance::ohm;
use uom::si::f32::ElectricalResistance;

/// Thermocouple amplifier gain without the boost stage.
const TC_GAIN: f32 = 120.0;
/// Additional gain of the boost stage (low-EMF cartridges).
const TC_BOOST_FACTOR: f32 = 2.0;

/// Cold-junction NTC nominal resistance at 25 °C.
const NTC_R25_OHM: f32 = 10_000.0;
/// Cold-junction NTC beta value.
const NTC_BETA: f32 = 3_950.0;
/// Pull-up of the cold-junction divider.
const NTC_PULL_UP_OHM: f32 = 10_000.0;
/// 25 °C in Kelvin.
const T25_K: f32 = 298.15;

/// Plausible thermocouple voltage during calibration, in mV.
const PLAUSIBLE_TC_MV: core::ops::RangeInclusive<f32> = 0.5..=12.0;
/// Plausible cold-junction temperature during calibration, in °C.
const PLAUSIBLE_CJ_DEG_C: core::ops::RangeInclusive<f32> = 0.0..=60.0;

/// Second tweezers leg, through the amplifier on sub-channel B.
const fn second_leg(boost: bool) -> MuxSelect {
    MuxSelect::compose(SubChannel::B, GainPath::Amplified, false, boost)
}

/// Single cartridge with boost, then cold junction.
static SEQUENCE_SINGLE_BOOST: [MuxSelect; 2] =
    [MuxSelect::thermocouple(true), MuxSelect::COLD_JUNCTION];
/// Single cartridge without boost, then cold junction.
static SEQUENCE_SINGLE: [MuxSelect; 2] =
    [MuxSelect::thermocouple(false), MuxSelect::COLD_JUNCTION];
/// Both tweezer legs, then cold junction.
static SEQUENCE_DUAL_BOOST: [MuxSelect; 3] = [
    MuxSelect::thermocouple(true),
    second_leg(true),
    MuxSelect::COLD_JUNCTION,
];

/// Convert a raw amplifier sample to thermocouple millivolts.
fn raw_to_thermocouple_mv(raw: u16, boost: bool) -> f32 {
    let gain = if boost {
        TC_GAIN * TC_BOOST_FACTOR
    } else {
        TC_GAIN
    };
    adc_value_to_potential(raw).get::<millivolt>() / gain
}

/// Convert a raw cold-junction divider sample to °C.
fn raw_to_cold_junction_deg_c(raw: u16) -> f32 {
    let resistance =
        divider_resistance(adc_value_to_potential(raw), ElectricalResistance::new::<ohm>(NTC_PULL_UP_OHM));

    let r = resistance.get::<ohm>();
    if r <= 0.0 {
        // Shorted divider; assume room temperature rather than feeding
        // the controller a singular value.
        return 25.0;
    }

    let t_inv = 1.0 / T25_K + (r / NTC_R25_OHM).ln() / NTC_BETA;
    1.0 / t_inv - 273.15
}

/// Thermocouple measurement state.
#[derive(Debug, Clone)]
pub struct ThermocoupleFrontEnd {
    /// Boost stage engaged for this cartridge type.
    boost: bool,
    /// True for tweezers with one cartridge per leg.
    dual: bool,
    /// Thermocouple voltage of the (first) leg, in mV.
    tc_avg: MovingAverage<8>,
    /// Thermocouple voltage of the second leg, in mV.
    tc_second_avg: MovingAverage<8>,
    /// Cold-junction temperature in °C.
    cold_junction_avg: MovingAverage<8>,
    /// Plausibility of the first leg's raw signal.
    leg_present: [bool; 2],
}

impl ThermocoupleFrontEnd {
    /// Front-end of a single-cartridge iron.
    pub fn single(boost: bool) -> Self {
        Self {
            boost,
            dual: false,
            tc_avg: MovingAverage::new(),
            tc_second_avg: MovingAverage::new(),
            cold_junction_avg: MovingAverage::new(),
            leg_present: [false, true],
        }
    }

    /// Front-end of dual-cartridge tweezers.
    pub fn dual(boost: bool) -> Self {
        Self {
            dual: true,
            leg_present: [false, false],
            ..Self::single(boost)
        }
    }

    /// True for tweezers.
    pub fn is_dual(&self) -> bool {
        self.dual
    }

    /// The ADC reads this front-end needs per interval.
    pub fn sequence(&self) -> &'static [MuxSelect] {
        match (self.dual, self.boost) {
            (true, _) => &SEQUENCE_DUAL_BOOST,
            (false, true) => &SEQUENCE_SINGLE_BOOST,
            (false, false) => &SEQUENCE_SINGLE,
        }
    }

    /// Fold in one raw sample.
    pub fn process_sample(&mut self, mux: MuxSelect, raw: u16) {
        let plausible = (raw as f32) < TIP_PRESENT_RATIO * ADC_MAX;

        if mux == MuxSelect::thermocouple(self.boost) {
            self.tc_avg.push(raw_to_thermocouple_mv(raw, self.boost));
            self.leg_present[0] = plausible;
        } else if self.dual && mux == second_leg(self.boost) {
            self.tc_second_avg
                .push(raw_to_thermocouple_mv(raw, self.boost));
            self.leg_present[1] = plausible;
        } else if mux == MuxSelect::COLD_JUNCTION {
            self.cold_junction_avg.push(raw_to_cold_junction_deg_c(raw));
        }
    }

    /// If true, all cartridge legs read plausible voltages.
    pub fn tip_present(&self) -> bool {
        self.leg_present[0] && self.leg_present[1]
    }

    /// The thermocouple voltage in mV, averaged or instantaneous.
    fn thermocouple_mv(&self, instant: bool) -> f32 {
        let pick = |avg: &MovingAverage<8>| if instant { avg.latest() } else { avg.average() };

        let first = pick(&self.tc_avg);
        if self.dual {
            0.5 * (first + pick(&self.tc_second_avg))
        } else {
            first
        }
    }

    /// The cold-junction temperature in °C.
    fn cold_junction_deg_c(&self, instant: bool) -> f32 {
        if instant {
            self.cold_junction_avg.latest()
        } else {
            self.cold_junction_avg.average()
        }
    }

    /// The tool temperature in °C.
    pub fn temperature(&self, tip: &TipSettings, instant: bool) -> f32 {
        interpolate_temperature(tip, self.thermocouple_mv(instant))
            + self.cold_junction_deg_c(instant)
    }

    /// Validate and record a calibration point from the latest samples.
    pub fn save_calibration_point(&self, index: CalibrationIndex, tip: &mut TipSettings) -> bool {
        let mv = self.thermocouple_mv(true);
        let cold_junction = self.cold_junction_deg_c(true);

        if !PLAUSIBLE_TC_MV.contains(&mv) || !PLAUSIBLE_CJ_DEG_C.contains(&cold_junction) {
            return false;
        }

        tip.set_calibration_point(index, index.temperature_deg_c(), mv);
        tip.set_flag(TipSettings::TEMP_CALIBRATED);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{IronType, properties_for};

    /// Raw ADC value for a thermocouple voltage in mV.
    fn raw_for_mv(mv: f32, boost: bool) -> u16 {
        let gain = if boost { TC_GAIN * TC_BOOST_FACTOR } else { TC_GAIN };
        (mv / 1000.0 * gain / super::super::ANALOG_SUPPLY_V * ADC_MAX) as u16
    }

    /// Raw ADC value for a cold-junction NTC resistance.
    fn raw_for_ntc(resistance_ohm: f32) -> u16 {
        let ratio = resistance_ohm / (resistance_ohm + NTC_PULL_UP_OHM);
        (ratio * ADC_MAX) as u16
    }

    fn t12_front_end() -> (ThermocoupleFrontEnd, TipSettings) {
        let properties = properties_for(IronType::T12).unwrap();
        (
            ThermocoupleFrontEnd::single(properties.gain_boost),
            TipSettings::with_defaults(0, properties),
        )
    }

    #[test]
    fn converts_calibrated_voltage_to_temperature() {
        let (mut fe, tip) = t12_front_end();

        // 6.9 mV is the 325 °C calibration point; NTC at 25 °C.
        fe.process_sample(MuxSelect::thermocouple(true), raw_for_mv(6.9, true));
        fe.process_sample(MuxSelect::COLD_JUNCTION, raw_for_ntc(10_000.0));

        let temperature = fe.temperature(&tip, false);
        assert!((temperature - 350.0).abs() < 2.0, "{}", temperature);
    }

    #[test]
    fn averaged_and_instant_temperatures_differ() {
        let (mut fe, tip) = t12_front_end();
        fe.process_sample(MuxSelect::COLD_JUNCTION, raw_for_ntc(10_000.0));

        fe.process_sample(MuxSelect::thermocouple(true), raw_for_mv(5.3, true));
        fe.process_sample(MuxSelect::thermocouple(true), raw_for_mv(6.9, true));

        // The instant value follows the latest sample, the average lags.
        assert!(fe.temperature(&tip, true) > fe.temperature(&tip, false));
    }

    #[test]
    fn open_input_clears_tip_present() {
        let (mut fe, _) = t12_front_end();

        fe.process_sample(MuxSelect::thermocouple(true), raw_for_mv(6.0, true));
        assert!(fe.tip_present());

        fe.process_sample(MuxSelect::thermocouple(true), (ADC_MAX * 0.95) as u16);
        assert!(!fe.tip_present());
    }

    #[test]
    fn dual_legs_average_and_gate_presence() {
        let properties = properties_for(IronType::AttenTweezers).unwrap();
        let mut fe = ThermocoupleFrontEnd::dual(properties.gain_boost);
        let tip = TipSettings::with_defaults(6, properties);

        fe.process_sample(MuxSelect::thermocouple(true), raw_for_mv(6.0, true));
        assert!(!fe.tip_present(), "second leg not seen yet");

        fe.process_sample(second_leg(true), raw_for_mv(8.0, true));
        fe.process_sample(MuxSelect::COLD_JUNCTION, raw_for_ntc(10_000.0));
        assert!(fe.tip_present());

        // Controlled on the mean of both legs: 7.0 mV.
        let expected = interpolate_temperature(&tip, 7.0) + 25.0;
        assert!((fe.temperature(&tip, false) - expected).abs() < 2.0);
    }

    #[test]
    fn calibration_rejects_implausible_samples() {
        let (mut fe, mut tip) = t12_front_end();

        // No cold-junction sample yet and a railed thermocouple input.
        fe.process_sample(MuxSelect::thermocouple(true), ADC_MAX as u16);
        assert!(!fe.save_calibration_point(CalibrationIndex::Low, &mut tip));
        assert!(!tip.has_flag(TipSettings::TEMP_CALIBRATED));
    }

    #[test]
    fn calibration_records_nominal_temperature_and_millivolts() {
        let (mut fe, mut tip) = t12_front_end();

        fe.process_sample(MuxSelect::thermocouple(true), raw_for_mv(5.4, true));
        fe.process_sample(MuxSelect::COLD_JUNCTION, raw_for_ntc(10_000.0));

        assert!(fe.save_calibration_point(CalibrationIndex::Low, &mut tip));
        assert!(tip.has_flag(TipSettings::TEMP_CALIBRATED));
        assert_eq!(tip.calibration_temp_value(CalibrationIndex::Low), 250.0);
        assert!((tip.calibration_measurement_value(CalibrationIndex::Low) - 5.4).abs() < 0.01);
    }
}
