//! Tool measurement models.
//!
//! One model per iron front-end: thermocouple cartridges (T12, JBC, hot
//! tweezers), the Weller thermistor tip, and a simulated dummy for bench
//! tests. A model declares the ADC mux sequence it needs per control
//! interval, folds raw samples into moving averages, converts them to a
//! temperature through the tip's calibration table, and owns the
//! temperature controller and drive decision for its channel.

pub mod dummy;
pub mod mux;
pub mod thermistor;
pub mod thermocouple;

use crate::board::HeaterLegs;
use crate::control::controller::Controller;
use crate::tip::{CalibrationIndex, TipSettings};
use crate::tool::{IronType, ToolProperties, properties_for};
use dummy::DummyFrontEnd;
use mux::MuxSelect;
use thermistor::ThermistorFrontEnd;
use thermocouple::ThermocoupleFrontEnd;
use uom::si::electric_potential::volt;
use uom::si::f32::{ElectricPotential, ElectricalResistance};

/// ADC max. value (12 bit).
pub const ADC_MAX: f32 = 4095.0;
/// The analog supply voltage, which is also the ADC reference.
pub const ANALOG_SUPPLY_V: f32 = 3.3;

/// ADC fraction above which a sensor reading is implausible (open input).
pub const TIP_PRESENT_RATIO: f32 = 0.9;

/// Convert an ADC value to measured voltage.
pub fn adc_value_to_potential(value: u16) -> ElectricPotential {
    ElectricPotential::new::<volt>(ANALOG_SUPPLY_V * (value as f32) / ADC_MAX)
}

/// Resistance of the lower leg of a divider against `pull_up`.
pub(crate) fn divider_resistance(
    potential: ElectricPotential,
    pull_up: ElectricalResistance,
) -> ElectricalResistance {
    let supply = ElectricPotential::new::<volt>(ANALOG_SUPPLY_V);
    potential / (supply - potential) * pull_up
}

/// Windowed moving average with access to the latest raw sample.
#[derive(Debug, Clone)]
pub struct MovingAverage<const N: usize> {
    /// Sample ring.
    samples: [f32; N],
    /// Next write position.
    next: usize,
    /// Number of valid samples, up to `N`.
    filled: usize,
}

impl<const N: usize> MovingAverage<N> {
    /// An empty average.
    pub const fn new() -> Self {
        Self {
            samples: [0.0; N],
            next: 0,
            filled: 0,
        }
    }

    /// Fold in a sample.
    pub fn push(&mut self, sample: f32) {
        self.samples[self.next] = sample;
        self.next = (self.next + 1) % N;
        if self.filled < N {
            self.filled += 1;
        }
    }

    /// The mean over the window, or zero while empty.
    pub fn average(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        self.samples[..self.filled].iter().sum::<f32>() / self.filled as f32
    }

    /// The most recent sample, or zero while empty.
    pub fn latest(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        self.samples[(self.next + N - 1) % N]
    }

    /// Drop all history.
    pub fn reset(&mut self) {
        self.next = 0;
        self.filled = 0;
    }
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpolate a temperature from the tip's 3-point calibration table.
///
/// Piecewise linear over the two segments, extrapolating beyond the end
/// points. The table is assumed monotonic in the measurement.
pub(crate) fn interpolate_temperature(tip: &TipSettings, measurement: f32) -> f32 {
    let m = [
        tip.calibration_measurement_value(CalibrationIndex::Low),
        tip.calibration_measurement_value(CalibrationIndex::Mid),
        tip.calibration_measurement_value(CalibrationIndex::High),
    ];
    let t = [
        tip.calibration_temp_value(CalibrationIndex::Low),
        tip.calibration_temp_value(CalibrationIndex::Mid),
        tip.calibration_temp_value(CalibrationIndex::High),
    ];

    let (low, high) = if measurement < m[1] { (0, 1) } else { (1, 2) };
    let span = m[high] - m[low];
    if span == 0.0 {
        return t[low];
    }

    t[low] + (measurement - m[low]) * (t[high] - t[low]) / span
}

/// The sensor front-end of a measurement model.
#[derive(Debug, Clone)]
enum FrontEnd {
    /// Amplified thermocouple with NTC cold junction.
    Thermocouple(ThermocoupleFrontEnd),
    /// Biased thermistor (Weller).
    Thermistor(ThermistorFrontEnd),
    /// Simulated tool.
    Dummy(DummyFrontEnd),
}

/// The measurement model of one channel's attached tool.
#[derive(Debug, Clone)]
pub struct Measurement {
    /// The tool's static properties.
    properties: &'static ToolProperties,
    /// The sensor front-end.
    front_end: FrontEnd,
    /// The temperature controller for this tool.
    controller: Controller,
    /// Output power over the recent past, in Watt.
    power_avg: MovingAverage<16>,
}

impl Measurement {
    /// Create the measurement model for an identified iron type.
    ///
    /// `None` for [`IronType::Unknown`].
    pub fn for_iron(iron_type: IronType) -> Option<Self> {
        let properties = properties_for(iron_type)?;

        let (front_end, controller) = match iron_type {
            IronType::Unknown => return None,
            IronType::T12 | IronType::Jbc => (
                FrontEnd::Thermocouple(ThermocoupleFrontEnd::single(properties.gain_boost)),
                Controller::pid(),
            ),
            // No factory-tuned constants for tweezers; Take-Back-Half
            // copes with the unknown plant gain.
            IronType::AttenTweezers => (
                FrontEnd::Thermocouple(ThermocoupleFrontEnd::dual(properties.gain_boost)),
                Controller::take_back_half(0.5, 0.1, 0.2),
            ),
            IronType::Weller => (
                FrontEnd::Thermistor(ThermistorFrontEnd::new()),
                Controller::pid(),
            ),
            IronType::Dummy => (FrontEnd::Dummy(DummyFrontEnd::new()), Controller::pid()),
        };

        Some(Self {
            properties,
            front_end,
            controller,
            power_avg: MovingAverage::new(),
        })
    }

    /// The tool's static properties.
    pub fn properties(&self) -> &'static ToolProperties {
        self.properties
    }

    /// The ordered ADC reads this tool needs each control interval.
    pub fn sequence(&self) -> &'static [MuxSelect] {
        match &self.front_end {
            FrontEnd::Thermocouple(fe) => fe.sequence(),
            FrontEnd::Thermistor(fe) => fe.sequence(),
            FrontEnd::Dummy(fe) => fe.sequence(),
        }
    }

    /// Fold one raw ADC sample into the matching moving average.
    ///
    /// `mux` arrives with the channel bits already stripped.
    pub fn process_sample(&mut self, mux: MuxSelect, raw: u16) {
        match &mut self.front_end {
            FrontEnd::Thermocouple(fe) => fe.process_sample(mux, raw),
            FrontEnd::Thermistor(fe) => fe.process_sample(mux, raw),
            FrontEnd::Dummy(_) => {}
        }
    }

    /// If true, the raw signal is plausible for an inserted tip.
    pub fn tip_present(&self) -> bool {
        match &self.front_end {
            FrontEnd::Thermocouple(fe) => fe.tip_present(),
            FrontEnd::Thermistor(fe) => fe.tip_present(),
            FrontEnd::Dummy(_) => true,
        }
    }

    /// The long-run averaged tool temperature in °C.
    pub fn temperature(&self, tip: &TipSettings) -> f32 {
        match &self.front_end {
            FrontEnd::Thermocouple(fe) => fe.temperature(tip, false),
            FrontEnd::Thermistor(fe) => fe.temperature(tip, false),
            FrontEnd::Dummy(fe) => fe.temperature(),
        }
    }

    /// The tool temperature from the latest raw sample only.
    ///
    /// Snappier than [`Self::temperature`]; used during calibration.
    pub fn instant_temperature(&self, tip: &TipSettings) -> f32 {
        match &self.front_end {
            FrontEnd::Thermocouple(fe) => fe.temperature(tip, true),
            FrontEnd::Thermistor(fe) => fe.temperature(tip, true),
            FrontEnd::Dummy(fe) => fe.temperature(),
        }
    }

    /// Validate the current reading and record it as a calibration point.
    ///
    /// Returns false if the reading is outside the tool's plausible range,
    /// so the calibration wizard can reject the step.
    pub fn save_calibration_point(&self, index: CalibrationIndex, tip: &mut TipSettings) -> bool {
        let saved = match &self.front_end {
            FrontEnd::Thermocouple(fe) => fe.save_calibration_point(index, tip),
            FrontEnd::Thermistor(fe) => fe.save_calibration_point(index, tip),
            FrontEnd::Dummy(_) => false,
        };

        if !saved {
            warning!("Rejected implausible calibration sample");
        }
        saved
    }

    /// The stored calibration pairs, for display by the wizard.
    pub fn calibration_values(&self, tip: &TipSettings) -> [(f32, f32); 3] {
        CalibrationIndex::ALL.map(|index| {
            (
                tip.calibration_temp_value(index),
                tip.calibration_measurement_value(index),
            )
        })
    }

    /// Access the temperature controller.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Access the temperature controller mutably.
    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    /// Run one controller step against the averaged temperature.
    pub fn update_controller(&mut self, target_deg_c: f32, tip: &TipSettings) -> f32 {
        let actual = self.temperature(tip);
        self.controller.new_sample(target_deg_c, actual)
    }

    /// Advance the duty counter by one half-cycle and decide the drive.
    ///
    /// Also folds the resulting output power into the reporting average.
    pub fn drive(&mut self) -> HeaterLegs {
        let on = self.controller.advance_duty();

        let nominal_power_w = self.properties.heater_voltage_v * self.properties.heater_voltage_v
            / self.properties.heater_resistance_ohm;
        self.power_avg
            .push(if on { nominal_power_w } else { 0.0 });

        match (&self.front_end, on) {
            (_, false) => HeaterLegs::Off,
            (FrontEnd::Thermocouple(fe), true) if fe.is_dual() => HeaterLegs::Both,
            (_, true) => HeaterLegs::First,
        }
    }

    /// Average output power over the recent past, in Watt.
    pub fn power_w(&self) -> f32 {
        self.power_avg.average()
    }

    /// Simulated dummy front-end access, for bench setups.
    pub fn dummy_mut(&mut self) -> Option<&mut DummyFrontEnd> {
        match &mut self.front_end {
            FrontEnd::Dummy(fe) => Some(fe),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_over_window() {
        let mut avg = MovingAverage::<4>::new();
        assert_eq!(avg.average(), 0.0);

        avg.push(2.0);
        assert_eq!(avg.average(), 2.0);
        assert_eq!(avg.latest(), 2.0);

        for sample in [4.0, 6.0, 8.0, 10.0] {
            avg.push(sample);
        }
        // Window holds 4, 6, 8, 10.
        assert_eq!(avg.average(), 7.0);
        assert_eq!(avg.latest(), 10.0);
    }

    #[test]
    fn interpolation_hits_calibration_points() {
        let properties = properties_for(IronType::T12).unwrap();
        let tip = TipSettings::with_defaults(0, properties);

        assert!((interpolate_temperature(&tip, 5.3) - 250.0).abs() < 0.2);
        assert!((interpolate_temperature(&tip, 6.9) - 325.0).abs() < 0.2);
        assert!((interpolate_temperature(&tip, 8.5) - 400.0).abs() < 0.2);

        // Between and beyond points, linear in the segment.
        assert!((interpolate_temperature(&tip, 6.1) - 287.5).abs() < 0.5);
        assert!(interpolate_temperature(&tip, 9.0) > 400.0);
        assert!(interpolate_temperature(&tip, 5.0) < 250.0);
    }

    #[test]
    fn unknown_iron_has_no_measurement() {
        assert!(Measurement::for_iron(IronType::Unknown).is_none());
    }

    #[test]
    fn drive_reports_power_and_legs() {
        let mut measurement = Measurement::for_iron(IronType::Dummy).unwrap();
        measurement.controller_mut().set_fixed_duty(100);

        assert_eq!(measurement.drive(), HeaterLegs::First);
        // 12 V into 10 Ohm.
        assert!((measurement.power_w() - 14.4).abs() < 0.01);

        measurement.controller_mut().set_fixed_duty(0);
        assert_eq!(measurement.drive(), HeaterLegs::Off);
    }

    #[test]
    fn tweezers_drive_both_legs() {
        let mut measurement = Measurement::for_iron(IronType::AttenTweezers).unwrap();
        measurement.controller_mut().set_fixed_duty(100);
        assert_eq!(measurement.drive(), HeaterLegs::Both);
    }
}
