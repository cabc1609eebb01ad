//! A library of supported tools (soldering irons) and tool identification.
//!
//! Every tool carries an identification resistor in its connector. The
//! station samples the ID divider, converts the voltage to a resistance,
//! rounds it to the nearest E12 value and maps that to an iron type.

use crate::board::VoltageSelect;
use crate::measurement::{ANALOG_SUPPLY_V, adc_value_to_potential};
use uom::si::electric_potential::volt;
use uom::si::electrical_resistance::ohm;
use uom::si::f32::{ElectricPotential, ElectricalResistance};

/// The type of the attached iron.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IronType {
    /// Nothing attached, or the ID resistor was not recognized.
    Unknown,
    /// Hakko T12 style cartridge iron.
    T12,
    /// JBC cartridge iron.
    Jbc,
    /// Atten hot tweezers (two heating elements).
    AttenTweezers,
    /// Weller RT tip with a thermistor sensor.
    Weller,
    /// Simulated tool for bench tests without hardware.
    Dummy,
}

/// Default PID constants of a tool, fixed-point ×1000.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidDefaults {
    /// Proportional gain.
    pub kp_x1000: i32,
    /// Integral gain.
    pub ki_x1000: i32,
    /// Derivative gain.
    pub kd_x1000: i32,
    /// Integral term bound.
    pub i_limit_x1000: i32,
}

/// Properties of a tool (soldering iron).
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ToolProperties {
    /// The tool's name.
    pub name: &'static str,
    /// The iron type the properties belong to.
    pub iron_type: IronType,
    /// The identification resistor value in Ohm (E12).
    pub id_resistance_ohm: u32,
    /// Approximate heater resistance in Ohm, for power reporting.
    pub heater_resistance_ohm: f32,
    /// The heater supply rail this tool runs on.
    pub supply: VoltageSelect,
    /// Nominal heater voltage in Volt, matching `supply`.
    pub heater_voltage_v: f32,
    /// Maximum allowed tool power in Watt.
    pub max_power_w: f32,
    /// If true, the thermocouple amplifier boost stage is required
    /// (low-EMF sensors).
    pub gain_boost: bool,
    /// Factory calibration measurements at 250/325/400 °C, ×1000
    /// (millivolts for thermocouples, ohms for thermistors).
    pub default_calibration_x1000: [i32; 3],
    /// Default control constants for freshly allocated tips.
    pub pid_defaults: PidDefaults,
}

/// Make sure that all tools have unique `id` fields. Avoids accidental duplicates.
macro_rules! unique_items {
    // Main form: explicit `id`, and all fields as key: value pairs
    ( $( { id: $id:ident, $($field:ident : $value:expr),* $(,)? }),* $(,)?) => {{
        // Compile-time duplicate detection (E0428 on duplicate `id`)
        const _: () = { $( #[allow(dead_code)] const $id: () = ();)* };
        &[ $( ToolProperties { $($field : $value,)* },)* ]
    }};

    // Fallback to improve error messages
    ( $($tt:tt)* ) => {
        compile_error!(
            "unique_items! expects entries like:
             { id: <ident>, field1: <expr>, field2: <expr>, ... }"
        );
    };
}

/// List of all supported tools.
pub const TOOLS: &[ToolProperties] = unique_items![
    {
        id: T12,
        name: "T12",
        iron_type: IronType::T12,
        id_resistance_ohm: 2200,
        heater_resistance_ohm: 8.0,
        supply: VoltageSelect::V24,
        heater_voltage_v: 24.0,
        max_power_w: 72.0,
        gain_boost: true,
        // T12 thermocouple, roughly 21 µV/°C after the cartridge.
        default_calibration_x1000: [5_300, 6_900, 8_500],
        pid_defaults: PidDefaults {
            kp_x1000: 10_000,
            ki_x1000: 5_000,
            kd_x1000: 200,
            i_limit_x1000: 80_000,
        },
    },
    {
        id: JBC,
        name: "JBC",
        iron_type: IronType::Jbc,
        id_resistance_ohm: 3300,
        heater_resistance_ohm: 2.8,
        supply: VoltageSelect::V24,
        heater_voltage_v: 24.0,
        max_power_w: 130.0,
        gain_boost: false,
        default_calibration_x1000: [6_300, 8_300, 10_300],
        pid_defaults: PidDefaults {
            kp_x1000: 8_000,
            ki_x1000: 6_000,
            kd_x1000: 100,
            i_limit_x1000: 90_000,
        },
    },
    {
        id: ATTEN_TWEEZERS,
        name: "Tweezers",
        iron_type: IronType::AttenTweezers,
        id_resistance_ohm: 5600,
        heater_resistance_ohm: 4.0,
        supply: VoltageSelect::V12,
        heater_voltage_v: 12.0,
        max_power_w: 36.0,
        gain_boost: true,
        default_calibration_x1000: [4_900, 6_400, 7_900],
        pid_defaults: PidDefaults {
            kp_x1000: 12_000,
            ki_x1000: 4_000,
            kd_x1000: 200,
            i_limit_x1000: 70_000,
        },
    },
    {
        id: WELLER,
        name: "Weller",
        iron_type: IronType::Weller,
        id_resistance_ohm: 10000,
        heater_resistance_ohm: 12.0,
        supply: VoltageSelect::V24,
        heater_voltage_v: 24.0,
        max_power_w: 48.0,
        gain_boost: false,
        // RT thermistor resistance in ohms, ×1000.
        default_calibration_x1000: [40_000, 50_000, 60_000],
        pid_defaults: PidDefaults {
            kp_x1000: 6_000,
            ki_x1000: 3_000,
            kd_x1000: 150,
            i_limit_x1000: 60_000,
        },
    },
    {
        id: DUMMY,
        name: "Dummy",
        iron_type: IronType::Dummy,
        id_resistance_ohm: 0,
        heater_resistance_ohm: 10.0,
        supply: VoltageSelect::V12,
        heater_voltage_v: 12.0,
        max_power_w: 14.4,
        gain_boost: false,
        default_calibration_x1000: [5_000, 6_500, 8_000],
        pid_defaults: PidDefaults {
            kp_x1000: 10_000,
            ki_x1000: 5_000,
            kd_x1000: 0,
            i_limit_x1000: 80_000,
        },
    },
];

/// Look up the properties of an iron type.
pub fn properties_for(iron_type: IronType) -> Option<&'static ToolProperties> {
    TOOLS.iter().find(|tool| tool.iron_type == iron_type)
}

/// The station's ID divider pull-up to the analog supply.
const ID_PULL_UP_OHM: f32 = 10_000.0;

/// ADC fraction above which the divider is considered open (no tool).
const ID_OPEN_RATIO: f32 = 0.95;

/// E12 base values of one decade.
const E12_SERIES: [f32; 12] = [
    1.0, 1.2, 1.5, 1.8, 2.2, 2.7, 3.3, 3.9, 4.7, 5.6, 6.8, 8.2,
];

/// Convert a raw ID divider sample to the ID resistance.
///
/// `None` if the divider reads open (no tool attached).
pub fn id_resistance_from_raw(raw: u16) -> Option<ElectricalResistance> {
    let supply = ElectricPotential::new::<volt>(ANALOG_SUPPLY_V);
    let potential = adc_value_to_potential(raw);

    if potential >= supply * ID_OPEN_RATIO {
        return None;
    }

    let ratio = potential / (supply - potential);
    Some(ratio * ElectricalResistance::new::<ohm>(ID_PULL_UP_OHM))
}

/// Round a resistance to the nearest standard E12 value.
///
/// Nearest in geometric distance, so the decision boundary sits at the
/// geometric mean of adjacent E12 values and a ±10 % resistor tolerance
/// never flips to a neighbor.
pub fn e12_value(resistance: ElectricalResistance) -> Option<u32> {
    let ohms = resistance.get::<ohm>();
    if ohms < 50.0 || ohms > 200_000.0 {
        return None;
    }

    let mut best = None;
    let mut best_ratio = f32::INFINITY;
    for decade in [100.0_f32, 1_000.0, 10_000.0] {
        for base in E12_SERIES {
            let candidate = base * decade;
            let ratio = if ohms > candidate {
                ohms / candidate
            } else {
                candidate / ohms
            };
            if ratio < best_ratio {
                best_ratio = ratio;
                best = Some((candidate + 0.5) as u32);
            }
        }
    }

    best
}

/// Map an E12 identification resistance to an iron type.
pub fn iron_type_from_id(e12_ohm: u32) -> IronType {
    TOOLS
        .iter()
        .find(|tool| tool.id_resistance_ohm == e12_ohm && tool.id_resistance_ohm != 0)
        .map(|tool| tool.iron_type)
        .unwrap_or(IronType::Unknown)
}

/// Identify the attached iron from a raw ID divider sample.
pub fn identify(raw: u16) -> IronType {
    id_resistance_from_raw(raw)
        .and_then(e12_value)
        .map(iron_type_from_id)
        .unwrap_or(IronType::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::ADC_MAX;

    /// Raw ADC value for a given ID resistance against the 10 k pull-up.
    fn raw_for(resistance_ohm: f32) -> u16 {
        (ADC_MAX * resistance_ohm / (resistance_ohm + ID_PULL_UP_OHM)) as u16
    }

    #[test]
    fn nominal_resistors_map_to_iron_types() {
        assert_eq!(identify(raw_for(2_200.0)), IronType::T12);
        assert_eq!(identify(raw_for(3_300.0)), IronType::Jbc);
        assert_eq!(identify(raw_for(5_600.0)), IronType::AttenTweezers);
        assert_eq!(identify(raw_for(10_000.0)), IronType::Weller);
    }

    #[test]
    fn resistor_tolerance_does_not_flip_the_type() {
        for (nominal, iron_type) in [
            (2_200.0, IronType::T12),
            (3_300.0, IronType::Jbc),
            (5_600.0, IronType::AttenTweezers),
            (10_000.0, IronType::Weller),
        ] {
            for deviation in [0.92, 0.96, 1.04, 1.08] {
                assert_eq!(
                    identify(raw_for(nominal * deviation)),
                    iron_type,
                    "{} Ohm ×{}",
                    nominal,
                    deviation
                );
            }
        }
    }

    #[test]
    fn unassigned_e12_values_yield_unknown() {
        assert_eq!(identify(raw_for(4_700.0)), IronType::Unknown);
        assert_eq!(identify(raw_for(1_000.0)), IronType::Unknown);
        assert_eq!(identify(raw_for(82_000.0)), IronType::Unknown);
    }

    #[test]
    fn open_divider_yields_unknown() {
        assert_eq!(identify(ADC_MAX as u16), IronType::Unknown);
        assert_eq!(identify((ADC_MAX * 0.99) as u16), IronType::Unknown);
    }

    #[test]
    fn e12_rounding_uses_geometric_distance() {
        // 2 kOhm is arithmetically equidistant from 1.8 k and 2.2 k but
        // geometrically closer to 2.2 k.
        let r = ElectricalResistance::new::<ohm>(2_000.0);
        assert_eq!(e12_value(r), Some(2_200));
    }

    #[test]
    fn every_tool_id_resistor_is_e12() {
        for tool in TOOLS {
            if tool.id_resistance_ohm != 0 {
                let r = ElectricalResistance::new::<ohm>(tool.id_resistance_ohm as f32);
                assert_eq!(e12_value(r), Some(tool.id_resistance_ohm));
            }
        }
    }
}
