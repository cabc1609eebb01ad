//! Per-tip calibration and control constants, and the persisted tip pool.
//!
//! Every physical tip the user ever inserted gets one [`TipSettings`]
//! record: a 3-point temperature calibration table and the control
//! constants tuned for it. Records live in a fixed pool that is persisted
//! as a whole; free slots carry the [`TipSettings::FREE_ENTRY`] sentinel.

use crate::tool::{IronType, ToolProperties};
use micromath::F32Ext;
use serde::{Deserialize, Serialize};

/// Number of slots in the tip pool.
pub const NUM_TIP_SETTINGS: usize = 32;

/// The three fixed calibration temperatures in °C.
pub const CALIBRATION_TEMPERATURES_DEG_C: [f32; 3] = [250.0, 325.0, 400.0];

/// Index into the 3-point calibration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationIndex {
    /// 250 °C point.
    Low,
    /// 325 °C point.
    Mid,
    /// 400 °C point.
    High,
}

impl CalibrationIndex {
    /// All indices, in table order.
    pub const ALL: [CalibrationIndex; 3] = [
        CalibrationIndex::Low,
        CalibrationIndex::Mid,
        CalibrationIndex::High,
    ];

    /// The table position.
    pub fn index(self) -> usize {
        match self {
            CalibrationIndex::Low => 0,
            CalibrationIndex::Mid => 1,
            CalibrationIndex::High => 2,
        }
    }

    /// The nominal calibration temperature.
    pub fn temperature_deg_c(self) -> f32 {
        CALIBRATION_TEMPERATURES_DEG_C[self.index()]
    }
}

/// Static table of known tip names and the iron type they belong to.
///
/// [`TipSettings`] records reference entries by index, so the table is
/// append-only.
pub static TIP_NAMES: &[(&str, IronType)] = &[
    ("T12-BC2", IronType::T12),
    ("T12-D24", IronType::T12),
    ("T12-K", IronType::T12),
    ("T12-JL02", IronType::T12),
    ("C245", IronType::Jbc),
    ("C210", IronType::Jbc),
    ("GT2-TW", IronType::AttenTweezers),
    ("RT1", IronType::Weller),
    ("RT3", IronType::Weller),
    ("SIM", IronType::Dummy),
];

/// The iron type a tip name belongs to.
pub fn iron_type_of_name(name_index: u8) -> IronType {
    TIP_NAMES
        .get(name_index as usize)
        .map(|(_, iron_type)| *iron_type)
        .unwrap_or(IronType::Unknown)
}

/// The default tip name for an iron type (the first table entry).
pub fn default_name_for(iron_type: IronType) -> Option<u8> {
    TIP_NAMES
        .iter()
        .position(|(_, t)| *t == iron_type)
        .map(|index| index as u8)
}

/// Persisted settings of one physical tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TipSettings {
    /// Index into [`TIP_NAMES`], or [`TipSettings::FREE_ENTRY`].
    pub name_index: u8,
    /// Calibration state flags.
    pub flags: u8,
    /// Calibration temperatures, fixed-point ×10 °C.
    pub calibration_temperature_x10: [i16; 3],
    /// Calibration measurements, fixed-point ×1000 (mV or Ohm).
    pub calibration_measurement_x1000: [i32; 3],
    /// Proportional gain, ×1000.
    pub kp_x1000: i32,
    /// Integral gain, ×1000.
    pub ki_x1000: i32,
    /// Derivative gain, ×1000.
    pub kd_x1000: i32,
    /// Integral term bound, ×1000.
    pub i_limit_x1000: i32,
}

impl TipSettings {
    /// Name-index sentinel of an unused pool slot.
    pub const FREE_ENTRY: u8 = u8::MAX;

    /// The temperature calibration was performed by the user.
    pub const TEMP_CALIBRATED: u8 = 1 << 0;
    /// The control constants were tuned by the user.
    pub const PID_CALIBRATED: u8 = 1 << 1;

    /// An unused pool slot.
    pub const fn free() -> Self {
        Self {
            name_index: Self::FREE_ENTRY,
            flags: 0,
            calibration_temperature_x10: [2500, 3250, 4000],
            calibration_measurement_x1000: [0; 3],
            kp_x1000: 0,
            ki_x1000: 0,
            kd_x1000: 0,
            i_limit_x1000: 0,
        }
    }

    /// A fresh record with the tool's factory defaults.
    pub fn with_defaults(name_index: u8, properties: &ToolProperties) -> Self {
        Self {
            name_index,
            flags: 0,
            calibration_temperature_x10: [2500, 3250, 4000],
            calibration_measurement_x1000: properties.default_calibration_x1000,
            kp_x1000: properties.pid_defaults.kp_x1000,
            ki_x1000: properties.pid_defaults.ki_x1000,
            kd_x1000: properties.pid_defaults.kd_x1000,
            i_limit_x1000: properties.pid_defaults.i_limit_x1000,
        }
    }

    /// If true, the slot is unused.
    pub fn is_free(&self) -> bool {
        self.name_index == Self::FREE_ENTRY
    }

    /// The tip's name.
    pub fn name(&self) -> &'static str {
        TIP_NAMES
            .get(self.name_index as usize)
            .map(|(name, _)| *name)
            .unwrap_or("-")
    }

    /// The iron type this tip belongs to.
    pub fn iron_type(&self) -> IronType {
        iron_type_of_name(self.name_index)
    }

    /// Store one calibration point (temperature in °C, measurement in mV
    /// or Ohm), quantizing to the fixed-point storage format.
    pub fn set_calibration_point(
        &mut self,
        index: CalibrationIndex,
        temperature_deg_c: f32,
        measurement: f32,
    ) {
        self.calibration_temperature_x10[index.index()] =
            (temperature_deg_c * 10.0).round() as i16;
        self.calibration_measurement_x1000[index.index()] =
            (measurement * 1000.0).round() as i32;
    }

    /// The stored calibration temperature in °C.
    pub fn calibration_temp_value(&self, index: CalibrationIndex) -> f32 {
        self.calibration_temperature_x10[index.index()] as f32 / 10.0
    }

    /// The stored calibration measurement in mV or Ohm.
    pub fn calibration_measurement_value(&self, index: CalibrationIndex) -> f32 {
        self.calibration_measurement_x1000[index.index()] as f32 / 1000.0
    }

    /// Set a state flag.
    pub fn set_flag(&mut self, flag: u8) {
        self.flags |= flag;
    }

    /// If true, the flag is set.
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// The fixed-size pool of tip settings records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipPool {
    /// The slots; unused ones carry the free sentinel.
    entries: [TipSettings; NUM_TIP_SETTINGS],
}

impl TipPool {
    /// A pool of free slots.
    pub const fn new() -> Self {
        Self {
            entries: [TipSettings::free(); NUM_TIP_SETTINGS],
        }
    }

    /// The record at `index`.
    pub fn get(&self, index: u8) -> &TipSettings {
        &self.entries[index as usize]
    }

    /// The record at `index`, mutably.
    pub fn get_mut(&mut self, index: u8) -> &mut TipSettings {
        &mut self.entries[index as usize]
    }

    /// Find an allocated record by tip name.
    pub fn find_by_name(&self, name_index: u8) -> Option<u8> {
        self.entries
            .iter()
            .position(|tip| !tip.is_free() && tip.name_index == name_index)
            .map(|index| index as u8)
    }

    /// Find any allocated record for an iron type.
    pub fn first_for_iron(&self, iron_type: IronType) -> Option<u8> {
        self.entries
            .iter()
            .position(|tip| !tip.is_free() && tip.iron_type() == iron_type)
            .map(|index| index as u8)
    }

    /// Allocate a record for a tip name, initialized with factory defaults.
    ///
    /// Returns the existing record if the name is already allocated, or
    /// `None` if the pool is exhausted.
    pub fn allocate(&mut self, name_index: u8, properties: &ToolProperties) -> Option<u8> {
        if let Some(existing) = self.find_by_name(name_index) {
            return Some(existing);
        }

        let slot = self.entries.iter().position(|tip| tip.is_free())?;
        self.entries[slot] = TipSettings::with_defaults(name_index, properties);
        Some(slot as u8)
    }

    /// Release a record back to the pool.
    pub fn release(&mut self, index: u8) {
        self.entries[index as usize] = TipSettings::free();
    }

    /// Number of allocated records.
    pub fn allocated(&self) -> usize {
        self.entries.iter().filter(|tip| !tip.is_free()).count()
    }
}

impl Default for TipPool {
    fn default() -> Self {
        Self::new()
    }
}
