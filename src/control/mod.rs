//! The mains-synchronized control core.
//!
//! [`Control`] ties both channels, the tip pool and the board layer
//! together. It is driven entirely by interrupt callbacks:
//!
//! 1. `on_zero_crossing` opens the dead interval (all drives off) and
//!    arms the sample delay timer.
//! 2. `on_sample_timer` fires while the mains current is still near
//!    zero. It builds the conversion queue for this interval and starts
//!    the first conversion.
//! 3. `on_conversion_complete` routes each result and starts the next
//!    conversion. When the queue drains, the controllers run and the
//!    heater drives are set for the remainder of the half-cycle.
//! 4. `on_overcurrent` shuts both channels down immediately.
//!
//! Board crates wrap a `Control` in a blocking mutex (see
//! [`crate::SharedControl`]) and lock it from their handlers.

pub mod controller;
pub mod duty;
pub mod pid;
pub mod tbh;

use crate::board::{Board, ChannelId};
use crate::channel::Channel;
use crate::measurement::mux::MuxSelect;
use crate::measurement::{ADC_MAX, ANALOG_SUPPLY_V, MovingAverage};
use crate::settings::Persistent;
use crate::tip::{CalibrationIndex, TipPool};
use crate::tool::IronType;
use heapless::Vec;

/// The control interval, one mains half-cycle at 50 Hz, in ms.
pub const CONTROL_INTERVAL_MS: u32 = 10;
/// The control interval in seconds, for the controller gains.
pub const CONTROL_INTERVAL_S: f32 = 0.01;

/// Delay from the zero-crossing to the sampling burst, in µs.
pub const SAMPLE_DELAY_US: u32 = 500;

/// Tool identification runs every this many intervals.
const IDENTIFY_INTERVAL: u32 = 16;
/// The on-die temperature sensor is read every this many intervals.
const CHIP_TEMP_INTERVAL: u32 = 100;
/// A display redraw is requested every this many intervals.
const DISPLAY_REFRESH_INTERVAL: u32 = 25;
/// Channel temperatures are logged every this many intervals.
const REPORT_INTERVAL: u32 = 500;

/// Intervals to wait after the last settings change before persisting.
const SETTINGS_HOLDOFF_TICKS: u32 = 1000;

/// Worst case: three reads per channel, two ID reads, one chip read.
const QUEUE_DEPTH: usize = 12;

/// On-die temperature sensor voltage at 25 °C.
const CHIP_TEMP_V25: f32 = 0.76;
/// On-die temperature sensor slope in V/°C.
const CHIP_TEMP_SLOPE: f32 = 0.0025;

/// Convert a raw on-die sensor sample to °C.
fn chip_temperature_from_raw(raw: u16) -> f32 {
    let potential = ANALOG_SUPPLY_V * (raw as f32) / ADC_MAX;
    (potential - CHIP_TEMP_V25) / CHIP_TEMP_SLOPE + 25.0
}

/// The station's control core.
pub struct Control<B: Board> {
    /// The board support layer.
    board: B,
    /// Both heater channels.
    channels: [Channel; 2],
    /// The shared tip settings pool.
    tips: TipPool,
    /// The conversion queue of the current interval.
    queue: Vec<MuxSelect, QUEUE_DEPTH>,
    /// Index of the in-flight conversion within the queue.
    next_conversion: usize,
    /// Number of zero-crossings seen.
    crossing_count: u32,
    /// Number of completed conversions.
    conversion_count: u32,
    /// On-die temperature in °C.
    chip_temperature_avg: MovingAverage<8>,
    /// Unsaved settings changes exist.
    settings_dirty: bool,
    /// Intervals left before a dirty image should be persisted.
    settings_holdoff: u32,
}

impl<B: Board> Control<B> {
    /// Create the control core from loaded settings.
    pub fn new(board: B, persistent: Persistent) -> Self {
        Self {
            board,
            channels: [
                Channel::new(ChannelId::Ch1, persistent.channels[0]),
                Channel::new(ChannelId::Ch2, persistent.channels[1]),
            ],
            tips: persistent.tips,
            queue: Vec::new(),
            next_conversion: 0,
            crossing_count: 0,
            conversion_count: 0,
            chip_temperature_avg: MovingAverage::new(),
            settings_dirty: false,
            settings_holdoff: 0,
        }
    }

    /// Handle a mains zero-crossing.
    ///
    /// Opens the dead interval and arms the sample delay timer. Heating
    /// resumes when this interval's control update sets the drives again.
    pub fn on_zero_crossing(&mut self) {
        for channel in &self.channels {
            channel.force_drive_off(&mut self.board);
        }

        self.crossing_count = self.crossing_count.wrapping_add(1);

        if self.settings_dirty && self.settings_holdoff > 0 {
            self.settings_holdoff -= 1;
        }
        if self.crossing_count % DISPLAY_REFRESH_INTERVAL == 0 {
            self.board.request_display_refresh();
        }

        self.board.schedule_sample_delay(SAMPLE_DELAY_US);
    }

    /// Handle the sample delay timer: start this interval's conversions.
    pub fn on_sample_timer(&mut self) {
        let mut queue: Vec<MuxSelect, QUEUE_DEPTH> = Vec::new();
        let identify = self.crossing_count % IDENTIFY_INTERVAL == 0;

        for channel in &self.channels {
            for &mux in channel.sequence() {
                queue
                    .push(mux.with_channel(channel.id()))
                    .expect("conversion queue sized for the worst case");
            }
            // The ID divider shares a sense line with the tool; only read
            // it while the channel is unpowered.
            if identify && !channel.is_running() {
                queue
                    .push(MuxSelect::TOOL_ID.with_channel(channel.id()))
                    .expect("conversion queue sized for the worst case");
            }
        }
        if self.crossing_count % CHIP_TEMP_INTERVAL == 0 {
            queue
                .push(MuxSelect::CHIP_TEMPERATURE)
                .expect("conversion queue sized for the worst case");
        }

        self.queue = queue;
        self.next_conversion = 0;

        match self.queue.first() {
            Some(&mux) => self.board.start_conversion(mux),
            None => self.update_channels(),
        }
    }

    /// Handle one completed ADC conversion.
    ///
    /// The board passes back the `MuxSelect` it was started with. A
    /// result that does not match the queue is a sequencing bug and
    /// traps.
    pub fn on_conversion_complete(&mut self, mux: MuxSelect, raw: u16) {
        let Some(&expected) = self.queue.get(self.next_conversion) else {
            error!("Conversion result outside an active queue");
            return;
        };
        assert!(mux == expected, "conversion sequence out of sync");

        self.conversion_count = self.conversion_count.wrapping_add(1);

        let stripped = mux.strip_channel();
        match mux.channel {
            None => {
                if stripped == MuxSelect::CHIP_TEMPERATURE {
                    self.chip_temperature_avg
                        .push(chip_temperature_from_raw(raw));
                }
            }
            Some(id) => {
                let channel = &mut self.channels[id.index()];
                if stripped == MuxSelect::TOOL_ID {
                    channel.process_identification(raw, &mut self.tips, &mut self.board);
                } else {
                    channel.process_measurement(stripped, raw);
                }
            }
        }

        self.next_conversion += 1;
        match self.queue.get(self.next_conversion) {
            Some(&next) => self.board.start_conversion(next),
            None => self.update_channels(),
        }
    }

    /// Handle the overcurrent comparator.
    ///
    /// The shunt is shared between both outputs, so both channels shut
    /// down.
    pub fn on_overcurrent(&mut self) {
        for channel in &mut self.channels {
            if channel.measurement().is_some() {
                channel.set_overload(&mut self.board);
            }
        }
        self.board.request_display_refresh();
    }

    /// Run the per-interval control step and set the heater drives.
    fn update_channels(&mut self) {
        for channel in &mut self.channels {
            channel.update_control(CONTROL_INTERVAL_MS, &self.tips, &mut self.board);
            channel.update_drive(&mut self.board);
        }

        if self.crossing_count % REPORT_INTERVAL == 0 {
            for channel in &self.channels {
                if let Some(temperature) = channel.current_temperature_deg_c(&self.tips) {
                    trace!(
                        "Channel temperature {} °C at {} % duty",
                        temperature,
                        channel
                            .measurement()
                            .map(|m| m.controller().duty_cycle())
                            .unwrap_or(0)
                    );
                }
            }
        }
    }

    /// Access a channel.
    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    /// Access the tip pool.
    pub fn tips(&self) -> &TipPool {
        &self.tips
    }

    /// Access the board layer.
    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    /// Toggle heating of a channel.
    pub fn toggle_enable(&mut self, id: ChannelId) {
        if self.channels[id.index()].is_running() {
            self.disable(id);
        } else {
            self.enable(id);
        }
    }

    /// Start closed-loop heating of a channel.
    pub fn enable(&mut self, id: ChannelId) {
        self.channels[id.index()].enable(&self.tips, &mut self.board);
    }

    /// Stop heating of a channel.
    pub fn disable(&mut self, id: ChannelId) {
        self.channels[id.index()].disable(&self.tips, &mut self.board);
    }

    /// Change a channel's user temperature.
    pub fn set_user_temperature(&mut self, id: ChannelId, temperature_deg_c: i16) {
        self.channels[id.index()].set_user_temperature(
            temperature_deg_c,
            &self.tips,
            &mut self.board,
        );
    }

    /// Advance a channel to its next temperature preset.
    pub fn next_preset(&mut self, id: ChannelId) {
        self.channels[id.index()].next_preset(&self.tips, &mut self.board);
    }

    /// Overwrite one of a channel's persisted presets.
    pub fn set_preset_temperature(&mut self, id: ChannelId, slot: usize, temperature_deg_c: i16) {
        self.channels[id.index()].set_preset_temperature(slot, temperature_deg_c);
        self.mark_settings_dirty();
    }

    /// Select a different tip for a channel's attached iron.
    pub fn change_tip(&mut self, id: ChannelId, pool_index: u8) {
        self.channels[id.index()].change_tip(pool_index, &self.tips);
        self.mark_settings_dirty();
    }

    /// Put a channel into manual fixed-power mode.
    pub fn set_fixed_power(&mut self, id: ChannelId, percent: u16) {
        self.channels[id.index()].set_fixed_power(percent, &self.tips, &mut self.board);
    }

    /// Attach an iron type without identification (bench setups).
    pub fn force_iron_type(&mut self, id: ChannelId, iron_type: IronType) {
        self.channels[id.index()].force_iron_type(iron_type, &mut self.tips, &mut self.board);
    }

    /// Set the simulated temperature of an attached dummy tool.
    pub fn set_dummy_temperature(&mut self, id: ChannelId, temperature_deg_c: f32) {
        if let Some(dummy) = self.channels[id.index()]
            .measurement_mut()
            .and_then(|measurement| measurement.dummy_mut())
        {
            dummy.set_temperature(temperature_deg_c);
        }
    }

    /// The smoothed on-die temperature in °C.
    pub fn chip_temperature_deg_c(&self) -> f32 {
        self.chip_temperature_avg.average()
    }

    /// Number of zero-crossings seen.
    pub fn crossing_count(&self) -> u32 {
        self.crossing_count
    }

    /// Number of completed conversions.
    pub fn conversion_count(&self) -> u32 {
        self.conversion_count
    }

    /// Record the current reading as a calibration point of a channel's
    /// selected tip.
    pub fn save_calibration_point(&mut self, id: ChannelId, index: CalibrationIndex) -> bool {
        let channel = &self.channels[id.index()];
        let (Some(measurement), Some(tip_index)) = (channel.measurement(), channel.selected_tip())
        else {
            return false;
        };

        let saved = measurement.save_calibration_point(index, self.tips.get_mut(tip_index));
        if saved {
            self.mark_settings_dirty();
        }
        saved
    }

    /// The stored calibration pairs of a channel's selected tip.
    pub fn calibration_values(&self, id: ChannelId) -> Option<[(f32, f32); 3]> {
        let channel = &self.channels[id.index()];
        let (measurement, tip_index) = (channel.measurement()?, channel.selected_tip()?);
        Some(measurement.calibration_values(self.tips.get(tip_index)))
    }

    /// Record a settings change and restart the persistence holdoff.
    fn mark_settings_dirty(&mut self) {
        self.settings_dirty = true;
        self.settings_holdoff = SETTINGS_HOLDOFF_TICKS;
    }

    /// If true, the settled settings image should be written to storage.
    ///
    /// Polled by the (non-interrupt) persistence task.
    pub fn persistence_due(&self) -> bool {
        self.settings_dirty && self.settings_holdoff == 0
    }

    /// Snapshot the persistent state for storage and clear the dirty
    /// mark.
    pub fn take_persistent(&mut self) -> Persistent {
        self.settings_dirty = false;
        Persistent {
            channels: [
                *self.channels[0].settings(),
                *self.channels[1].settings(),
            ],
            tips: self.tips.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{HeaterLegs, VoltageSelect};
    use crate::channel::ChannelState;

    struct NullBoard;

    impl Board for NullBoard {
        fn start_conversion(&mut self, _mux: MuxSelect) {}
        fn schedule_sample_delay(&mut self, _delay_us: u32) {}
        fn set_heater_drive(&mut self, _channel: ChannelId, _legs: HeaterLegs) {}
        fn set_channel_voltage(&mut self, _channel: ChannelId, _select: VoltageSelect) {}
        fn set_channel_led(&mut self, _channel: ChannelId, _on: bool) {}
        fn request_display_refresh(&mut self) {}
    }

    #[test]
    fn chip_temperature_conversion() {
        // 0.76 V is the 25 °C reference point.
        let raw = (0.76 / ANALOG_SUPPLY_V * ADC_MAX) as u16;
        assert!((chip_temperature_from_raw(raw) - 25.0).abs() < 0.5);

        // Higher voltage means higher temperature.
        assert!(chip_temperature_from_raw(raw + 100) > 25.0);
    }

    #[test]
    fn settings_persist_after_holdoff() {
        let mut control = Control::new(NullBoard, Persistent::default());
        assert!(!control.persistence_due());

        control.set_preset_temperature(ChannelId::Ch1, 0, 290);
        assert!(!control.persistence_due());

        for _ in 0..SETTINGS_HOLDOFF_TICKS - 1 {
            control.on_zero_crossing();
        }
        assert!(!control.persistence_due());

        control.on_zero_crossing();
        assert!(control.persistence_due());

        let snapshot = control.take_persistent();
        assert_eq!(snapshot.channels[0].presets_deg_c[0], 290);
        assert!(!control.persistence_due());
    }

    #[test]
    fn settings_change_restarts_holdoff() {
        let mut control = Control::new(NullBoard, Persistent::default());

        control.set_preset_temperature(ChannelId::Ch1, 0, 290);
        for _ in 0..SETTINGS_HOLDOFF_TICKS - 1 {
            control.on_zero_crossing();
        }

        // A second change before the holdoff expires restarts it.
        control.set_preset_temperature(ChannelId::Ch2, 1, 360);
        control.on_zero_crossing();
        assert!(!control.persistence_due());
    }

    #[test]
    fn worst_case_conversion_queue_fits() {
        let mut control = Control::new(NullBoard, Persistent::default());

        // Tweezers carry the longest sequence (three reads). At crossing
        // zero, identification and the chip read are due as well.
        control.force_iron_type(ChannelId::Ch1, IronType::AttenTweezers);
        control.force_iron_type(ChannelId::Ch2, IronType::AttenTweezers);
        control.on_sample_timer();
    }

    #[test]
    fn overcurrent_trips_both_channels() {
        let mut control = Control::new(NullBoard, Persistent::default());
        control.force_iron_type(ChannelId::Ch1, IronType::Dummy);
        control.enable(ChannelId::Ch1);
        assert_eq!(
            control.channel(ChannelId::Ch1).state(),
            ChannelState::Active
        );

        control.on_overcurrent();
        assert_eq!(
            control.channel(ChannelId::Ch1).state(),
            ChannelState::Overload
        );
        assert_eq!(
            control.channel(ChannelId::Ch2).state(),
            ChannelState::NoTool
        );
    }
}
