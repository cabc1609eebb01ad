//! Per-channel tool state machine.
//!
//! Each physical heater output owns one [`Channel`]: the identified iron
//! type with its measurement model, the selected tip, the user and target
//! temperatures, and the idle bookkeeping for setback and safety-off.
//!
//! State transitions that start or stop heating always run through
//! [`Channel::set_state`], which fail-safes the drive outputs; the only
//! exception is the overcurrent path, which shuts down directly.

use crate::board::{Board, ChannelId, HeaterLegs, VoltageSelect};
use crate::measurement::Measurement;
use crate::measurement::mux::MuxSelect;
use crate::settings::ChannelSettings;
use crate::tip::{TipPool, TipSettings, default_name_for};
use crate::tool::{IronType, identify};

/// The state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    /// Tool attached but not heating.
    Off,
    /// No tool attached (or unrecognized ID resistor).
    NoTool,
    /// Closed-loop heating at the user temperature.
    Active,
    /// Closed-loop heating at the reduced setback temperature.
    Setback,
    /// Shut down by the overcurrent handler; cleared by user interaction.
    Overload,
    /// Tool attached but its sensor reads implausible; drive stays off.
    NoTip,
    /// Manual test mode with a fixed duty value, controller bypassed.
    FixedPower,
}

/// One physical heater channel.
pub struct Channel {
    /// The channel's identity towards the board layer.
    id: ChannelId,
    /// The current state.
    state: ChannelState,
    /// The identified iron type.
    iron_type: IronType,
    /// The measurement model of the attached tool, if identified.
    measurement: Option<Measurement>,
    /// The channel's persisted settings.
    settings: ChannelSettings,
    /// The active preset slot (0..2).
    preset: usize,
    /// The user-set temperature in °C.
    user_temperature_deg_c: i16,
    /// Time since the last user interaction, in ms.
    idle_time_ms: u32,
    /// Pool index of the selected tip, or the free sentinel.
    selected_tip: u8,
}

impl Channel {
    /// Create a channel from its persisted settings.
    pub fn new(id: ChannelId, settings: ChannelSettings) -> Self {
        let preset = 1;
        Self {
            id,
            state: ChannelState::NoTool,
            iron_type: IronType::Unknown,
            measurement: None,
            user_temperature_deg_c: settings.presets_deg_c[preset],
            settings,
            preset,
            idle_time_ms: 0,
            selected_tip: TipSettings::FREE_ENTRY,
        }
    }

    /// The channel's identity.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// The current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// The identified iron type.
    pub fn iron_type(&self) -> IronType {
        self.iron_type
    }

    /// The channel's persisted settings.
    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    /// The measurement model, if a tool is identified.
    pub fn measurement(&self) -> Option<&Measurement> {
        self.measurement.as_ref()
    }

    /// The measurement model, mutably.
    pub fn measurement_mut(&mut self) -> Option<&mut Measurement> {
        self.measurement.as_mut()
    }

    /// Pool index of the selected tip, if any.
    pub fn selected_tip(&self) -> Option<u8> {
        (self.selected_tip != TipSettings::FREE_ENTRY).then_some(self.selected_tip)
    }

    /// If true, the channel heats (or would heat) this half-cycle group.
    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            ChannelState::Active | ChannelState::Setback | ChannelState::FixedPower
        )
    }

    /// The temperature the controller steers towards, in °C.
    ///
    /// In setback, the target is clamped to the lower of the setback and
    /// the user temperature.
    pub fn target_temperature_deg_c(&self) -> f32 {
        match self.state {
            ChannelState::Setback => self
                .settings
                .setback_temperature_deg_c
                .min(self.user_temperature_deg_c) as f32,
            _ => self.user_temperature_deg_c as f32,
        }
    }

    /// The user-set temperature in °C.
    pub fn user_temperature_deg_c(&self) -> i16 {
        self.user_temperature_deg_c
    }

    /// The smoothed tool temperature in °C, if measurable.
    pub fn current_temperature_deg_c(&self, tips: &TipPool) -> Option<f32> {
        let measurement = self.measurement.as_ref()?;
        let tip = self.selected_tip().map(|index| tips.get(index))?;
        Some(measurement.temperature(tip))
    }

    /// Average output power in Watt.
    pub fn power_w(&self) -> f32 {
        self.measurement
            .as_ref()
            .map(Measurement::power_w)
            .unwrap_or(0.0)
    }

    /// If true, the user temperature deviates from the active preset.
    pub fn is_temp_modified(&self) -> bool {
        self.user_temperature_deg_c != self.settings.presets_deg_c[self.preset]
    }

    /// Transition to a new state, fail-safing the outputs.
    pub fn set_state(&mut self, state: ChannelState, tips: &TipPool, board: &mut impl Board) {
        if state == self.state {
            return;
        }
        debug!("Channel state change to {}", state);

        match state {
            ChannelState::Active => {
                self.power_up(board);
                let tip_index = self.selected_tip();
                if let (Some(measurement), Some(tip_index)) =
                    (self.measurement.as_mut(), tip_index)
                {
                    let controller = measurement.controller_mut();
                    controller.set_control_parameters(tips.get(tip_index));
                    controller.enable(true);
                }
            }
            ChannelState::FixedPower => {
                // The caller programs the fixed duty; the controller
                // stays bypassed.
                self.power_up(board);
            }
            ChannelState::Setback => {}
            _ => self.power_down(board),
        }

        self.state = state;
    }

    /// Enable drive voltage and the activity LED.
    fn power_up(&mut self, board: &mut impl Board) {
        let supply = self
            .measurement
            .as_ref()
            .map(|measurement| measurement.properties().supply)
            .unwrap_or(VoltageSelect::Off);
        board.set_channel_voltage(self.id, supply);
        board.set_channel_led(self.id, true);
    }

    /// Force duty, drive and voltage off.
    fn power_down(&mut self, board: &mut impl Board) {
        if let Some(measurement) = self.measurement.as_mut() {
            measurement.controller_mut().enable(false);
        }
        board.set_heater_drive(self.id, HeaterLegs::Off);
        board.set_channel_voltage(self.id, VoltageSelect::Off);
        board.set_channel_led(self.id, false);
    }

    /// Unconditional hard shutdown, used by the overcurrent handler.
    ///
    /// Bypasses the regular state entry/exit logic.
    pub fn set_overload(&mut self, board: &mut impl Board) {
        self.power_down(board);
        self.state = ChannelState::Overload;
        warning!("Channel overload shutdown");
    }

    /// Process a raw sample of the tool identification divider.
    ///
    /// A change between two known iron types always passes through
    /// `Unknown` first, so drive and voltage are released before the new
    /// measurement model takes over.
    pub fn process_identification(
        &mut self,
        raw: u16,
        tips: &mut TipPool,
        board: &mut impl Board,
    ) {
        let detected = identify(raw);
        if detected == self.iron_type {
            return;
        }

        if self.iron_type != IronType::Unknown && detected != IronType::Unknown {
            self.apply_iron_type(IronType::Unknown, tips, board);
        } else {
            self.apply_iron_type(detected, tips, board);
        }
    }

    /// Attach an iron type directly (bench setups and the dummy tool).
    pub fn force_iron_type(&mut self, iron_type: IronType, tips: &mut TipPool, board: &mut impl Board) {
        self.apply_iron_type(iron_type, tips, board);
    }

    /// Swap the measurement model and auto-select a tip.
    fn apply_iron_type(&mut self, iron_type: IronType, tips: &mut TipPool, board: &mut impl Board) {
        debug!("Identified iron type {}", iron_type);

        self.measurement = Measurement::for_iron(iron_type);
        self.iron_type = iron_type;

        match self.measurement.as_ref() {
            None => {
                self.selected_tip = TipSettings::FREE_ENTRY;
                self.set_state(ChannelState::NoTool, tips, board);
            }
            Some(measurement) => {
                self.selected_tip = self
                    .auto_select_tip(iron_type, measurement.properties(), tips)
                    .unwrap_or(TipSettings::FREE_ENTRY);
                self.settings.selected_tip = self.selected_tip;
                self.set_state(ChannelState::Off, tips, board);
            }
        }
    }

    /// Pick a tip for a freshly identified iron.
    ///
    /// Reuses the last tip for this iron type, else any allocated tip of
    /// the type, else allocates the type's default tip name.
    fn auto_select_tip(
        &self,
        iron_type: IronType,
        properties: &'static crate::tool::ToolProperties,
        tips: &mut TipPool,
    ) -> Option<u8> {
        let last = self.settings.selected_tip;
        if last != TipSettings::FREE_ENTRY
            && !tips.get(last).is_free()
            && tips.get(last).iron_type() == iron_type
        {
            return Some(last);
        }

        if let Some(existing) = tips.first_for_iron(iron_type) {
            return Some(existing);
        }

        let allocated = default_name_for(iron_type)
            .and_then(|name_index| tips.allocate(name_index, properties));
        if allocated.is_none() {
            error!("Tip pool exhausted");
        }
        allocated
    }

    /// Select a different tip for the attached iron.
    ///
    /// A tip of a foreign iron type is a logic bug upstream and traps.
    pub fn change_tip(&mut self, pool_index: u8, tips: &TipPool) {
        let tip = tips.get(pool_index);
        assert!(
            tip.iron_type() == self.iron_type,
            "tip does not match the attached iron"
        );

        self.selected_tip = pool_index;
        self.settings.selected_tip = pool_index;
        if let Some(measurement) = self.measurement.as_mut() {
            measurement.controller_mut().set_control_parameters(tip);
        }
    }

    /// Start closed-loop heating, if a tool and tip are present.
    pub fn enable(&mut self, tips: &TipPool, board: &mut impl Board) {
        if self.measurement.is_none() || self.selected_tip().is_none() {
            warning!("Cannot enable channel without tool and tip");
            return;
        }
        self.idle_time_ms = 0;
        self.set_state(ChannelState::Active, tips, board);
    }

    /// Stop heating.
    pub fn disable(&mut self, tips: &TipPool, board: &mut impl Board) {
        if self.is_running() || self.state == ChannelState::Overload {
            self.set_state(ChannelState::Off, tips, board);
        }
    }

    /// Enter manual fixed-power mode.
    pub fn set_fixed_power(&mut self, percent: u16, tips: &TipPool, board: &mut impl Board) {
        if self.measurement.is_none() {
            return;
        }
        self.set_state(ChannelState::FixedPower, tips, board);
        if let Some(measurement) = self.measurement.as_mut() {
            measurement.controller_mut().set_fixed_duty(percent);
        }
    }

    /// Register a user interaction: reset the idle timer and wake from
    /// setback.
    pub fn touch(&mut self, tips: &TipPool, board: &mut impl Board) {
        self.idle_time_ms = 0;
        if self.state == ChannelState::Setback {
            self.set_state(ChannelState::Active, tips, board);
        }
    }

    /// Advance the idle timers by one control interval.
    pub fn increment_idle_time(&mut self, ms: u32, tips: &TipPool, board: &mut impl Board) {
        if !self.is_running() {
            return;
        }
        self.idle_time_ms = self.idle_time_ms.saturating_add(ms);

        if self.idle_time_ms >= self.settings.safety_off_time_ms {
            self.set_state(ChannelState::Off, tips, board);
        } else if self.state == ChannelState::Active
            && self.idle_time_ms >= self.settings.setback_time_ms
        {
            self.set_state(ChannelState::Setback, tips, board);
        }
    }

    /// Change the user temperature.
    pub fn set_user_temperature(&mut self, temperature_deg_c: i16, tips: &TipPool, board: &mut impl Board) {
        self.user_temperature_deg_c = temperature_deg_c;
        self.touch(tips, board);
    }

    /// Overwrite one of the persisted temperature presets.
    pub fn set_preset_temperature(&mut self, slot: usize, temperature_deg_c: i16) {
        self.settings.presets_deg_c[slot] = temperature_deg_c;
        if slot == self.preset {
            self.user_temperature_deg_c = temperature_deg_c;
        }
    }

    /// Advance to the next temperature preset.
    pub fn next_preset(&mut self, tips: &TipPool, board: &mut impl Board) {
        self.preset = (self.preset + 1) % self.settings.presets_deg_c.len();
        self.user_temperature_deg_c = self.settings.presets_deg_c[self.preset];
        self.touch(tips, board);
    }

    /// The ADC reads this channel needs in the upcoming interval.
    pub fn sequence(&self) -> &'static [MuxSelect] {
        self.measurement
            .as_ref()
            .map(Measurement::sequence)
            .unwrap_or(&[])
    }

    /// Route one raw sample (channel bits stripped) to the measurement.
    pub fn process_measurement(&mut self, mux: MuxSelect, raw: u16) {
        if let Some(measurement) = self.measurement.as_mut() {
            measurement.process_sample(mux, raw);
        }
    }

    /// Run the per-interval control step.
    ///
    /// Checks sensor plausibility, runs the controller while in closed
    /// loop, and advances the idle timers.
    pub fn update_control(&mut self, interval_ms: u32, tips: &TipPool, board: &mut impl Board) {
        let Some(tip_present) = self.measurement.as_ref().map(Measurement::tip_present) else {
            return;
        };

        if self.is_running() && !tip_present {
            self.set_state(ChannelState::NoTip, tips, board);
        } else if self.state == ChannelState::NoTip && tip_present {
            self.set_state(ChannelState::Off, tips, board);
        }

        if matches!(self.state, ChannelState::Active | ChannelState::Setback) {
            let target = self.target_temperature_deg_c();
            let tip_index = self.selected_tip();
            if let (Some(measurement), Some(tip_index)) =
                (self.measurement.as_mut(), tip_index)
            {
                measurement.update_controller(target, tips.get(tip_index));
            }
        }

        self.increment_idle_time(interval_ms, tips, board);
    }

    /// Apply the duty decision for the next half-cycle to the outputs.
    pub fn update_drive(&mut self, board: &mut impl Board) {
        if !self.is_running() {
            return;
        }
        if let Some(measurement) = self.measurement.as_mut() {
            let legs = measurement.drive();
            board.set_heater_drive(self.id, legs);
        }
    }

    /// Force the raw drive output off, without touching the duty state.
    ///
    /// Called at every zero-crossing for the dead interval before
    /// sampling.
    pub fn force_drive_off(&self, board: &mut impl Board) {
        board.set_heater_drive(self.id, HeaterLegs::Off);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::ADC_MAX;
    use crate::settings::ChannelSettings;

    /// Board stand-in that swallows all outputs.
    struct NullBoard;

    impl Board for NullBoard {
        fn start_conversion(&mut self, _mux: MuxSelect) {}
        fn schedule_sample_delay(&mut self, _delay_us: u32) {}
        fn set_heater_drive(&mut self, _channel: ChannelId, _legs: HeaterLegs) {}
        fn set_channel_voltage(&mut self, _channel: ChannelId, _select: VoltageSelect) {}
        fn set_channel_led(&mut self, _channel: ChannelId, _on: bool) {}
        fn request_display_refresh(&mut self) {}
    }

    /// Raw ID divider value for a resistance against the 10 k pull-up.
    fn id_raw(resistance_ohm: f32) -> u16 {
        (ADC_MAX * resistance_ohm / (resistance_ohm + 10_000.0)) as u16
    }

    fn active_dummy_channel(tips: &mut TipPool) -> (Channel, NullBoard) {
        let mut board = NullBoard;
        let mut channel = Channel::new(ChannelId::Ch1, ChannelSettings::default());
        channel.force_iron_type(IronType::Dummy, tips, &mut board);
        channel.enable(tips, &mut board);
        assert_eq!(channel.state(), ChannelState::Active);
        (channel, board)
    }

    #[test]
    fn idle_crosses_setback_and_safety_off() {
        let mut tips = TipPool::new();
        let (mut channel, mut board) = active_dummy_channel(&mut tips);

        channel.increment_idle_time(299_999, &tips, &mut board);
        assert_eq!(channel.state(), ChannelState::Active);

        channel.increment_idle_time(1, &tips, &mut board);
        assert_eq!(channel.state(), ChannelState::Setback);
        // Setback target is the lower of setback and user temperature.
        assert_eq!(channel.target_temperature_deg_c(), 150.0);

        channel.increment_idle_time(900_000, &tips, &mut board);
        assert_eq!(channel.state(), ChannelState::Off);
    }

    #[test]
    fn interaction_wakes_from_setback() {
        let mut tips = TipPool::new();
        let (mut channel, mut board) = active_dummy_channel(&mut tips);

        channel.increment_idle_time(300_000, &tips, &mut board);
        assert_eq!(channel.state(), ChannelState::Setback);

        channel.touch(&tips, &mut board);
        assert_eq!(channel.state(), ChannelState::Active);
        assert_eq!(channel.target_temperature_deg_c(), 350.0);

        // The idle timer restarted.
        channel.increment_idle_time(299_999, &tips, &mut board);
        assert_eq!(channel.state(), ChannelState::Active);
    }

    #[test]
    fn identification_selects_tool_and_tip() {
        let mut tips = TipPool::new();
        let mut board = NullBoard;
        let mut channel = Channel::new(ChannelId::Ch1, ChannelSettings::default());
        assert_eq!(channel.state(), ChannelState::NoTool);

        channel.process_identification(id_raw(2_200.0), &mut tips, &mut board);
        assert_eq!(channel.iron_type(), IronType::T12);
        assert_eq!(channel.state(), ChannelState::Off);

        // The default T12 tip was allocated and selected.
        let tip_index = channel.selected_tip().unwrap();
        assert_eq!(tips.get(tip_index).name(), "T12-BC2");
    }

    #[test]
    fn iron_change_passes_through_unknown() {
        let mut tips = TipPool::new();
        let mut board = NullBoard;
        let mut channel = Channel::new(ChannelId::Ch1, ChannelSettings::default());

        channel.process_identification(id_raw(2_200.0), &mut tips, &mut board);
        assert_eq!(channel.iron_type(), IronType::T12);

        // First pass releases the old tool entirely.
        channel.process_identification(id_raw(10_000.0), &mut tips, &mut board);
        assert_eq!(channel.iron_type(), IronType::Unknown);
        assert_eq!(channel.state(), ChannelState::NoTool);

        // Second pass attaches the new one.
        channel.process_identification(id_raw(10_000.0), &mut tips, &mut board);
        assert_eq!(channel.iron_type(), IronType::Weller);
    }

    #[test]
    fn open_divider_forces_no_tool() {
        let mut tips = TipPool::new();
        let mut board = NullBoard;
        let mut channel = Channel::new(ChannelId::Ch1, ChannelSettings::default());

        channel.process_identification(id_raw(2_200.0), &mut tips, &mut board);
        channel.process_identification(ADC_MAX as u16, &mut tips, &mut board);
        assert_eq!(channel.iron_type(), IronType::Unknown);
        assert_eq!(channel.state(), ChannelState::NoTool);
    }

    #[test]
    fn overload_is_cleared_by_user_interaction() {
        let mut tips = TipPool::new();
        let (mut channel, mut board) = active_dummy_channel(&mut tips);

        channel.set_overload(&mut board);
        assert_eq!(channel.state(), ChannelState::Overload);

        // Idle bookkeeping no longer applies.
        channel.increment_idle_time(10_000_000, &tips, &mut board);
        assert_eq!(channel.state(), ChannelState::Overload);

        channel.disable(&tips, &mut board);
        assert_eq!(channel.state(), ChannelState::Off);
        channel.enable(&tips, &mut board);
        assert_eq!(channel.state(), ChannelState::Active);
    }

    #[test]
    #[should_panic]
    fn foreign_tip_assignment_traps() {
        let mut tips = TipPool::new();
        let mut board = NullBoard;
        let mut channel = Channel::new(ChannelId::Ch1, ChannelSettings::default());

        channel.process_identification(id_raw(2_200.0), &mut tips, &mut board);
        let weller_tip = tips
            .allocate(7, crate::tool::properties_for(IronType::Weller).unwrap())
            .unwrap();
        channel.change_tip(weller_tip, &tips);
    }

    #[test]
    fn preset_cycling_and_modification() {
        let mut tips = TipPool::new();
        let mut board = NullBoard;
        let mut channel = Channel::new(ChannelId::Ch1, ChannelSettings::default());
        assert_eq!(channel.user_temperature_deg_c(), 350);
        assert!(!channel.is_temp_modified());

        channel.set_user_temperature(365, &tips, &mut board);
        assert!(channel.is_temp_modified());

        channel.next_preset(&tips, &mut board);
        assert_eq!(channel.user_temperature_deg_c(), 400);
        assert!(!channel.is_temp_modified());
    }
}
