//! The interface between the control core and the board support layer.
//!
//! Board crates own the actual peripherals. They implement [`Board`] and
//! call back into [`crate::control::Control`] from their interrupt
//! handlers:
//!
//! - zero-crossing comparator → `on_zero_crossing`
//! - one-shot timer armed by [`Board::schedule_sample_delay`] → `on_sample_timer`
//! - ADC end-of-conversion → `on_conversion_complete`
//! - overcurrent comparator → `on_overcurrent`

use crate::measurement::mux::MuxSelect;

/// One of the two physical heater channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelId {
    /// First channel.
    Ch1,
    /// Second channel.
    Ch2,
}

impl ChannelId {
    /// All channels, in sampling order.
    pub const ALL: [ChannelId; 2] = [ChannelId::Ch1, ChannelId::Ch2];

    /// The channel's array index.
    pub fn index(self) -> usize {
        match self {
            ChannelId::Ch1 => 0,
            ChannelId::Ch2 => 1,
        }
    }
}

/// Which legs of a half-bridge heater output to energize.
///
/// Tweezers carry one heating element per leg and drive them independently;
/// single irons only ever use the first leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaterLegs {
    /// No drive.
    Off,
    /// First leg only.
    First,
    /// Second leg only.
    Second,
    /// Both legs.
    Both,
}

impl HeaterLegs {
    /// If true, at least one leg is energized.
    pub fn is_on(self) -> bool {
        !matches!(self, HeaterLegs::Off)
    }
}

/// Heater supply voltage selection for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoltageSelect {
    /// Supply disconnected.
    Off,
    /// 12 V rail (low-voltage tools, e.g. tweezers).
    V12,
    /// 24 V rail.
    V24,
}

/// Peripheral operations the control core requires from the board layer.
///
/// All methods are non-blocking; asynchronous results (ADC completion,
/// timer expiry) return through the `Control::on_*` entry points.
pub trait Board {
    /// Start a single ADC conversion with the given front-end setting.
    ///
    /// The board reports completion via `Control::on_conversion_complete`,
    /// passing the same `MuxSelect` back.
    fn start_conversion(&mut self, mux: MuxSelect);

    /// Arm the one-shot hardware timer.
    ///
    /// Expiry arrives via `Control::on_sample_timer`.
    fn schedule_sample_delay(&mut self, delay_us: u32);

    /// Write the heater drive outputs of a channel.
    fn set_heater_drive(&mut self, channel: ChannelId, legs: HeaterLegs);

    /// Select the heater supply voltage of a channel.
    fn set_channel_voltage(&mut self, channel: ChannelId, select: VoltageSelect);

    /// Switch the channel's activity LED.
    fn set_channel_led(&mut self, channel: ChannelId, on: bool);

    /// Ask the (external) display module to redraw.
    fn request_display_refresh(&mut self);
}
