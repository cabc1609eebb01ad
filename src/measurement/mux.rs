//! Analog front-end multiplexer selection.
//!
//! A [`MuxSelect`] names the physical node and amplifier configuration the
//! next ADC conversion measures. Internally it is a plain struct of typed
//! fields; the hardware register bit pattern only exists at the boundary,
//! in [`MuxSelect::encode`].

use crate::board::ChannelId;

/// The sub-channel of a tool connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubChannel {
    /// First sense line (tip sensor).
    A,
    /// Second sense line (cold junction, second tip, or ID divider).
    B,
}

/// The amplifier path in front of the ADC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GainPath {
    /// Unity gain, straight into the ADC.
    Direct,
    /// Through the thermocouple amplifier.
    Amplified,
}

/// One analog front-end configuration for a single ADC conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MuxSelect {
    /// The physical channel, if attached.
    pub channel: Option<ChannelId>,
    /// The connector sense line.
    pub sub_channel: SubChannel,
    /// The amplifier path.
    pub gain: GainPath,
    /// Sensor bias current source enabled.
    pub bias: bool,
    /// Extra amplifier gain stage enabled.
    pub boost: bool,
}

/// Register bit for sub-channel B.
const BIT_SUB_B: u8 = 1 << 0;
/// Register bit for the amplified path.
const BIT_AMPLIFIED: u8 = 1 << 1;
/// Register bit for the bias source.
const BIT_BIAS: u8 = 1 << 2;
/// Register bit for the gain boost stage.
const BIT_BOOST: u8 = 1 << 3;
/// Register bit selecting the second channel.
const BIT_CHANNEL_2: u8 = 1 << 4;

impl MuxSelect {
    /// Compose a selection from its parts, without a channel attached.
    pub const fn compose(sub_channel: SubChannel, gain: GainPath, bias: bool, boost: bool) -> Self {
        Self {
            channel: None,
            sub_channel,
            gain,
            bias,
            boost,
        }
    }

    /// Thermocouple read through the amplifier.
    pub const fn thermocouple(boost: bool) -> Self {
        Self::compose(SubChannel::A, GainPath::Amplified, false, boost)
    }

    /// Cold-junction NTC read, biased, unity gain.
    pub const COLD_JUNCTION: Self = Self::compose(SubChannel::B, GainPath::Direct, true, false);

    /// Heater thermistor read, biased, unity gain (Weller tools).
    pub const THERMISTOR: Self = Self::compose(SubChannel::A, GainPath::Direct, true, false);

    /// Tool identification divider read.
    pub const TOOL_ID: Self = Self::compose(SubChannel::B, GainPath::Direct, false, false);

    /// Internal chip temperature sensor.
    ///
    /// Reserved combination; boards route it to the on-die sensor instead
    /// of the front end. Never carries a channel.
    pub const CHIP_TEMPERATURE: Self = Self::compose(SubChannel::B, GainPath::Direct, false, true);

    /// Attach a channel for enqueuing.
    pub const fn with_channel(self, channel: ChannelId) -> Self {
        Self {
            channel: Some(channel),
            ..self
        }
    }

    /// Strip the channel for dispatch to the measurement model.
    pub const fn strip_channel(self) -> Self {
        Self {
            channel: None,
            ..self
        }
    }

    /// Produce the front-end register bit pattern.
    pub fn encode(self) -> u8 {
        let mut bits = 0;
        if matches!(self.sub_channel, SubChannel::B) {
            bits |= BIT_SUB_B;
        }
        if matches!(self.gain, GainPath::Amplified) {
            bits |= BIT_AMPLIFIED;
        }
        if self.bias {
            bits |= BIT_BIAS;
        }
        if self.boost {
            bits |= BIT_BOOST;
        }
        if matches!(self.channel, Some(ChannelId::Ch2)) {
            bits |= BIT_CHANNEL_2;
        }
        bits
    }
}
