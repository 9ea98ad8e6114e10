use std::fmt;

/// Input channel and amplifier gain used for the next conversion.
///
/// The HX711 has no registers; the selection is programmed by the number of extra clock pulses
/// issued after the 24 data bits of the current conversion have been clocked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelGain {
    NoChannel,
    #[default]
    ChannelA128,
    ChannelB32,
    ChannelA64,
}

impl ChannelGain {
    pub const ALL: [ChannelGain; 4] = [
        Self::NoChannel,
        Self::ChannelA128,
        Self::ChannelB32,
        Self::ChannelA64,
    ];

    /// Number of clock pulses following the 24th data bit.
    ///
    /// `NoChannel` issues none, which leaves the conversion handshake incomplete and the device
    /// in whatever mode it was in before.
    pub fn pulse_count(self) -> u32 {
        match self {
            Self::NoChannel   => 0,
            Self::ChannelA128 => 1, // 25 pulses total
            Self::ChannelB32  => 2, // 26 pulses total
            Self::ChannelA64  => 3, // 27 pulses total
        }
    }

    pub fn gain(self) -> Option<u32> {
        match self {
            Self::NoChannel   => None,
            Self::ChannelA128 => Some(128),
            Self::ChannelB32  => Some(32),
            Self::ChannelA64  => Some(64),
        }
    }

    pub(crate) fn storage_code(self) -> u8 {
        match self {
            Self::NoChannel   => 0,
            Self::ChannelA128 => 1,
            Self::ChannelB32  => 2,
            Self::ChannelA64  => 3,
        }
    }

    pub(crate) fn from_storage_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NoChannel),
            1 => Some(Self::ChannelA128),
            2 => Some(Self::ChannelB32),
            3 => Some(Self::ChannelA64),
            _ => None,
        }
    }

    pub(crate) fn from_pulse_count(pulses: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|selector| selector.pulse_count() == pulses)
    }
}

impl fmt::Display for ChannelGain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoChannel   => write!(f, "no channel"),
            Self::ChannelA128 => write!(f, "channel A with gain 128"),
            Self::ChannelB32  => write!(f, "channel B with gain 32"),
            Self::ChannelA64  => write!(f, "channel A with gain 64"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    #[default]
    Normal,
    PoweredDown,
}
