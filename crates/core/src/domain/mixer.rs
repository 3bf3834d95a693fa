//! Mixer backend capability
//!
//! The core never talks to a sound system directly. Platform adapters (ALSA
//! lives in the `infra` crate) and the in-process [`memory::MemoryMixer`]
//! implement [`MixerBackend`], and every volume or switch access made by the
//! engine goes through it.

pub mod memory;

use crate::domain::curve;
use crate::domain::range::Range;
use std::fmt;
use thiserror::Error;

/// Errors reported by a mixer backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// No element with this name exists on the mixer
    #[error("mixer element not found: {0}")]
    ElementNotFound(String),

    /// The mixer device could not be opened
    #[error("failed to open mixer '{device}': {message}")]
    Open { device: String, message: String },

    /// A read or write call was rejected by the sound system
    #[error("{operation} failed on element '{element}': {message}")]
    Call {
        operation: &'static str,
        element: String,
        message: String,
    },

    /// The element does not describe its volume in decibels
    #[error("element '{0}' has no decibel scale")]
    NoDecibelScale(String),

    /// The handle does not belong to this backend
    #[error("unknown element handle #{0}")]
    UnknownElement(usize),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Opaque handle to a resolved mixer element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(usize);

impl ElementId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Playback channel of a stereo element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    FrontLeft,
    FrontRight,
}

impl Channel {
    pub const STEREO: [Channel; 2] = [Channel::FrontLeft, Channel::FrontRight];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::FrontLeft => write!(f, "front left"),
            Channel::FrontRight => write!(f, "front right"),
        }
    }
}

/// How a write that needs device quantization resolves in-between values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundDirection {
    Up,
    Down,
    #[default]
    Nearest,
}

impl RoundDirection {
    /// Direction that keeps a change moving the way `delta` points
    pub fn for_delta(delta: i64) -> Self {
        match delta.signum() {
            1 => RoundDirection::Up,
            -1 => RoundDirection::Down,
            _ => RoundDirection::Nearest,
        }
    }

    /// Round `value` to an integer in this direction
    ///
    /// Nearest rounds half away from zero. Infinite inputs saturate.
    pub fn apply(self, value: f64) -> i64 {
        let rounded = match self {
            RoundDirection::Up => value.ceil(),
            RoundDirection::Down => value.floor(),
            RoundDirection::Nearest => value.round(),
        };
        rounded as i64
    }
}

/// Summary of one mixer element, used for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    pub name: String,
    pub has_playback_volume: bool,
    pub has_playback_switch: bool,
}

/// Capability interface for a hardware (or simulated) mixer
///
/// Decibel primitives work in hundredths of a decibel, the unit ALSA uses
/// internally. The provided [`channel_decibel`](Self::channel_decibel) and
/// [`set_decibel_all`](Self::set_decibel_all) expose whole decibels, and the
/// normalized volume methods implement the alsamixer perceptual curve on top
/// of the primitives.
pub trait MixerBackend {
    /// Look up an element by name, ignoring ASCII case
    fn resolve_element(&self, name: &str) -> Result<ElementId>;

    /// Name of a resolved element
    fn element_name(&self, elem: ElementId) -> Result<&str>;

    /// All elements the mixer exposes
    fn elements(&self) -> Result<Vec<ElementInfo>>;

    /// Native playback volume range
    fn volume_range(&self, elem: ElementId) -> Result<Range>;

    fn channel_volume(&self, elem: ElementId, channel: Channel) -> Result<i64>;

    fn set_channel_volume(&self, elem: ElementId, channel: Channel, value: i64) -> Result<()>;

    /// Decibel range in hundredths of a decibel, if the element has one
    fn decibel_range_hundredths(&self, elem: ElementId) -> Result<Option<Range>>;

    fn channel_decibel_hundredths(&self, elem: ElementId, channel: Channel) -> Result<i64>;

    fn set_channel_decibel_hundredths(
        &self,
        elem: ElementId,
        channel: Channel,
        value: i64,
        direction: RoundDirection,
    ) -> Result<()>;

    fn has_playback_switch(&self, elem: ElementId) -> bool;

    fn playback_switch(&self, elem: ElementId, channel: Channel) -> Result<bool>;

    fn set_playback_switch_all(&self, elem: ElementId, on: bool) -> Result<()>;

    /// Write the same raw value to both channels
    fn set_volume_all(&self, elem: ElementId, value: i64) -> Result<()> {
        for channel in Channel::STEREO {
            self.set_channel_volume(elem, channel, value)?;
        }
        Ok(())
    }

    /// Channel volume in whole decibels (hundredths divided by 100)
    fn channel_decibel(&self, elem: ElementId, channel: Channel) -> Result<i64> {
        Ok(self.channel_decibel_hundredths(elem, channel)? / 100)
    }

    /// Set both channels to `value` whole decibels
    fn set_decibel_all(&self, elem: ElementId, value: i64, direction: RoundDirection) -> Result<()> {
        for channel in Channel::STEREO {
            self.set_channel_decibel_hundredths(elem, channel, value.saturating_mul(100), direction)?;
        }
        Ok(())
    }

    /// Perceptual volume of a channel in `[0, 1]`
    fn normalized_volume(&self, elem: ElementId, channel: Channel) -> Result<f64> {
        match self.decibel_range_hundredths(elem)? {
            Some(db) if db.min < db.max => {
                let value = self.channel_decibel_hundredths(elem, channel)?;
                Ok(curve::normalize_decibels(value, db))
            }
            _ => {
                let raw = self.volume_range(elem)?;
                if raw.min >= raw.max {
                    return Ok(0.0);
                }
                let value = self.channel_volume(elem, channel)?;
                Ok(curve::normalize_linear(value, raw))
            }
        }
    }

    /// Set a channel to the perceptual volume `volume` (clamped to `[0, 1]`)
    fn set_normalized_volume(
        &self,
        elem: ElementId,
        channel: Channel,
        volume: f64,
        direction: RoundDirection,
    ) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        match self.decibel_range_hundredths(elem)? {
            Some(db) if db.min < db.max => {
                let value = curve::denormalize_decibels(volume, db, direction);
                self.set_channel_decibel_hundredths(elem, channel, value, direction)
            }
            _ => {
                let raw = self.volume_range(elem)?;
                if raw.min >= raw.max {
                    return Ok(());
                }
                let value = curve::denormalize_linear(volume, raw, direction);
                self.set_channel_volume(elem, channel, value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_direction_for_delta() {
        assert_eq!(RoundDirection::for_delta(5), RoundDirection::Up);
        assert_eq!(RoundDirection::for_delta(-1), RoundDirection::Down);
        assert_eq!(RoundDirection::for_delta(0), RoundDirection::Nearest);
    }

    #[test]
    fn test_round_direction_apply() {
        assert_eq!(RoundDirection::Up.apply(1.2), 2);
        assert_eq!(RoundDirection::Down.apply(1.8), 1);
        assert_eq!(RoundDirection::Nearest.apply(2.5), 3);
        assert_eq!(RoundDirection::Nearest.apply(-2.5), -3);
        assert_eq!(RoundDirection::Up.apply(-1.5), -1);
        assert_eq!(RoundDirection::Down.apply(f64::NEG_INFINITY), i64::MIN);
    }
}
