//! Volume representations and the accessor that reads and writes them
//!
//! A mixer element can be asked for its volume in raw hardware units, as a
//! linear percentage of the hardware range, in decibels, or as a perceptual
//! percentage. Only the first two are related by a plain affine map; the
//! others follow device-specific curves and are quantized by the device.

use crate::domain::mixer::{BackendError, Channel, ElementId, MixerBackend, RoundDirection};
use crate::domain::range::{map_range, Range, RangeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, instrument};

/// Unit a volume value is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeRepresentation {
    /// Raw device units, device-defined range
    #[serde(rename = "hardware")]
    HardwareUnits,
    /// Hardware range rescaled linearly to 0-100
    #[serde(rename = "hardware-percentage")]
    HardwarePercentage,
    /// alsamixer perceptual curve rescaled to 0-100
    #[serde(rename = "alsa-percentage")]
    NormalizedPercentage,
    /// Device decibel range divided by 100, so [-6000, 0] becomes [-60, 0]
    #[serde(rename = "decibels")]
    Decibels,
}

impl VolumeRepresentation {
    pub const ALL: [VolumeRepresentation; 4] = [
        VolumeRepresentation::NormalizedPercentage,
        VolumeRepresentation::HardwarePercentage,
        VolumeRepresentation::HardwareUnits,
        VolumeRepresentation::Decibels,
    ];

    /// Name used in configuration files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeRepresentation::HardwareUnits => "hardware",
            VolumeRepresentation::HardwarePercentage => "hardware-percentage",
            VolumeRepresentation::NormalizedPercentage => "alsa-percentage",
            VolumeRepresentation::Decibels => "decibels",
        }
    }

    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            VolumeRepresentation::HardwarePercentage | VolumeRepresentation::NormalizedPercentage
        )
    }

    /// Whether writes are quantized by the device and honour a rounding direction
    pub fn is_quantized(&self) -> bool {
        matches!(
            self,
            VolumeRepresentation::Decibels | VolumeRepresentation::NormalizedPercentage
        )
    }
}

impl fmt::Display for VolumeRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown volume representation '{0}' (expected one of: alsa-percentage, hardware-percentage, hardware, decibels)")]
pub struct UnknownRepresentation(pub String);

impl FromStr for VolumeRepresentation {
    type Err = UnknownRepresentation;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        VolumeRepresentation::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRepresentation(s.to_string()))
    }
}

/// Failures while reading or writing a volume
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VolumeError {
    #[error("reading {representation} volume of '{element}' failed: {source}")]
    Read {
        element: String,
        representation: VolumeRepresentation,
        source: BackendError,
    },

    #[error("setting '{element}' to {value} ({representation}) failed: {source}")]
    Write {
        element: String,
        value: i64,
        representation: VolumeRepresentation,
        source: BackendError,
    },

    #[error("converting {value} ({representation}) for '{element}' failed: {source}")]
    Conversion {
        element: String,
        value: i64,
        representation: VolumeRepresentation,
        source: RangeError,
    },
}

pub type Result<T> = std::result::Result<T, VolumeError>;

/// Reads and writes element volumes in any [`VolumeRepresentation`]
pub struct VolumeAccessor<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B: MixerBackend + ?Sized> VolumeAccessor<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    fn element_label(&self, elem: ElementId) -> String {
        self.backend
            .element_name(elem)
            .map(str::to_string)
            .unwrap_or_else(|_| format!("#{}", elem.index()))
    }

    fn read_error(&self, elem: ElementId, repr: VolumeRepresentation) -> impl Fn(BackendError) -> VolumeError + '_ {
        move |source| VolumeError::Read {
            element: self.element_label(elem),
            representation: repr,
            source,
        }
    }

    /// Legal values of `repr` on this element
    pub fn bounds(&self, elem: ElementId, repr: VolumeRepresentation) -> Result<Range> {
        match repr {
            VolumeRepresentation::HardwarePercentage | VolumeRepresentation::NormalizedPercentage => {
                Ok(Range::PERCENT)
            }
            VolumeRepresentation::HardwareUnits => self
                .backend
                .volume_range(elem)
                .map_err(self.read_error(elem, repr)),
            VolumeRepresentation::Decibels => {
                let db = self
                    .backend
                    .decibel_range_hundredths(elem)
                    .map_err(self.read_error(elem, repr))?
                    .ok_or_else(|| VolumeError::Read {
                        element: self.element_label(elem),
                        representation: repr,
                        source: BackendError::NoDecibelScale(self.element_label(elem)),
                    })?;
                Ok(Range::new(db.min / 100, db.max / 100))
            }
        }
    }

    /// Current volume; when the channels differ the louder one wins
    #[instrument(level = "debug", skip(self))]
    pub fn get_volume(&self, elem: ElementId, repr: VolumeRepresentation) -> Result<i64> {
        let read = |channel: Channel| -> Result<i64> {
            let value = match repr {
                VolumeRepresentation::HardwareUnits | VolumeRepresentation::HardwarePercentage => {
                    self.backend.channel_volume(elem, channel)
                }
                VolumeRepresentation::Decibels => self.backend.channel_decibel(elem, channel),
                VolumeRepresentation::NormalizedPercentage => self
                    .backend
                    .normalized_volume(elem, channel)
                    .map(|n| (n * 100.0).round() as i64),
            };
            value.map_err(self.read_error(elem, repr))
        };

        let left = read(Channel::FrontLeft)?;
        let right = read(Channel::FrontRight)?;
        let louder = left.max(right);

        let volume = if repr == VolumeRepresentation::HardwarePercentage {
            let range = self
                .backend
                .volume_range(elem)
                .map_err(self.read_error(elem, repr))?;
            map_range(louder, range, Range::PERCENT, false).map_err(|source| {
                VolumeError::Conversion {
                    element: self.element_label(elem),
                    value: louder,
                    representation: repr,
                    source,
                }
            })?
        } else {
            louder
        };

        debug!(left, right, volume, "Read volume");
        Ok(volume)
    }

    /// Write `value` to both channels
    ///
    /// `direction` only matters for quantized representations.
    #[instrument(level = "debug", skip(self))]
    pub fn set_volume(
        &self,
        elem: ElementId,
        repr: VolumeRepresentation,
        value: i64,
        direction: RoundDirection,
    ) -> Result<()> {
        let write_error = |source| VolumeError::Write {
            element: self.element_label(elem),
            value,
            representation: repr,
            source,
        };

        match repr {
            VolumeRepresentation::HardwareUnits => {
                self.backend.set_volume_all(elem, value).map_err(write_error)
            }
            VolumeRepresentation::HardwarePercentage => {
                let range = self.backend.volume_range(elem).map_err(write_error)?;
                let raw = map_range(value, Range::PERCENT, range, false).map_err(|source| {
                    VolumeError::Conversion {
                        element: self.element_label(elem),
                        value,
                        representation: repr,
                        source,
                    }
                })?;
                debug!(raw, "Percentage mapped to hardware units");
                self.backend.set_volume_all(elem, raw).map_err(write_error)
            }
            VolumeRepresentation::Decibels => self
                .backend
                .set_decibel_all(elem, value, direction)
                .map_err(write_error),
            VolumeRepresentation::NormalizedPercentage => {
                let normalized = value as f64 / 100.0;
                for channel in Channel::STEREO {
                    self.backend
                        .set_normalized_volume(elem, channel, normalized, direction)
                        .map_err(write_error)?;
                }
                Ok(())
            }
        }
    }
}
