//! ALSA simple mixer backend
//!
//! Volumes, decibels (ALSA's hundredths of a dB, `MilliBel`) and playback
//! switches map one to one onto [`MixerBackend`] primitives. The perceptual
//! curve is provided by the trait on top of them.

use alsa::mixer::{MilliBel, Mixer, Selem, SelemChannelId, SelemId};
use alsa::Round;
use avolt_core::domain::mixer::{
    BackendError, Channel, ElementId, ElementInfo, MixerBackend, Result, RoundDirection,
};
use avolt_core::domain::range::Range;
use tracing::{debug, info, trace};

/// Name and index that identify a simple element across lookups
#[derive(Debug, Clone)]
struct ElementEntry {
    name: String,
    index: u32,
}

/// Open ALSA mixer with its simple elements enumerated
pub struct AlsaMixer {
    device: String,
    mixer: Mixer,
    elements: Vec<ElementEntry>,
}

fn call_error(operation: &'static str, element: &str, err: alsa::Error) -> BackendError {
    BackendError::Call {
        operation,
        element: element.to_string(),
        message: err.to_string(),
    }
}

/// Mono elements only have the front left slot
fn channel_id(selem: &Selem<'_>, channel: Channel) -> SelemChannelId {
    if selem.is_playback_mono() {
        return SelemChannelId::FrontLeft;
    }
    match channel {
        Channel::FrontLeft => SelemChannelId::FrontLeft,
        Channel::FrontRight => SelemChannelId::FrontRight,
    }
}

impl AlsaMixer {
    /// Attach to `device` ("default", "hw:0", ...) and load its elements
    pub fn open(device: &str) -> Result<Self> {
        let mixer = Mixer::new(device, false).map_err(|e| BackendError::Open {
            device: device.to_string(),
            message: e.to_string(),
        })?;

        let mut elements = Vec::new();
        for elem in mixer.iter() {
            let Some(selem) = Selem::new(elem) else {
                continue;
            };
            let id = selem.get_id();
            match id.get_name() {
                Ok(name) => elements.push(ElementEntry {
                    name: name.to_string(),
                    index: id.get_index(),
                }),
                Err(e) => debug!(error = %e, "Skipping mixer element without a readable name"),
            }
        }

        info!(device, elements = elements.len(), "Opened ALSA mixer");
        Ok(Self {
            device: device.to_string(),
            mixer,
            elements,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    fn entry(&self, elem: ElementId) -> Result<&ElementEntry> {
        self.elements
            .get(elem.index())
            .ok_or(BackendError::UnknownElement(elem.index()))
    }

    fn selem(&self, elem: ElementId) -> Result<(&str, Selem<'_>)> {
        let entry = self.entry(elem)?;
        let selem = self
            .mixer
            .find_selem(&SelemId::new(&entry.name, entry.index))
            .ok_or_else(|| BackendError::ElementNotFound(entry.name.clone()))?;
        Ok((&entry.name, selem))
    }
}

impl MixerBackend for AlsaMixer {
    fn resolve_element(&self, name: &str) -> Result<ElementId> {
        self.elements
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
            .map(ElementId::new)
            .ok_or_else(|| BackendError::ElementNotFound(name.to_string()))
    }

    fn element_name(&self, elem: ElementId) -> Result<&str> {
        Ok(&self.entry(elem)?.name)
    }

    fn elements(&self) -> Result<Vec<ElementInfo>> {
        (0..self.elements.len())
            .map(|i| {
                let (name, selem) = self.selem(ElementId::new(i))?;
                Ok(ElementInfo {
                    name: name.to_string(),
                    has_playback_volume: selem.has_playback_volume(),
                    has_playback_switch: selem.has_playback_switch(),
                })
            })
            .collect()
    }

    fn volume_range(&self, elem: ElementId) -> Result<Range> {
        let (_, selem) = self.selem(elem)?;
        let (min, max) = selem.get_playback_volume_range();
        Ok(Range::new(min, max))
    }

    fn channel_volume(&self, elem: ElementId, channel: Channel) -> Result<i64> {
        let (name, selem) = self.selem(elem)?;
        selem
            .get_playback_volume(channel_id(&selem, channel))
            .map_err(|e| call_error("get_playback_volume", name, e))
    }

    fn set_channel_volume(&self, elem: ElementId, channel: Channel, value: i64) -> Result<()> {
        let (name, selem) = self.selem(elem)?;
        trace!(element = name, %channel, value, "ALSA volume write");
        selem
            .set_playback_volume(channel_id(&selem, channel), value)
            .map_err(|e| call_error("set_playback_volume", name, e))
    }

    fn set_volume_all(&self, elem: ElementId, value: i64) -> Result<()> {
        let (name, selem) = self.selem(elem)?;
        trace!(element = name, value, "ALSA volume write, all channels");
        selem
            .set_playback_volume_all(value)
            .map_err(|e| call_error("set_playback_volume_all", name, e))
    }

    fn decibel_range_hundredths(&self, elem: ElementId) -> Result<Option<Range>> {
        let (_, selem) = self.selem(elem)?;
        if !selem.has_playback_volume() {
            return Ok(None);
        }
        // ALSA reports (0, 0) when the element has no dB information
        let (min, max) = selem.get_playback_db_range();
        if min.0 == 0 && max.0 == 0 {
            return Ok(None);
        }
        Ok(Some(Range::new(min.0, max.0)))
    }

    fn channel_decibel_hundredths(&self, elem: ElementId, channel: Channel) -> Result<i64> {
        let (name, selem) = self.selem(elem)?;
        selem
            .get_playback_vol_db(channel_id(&selem, channel))
            .map(|db| db.0)
            .map_err(|e| call_error("get_playback_db", name, e))
    }

    fn set_channel_decibel_hundredths(
        &self,
        elem: ElementId,
        channel: Channel,
        value: i64,
        direction: RoundDirection,
    ) -> Result<()> {
        let (name, selem) = self.selem(elem)?;
        let channel = channel_id(&selem, channel);
        let target = MilliBel(value);

        let round = match direction {
            RoundDirection::Up => Round::Ceil,
            RoundDirection::Down => Round::Floor,
            RoundDirection::Nearest => {
                // ALSA only rounds up or down, pick whichever raw step is closer
                let below = selem
                    .ask_playback_db_vol(target, Round::Floor)
                    .map_err(|e| call_error("ask_playback_db_vol", name, e))?;
                let above = selem
                    .ask_playback_db_vol(target, Round::Ceil)
                    .map_err(|e| call_error("ask_playback_db_vol", name, e))?;
                let distance = |raw: i64| {
                    selem
                        .ask_playback_vol_db(raw)
                        .map(|db| (db.0 - value).abs())
                        .map_err(|e| call_error("ask_playback_vol_db", name, e))
                };
                let raw = if distance(above)? < distance(below)? {
                    above
                } else {
                    below
                };
                trace!(element = name, value, raw, "ALSA dB write, nearest step");
                return selem
                    .set_playback_volume(channel, raw)
                    .map_err(|e| call_error("set_playback_volume", name, e));
            }
        };

        trace!(element = name, value, ?direction, "ALSA dB write");
        selem
            .set_playback_db(channel, target, round)
            .map_err(|e| call_error("set_playback_db", name, e))
    }

    fn has_playback_switch(&self, elem: ElementId) -> bool {
        self.selem(elem)
            .map(|(_, selem)| selem.has_playback_switch())
            .unwrap_or(false)
    }

    fn playback_switch(&self, elem: ElementId, channel: Channel) -> Result<bool> {
        let (name, selem) = self.selem(elem)?;
        selem
            .get_playback_switch(channel_id(&selem, channel))
            .map(|value| value != 0)
            .map_err(|e| call_error("get_playback_switch", name, e))
    }

    fn set_playback_switch_all(&self, elem: ElementId, on: bool) -> Result<()> {
        let (name, selem) = self.selem(elem)?;
        debug!(element = name, on, "ALSA switch write");
        selem
            .set_playback_switch_all(i32::from(on))
            .map_err(|e| call_error("set_playback_switch_all", name, e))
    }
}
