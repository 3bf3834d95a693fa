//! In-memory mixer
//!
//! A complete [`MixerBackend`] that keeps its elements in process memory.
//! Decibel scales are linear over the raw range, which is how simple hardware
//! controls describe themselves, so decibel and perceptual writes are
//! quantized to raw steps exactly like a real device would do it.

use super::{BackendError, Channel, ElementId, ElementInfo, MixerBackend, Result, RoundDirection};
use crate::domain::range::{map_range, Range};
use std::cell::RefCell;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ElementState {
    volume: [i64; 2],
    switch: [bool; 2],
}

/// Observable state of a memory element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub left: i64,
    pub right: i64,
    pub switch_left: bool,
    pub switch_right: bool,
}

/// A write accepted by a [`MemoryMixer`], in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerWrite {
    Volume {
        element: String,
        channel: Channel,
        value: i64,
    },
    Switch {
        element: String,
        on: bool,
    },
}

/// One simulated mixer element
#[derive(Debug, Clone)]
pub struct MemoryElement {
    name: String,
    range: Range,
    db_range: Option<Range>,
    has_switch: bool,
    reject_volume_writes: bool,
    reject_switch_writes: bool,
    state: RefCell<ElementState>,
}

impl MemoryElement {
    /// Element at its minimum volume with the playback switch on
    pub fn new(name: impl Into<String>, range: Range) -> Self {
        Self {
            name: name.into(),
            range,
            db_range: None,
            has_switch: true,
            reject_volume_writes: false,
            reject_switch_writes: false,
            state: RefCell::new(ElementState {
                volume: [range.min; 2],
                switch: [true; 2],
            }),
        }
    }

    /// Describe the raw range with a linear decibel scale (hundredths of dB)
    pub fn with_decibels(mut self, db_range: Range) -> Self {
        self.db_range = Some(db_range);
        self
    }

    pub fn with_volume(self, value: i64) -> Self {
        self.with_channels(value, value)
    }

    pub fn with_channels(self, left: i64, right: i64) -> Self {
        self.state.borrow_mut().volume = [left, right];
        self
    }

    pub fn with_switch(self, on: bool) -> Self {
        self.state.borrow_mut().switch = [on; 2];
        self
    }

    /// Element without a playback switch (volume only)
    pub fn without_switch(mut self) -> Self {
        self.has_switch = false;
        self
    }

    /// Every volume write fails, as a busy or unplugged device would
    pub fn rejecting_volume_writes(mut self) -> Self {
        self.reject_volume_writes = true;
        self
    }

    /// Every switch write fails
    pub fn rejecting_switch_writes(mut self) -> Self {
        self.reject_switch_writes = true;
        self
    }

    fn slot(channel: Channel) -> usize {
        match channel {
            Channel::FrontLeft => 0,
            Channel::FrontRight => 1,
        }
    }

    fn rejected(&self, operation: &'static str) -> BackendError {
        BackendError::Call {
            operation,
            element: self.name.clone(),
            message: "write rejected by device".to_string(),
        }
    }

    fn db_range(&self) -> Result<Range> {
        self.db_range
            .ok_or_else(|| BackendError::NoDecibelScale(self.name.clone()))
    }

    fn raw_to_hundredths(&self, raw: i64) -> Result<i64> {
        let db = self.db_range()?;
        map_range(raw, self.range, db, false).map_err(|e| BackendError::Call {
            operation: "get_playback_db",
            element: self.name.clone(),
            message: e.to_string(),
        })
    }

    fn hundredths_to_raw(&self, value: i64, direction: RoundDirection) -> Result<i64> {
        let db = self.db_range()?;
        if db.span() == 0 {
            return Ok(self.range.min);
        }
        let offset = (value - db.min) as f64 * self.range.span() as f64 / db.span() as f64;
        let raw = direction.apply(offset).saturating_add(self.range.min);
        Ok(self.range.clamp(raw))
    }
}

/// Mixer whose elements live in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryMixer {
    elements: Vec<MemoryElement>,
    journal: RefCell<Vec<MixerWrite>>,
}

impl MemoryMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, element: MemoryElement) -> Self {
        self.add_element(element);
        self
    }

    pub fn add_element(&mut self, element: MemoryElement) -> ElementId {
        self.elements.push(element);
        ElementId::new(self.elements.len() - 1)
    }

    /// Current state of the named element
    pub fn snapshot(&self, name: &str) -> Option<ElementSnapshot> {
        self.elements
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| {
                let state = e.state.borrow();
                ElementSnapshot {
                    left: state.volume[0],
                    right: state.volume[1],
                    switch_left: state.switch[0],
                    switch_right: state.switch[1],
                }
            })
    }

    /// Every accepted write so far
    pub fn journal(&self) -> Vec<MixerWrite> {
        self.journal.borrow().clone()
    }

    fn element(&self, elem: ElementId) -> Result<&MemoryElement> {
        self.elements
            .get(elem.index())
            .ok_or(BackendError::UnknownElement(elem.index()))
    }
}

impl MixerBackend for MemoryMixer {
    fn resolve_element(&self, name: &str) -> Result<ElementId> {
        self.elements
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
            .map(ElementId::new)
            .ok_or_else(|| BackendError::ElementNotFound(name.to_string()))
    }

    fn element_name(&self, elem: ElementId) -> Result<&str> {
        Ok(&self.element(elem)?.name)
    }

    fn elements(&self) -> Result<Vec<ElementInfo>> {
        Ok(self
            .elements
            .iter()
            .map(|e| ElementInfo {
                name: e.name.clone(),
                has_playback_volume: e.range.span() > 0,
                has_playback_switch: e.has_switch,
            })
            .collect())
    }

    fn volume_range(&self, elem: ElementId) -> Result<Range> {
        Ok(self.element(elem)?.range)
    }

    fn channel_volume(&self, elem: ElementId, channel: Channel) -> Result<i64> {
        let element = self.element(elem)?;
        let value = element.state.borrow().volume[MemoryElement::slot(channel)];
        Ok(value)
    }

    fn set_channel_volume(&self, elem: ElementId, channel: Channel, value: i64) -> Result<()> {
        let element = self.element(elem)?;
        if element.reject_volume_writes {
            return Err(element.rejected("set_playback_volume"));
        }
        let value = element.range.clamp(value);
        trace!(element = %element.name, %channel, value, "Memory volume write");
        element.state.borrow_mut().volume[MemoryElement::slot(channel)] = value;
        self.journal.borrow_mut().push(MixerWrite::Volume {
            element: element.name.clone(),
            channel,
            value,
        });
        Ok(())
    }

    fn decibel_range_hundredths(&self, elem: ElementId) -> Result<Option<Range>> {
        Ok(self.element(elem)?.db_range)
    }

    fn channel_decibel_hundredths(&self, elem: ElementId, channel: Channel) -> Result<i64> {
        let element = self.element(elem)?;
        let raw = element.state.borrow().volume[MemoryElement::slot(channel)];
        element.raw_to_hundredths(raw)
    }

    fn set_channel_decibel_hundredths(
        &self,
        elem: ElementId,
        channel: Channel,
        value: i64,
        direction: RoundDirection,
    ) -> Result<()> {
        let element = self.element(elem)?;
        let raw = element.hundredths_to_raw(value, direction)?;
        self.set_channel_volume(elem, channel, raw)
    }

    fn has_playback_switch(&self, elem: ElementId) -> bool {
        self.element(elem).map(|e| e.has_switch).unwrap_or(false)
    }

    fn playback_switch(&self, elem: ElementId, channel: Channel) -> Result<bool> {
        let element = self.element(elem)?;
        if !element.has_switch {
            return Err(BackendError::Call {
                operation: "get_playback_switch",
                element: element.name.clone(),
                message: "element has no playback switch".to_string(),
            });
        }
        let on = element.state.borrow().switch[MemoryElement::slot(channel)];
        Ok(on)
    }

    fn set_playback_switch_all(&self, elem: ElementId, on: bool) -> Result<()> {
        let element = self.element(elem)?;
        if !element.has_switch || element.reject_switch_writes {
            return Err(element.rejected("set_playback_switch_all"));
        }
        element.state.borrow_mut().switch = [on; 2];
        self.journal.borrow_mut().push(MixerWrite::Switch {
            element: element.name.clone(),
            on,
        });
        Ok(())
    }
}
