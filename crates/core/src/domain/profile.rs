//! Sound profiles and output selection
//!
//! A profile binds the mixer element whose playback switch says "this output
//! is active" to the (possibly different) element used for volume control.
//! The profile that is currently active is discovered from the switches; the
//! toggle group defines which profile comes next.

use crate::domain::config::ProfileConfig;
use crate::domain::mixer::{BackendError, Channel, ElementId, MixerBackend};
use crate::domain::volume::VolumeRepresentation;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("no sound profile is currently active")]
    NoActiveProfile,

    #[error("no sound profile could be initialized")]
    NoneInitialized,

    #[error("unknown sound profile '{0}'")]
    Unknown(String),

    #[error("sound profile '{0}' was not initialized")]
    Uninitialized(String),

    #[error("sound profile '{0}' is not part of the toggle group")]
    NotInToggleGroup(String),

    #[error("toggle group has no usable profile after '{0}'")]
    NoToggleTarget(String),

    #[error("sound profile '{0}' appears more than once in the toggle group")]
    DuplicateToggleMember(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, ProfileError>;

/// Element handles of an initialized profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileElements {
    /// Element whose playback switch marks the profile active
    pub switch: ElementId,
    /// Element whose volume is adjusted
    pub control: ElementId,
}

/// One controllable output configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundProfile {
    pub name: String,
    pub element_name: String,
    pub control_element_name: String,
    pub default_volume: i64,
    pub volume_type: VolumeRepresentation,
    pub soft_limit_volume: i64,
    pub set_default_volume_on_activate: bool,
    pub confirm_on_exceeding_limit: bool,
    elements: Option<ProfileElements>,
}

impl SoundProfile {
    /// Unresolved profile built from configuration
    pub fn from_config(config: &ProfileConfig) -> Self {
        Self {
            name: config.name.clone(),
            element_name: config.element.clone(),
            control_element_name: config
                .control_element
                .clone()
                .unwrap_or_else(|| config.element.clone()),
            default_volume: config.default_volume,
            volume_type: config.volume_type,
            soft_limit_volume: config.soft_limit_volume,
            set_default_volume_on_activate: config.set_default_volume,
            confirm_on_exceeding_limit: config.confirm_exceeding_limit,
            elements: None,
        }
    }

    /// Look up both elements; the profile stays uninitialized if either is missing
    pub fn resolve<B: MixerBackend + ?Sized>(&mut self, backend: &B) -> bool {
        let switch = backend.resolve_element(&self.element_name);
        let control = backend.resolve_element(&self.control_element_name);
        match (switch, control) {
            (Ok(switch), Ok(control)) => {
                self.elements = Some(ProfileElements { switch, control });
                debug!(profile = %self.name, "Initialized sound profile");
                true
            }
            (switch, control) => {
                for err in [switch.err(), control.err()].into_iter().flatten() {
                    warn!(profile = %self.name, error = %err, "Sound profile not initialized");
                }
                self.elements = None;
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.elements.is_some()
    }

    pub fn elements(&self) -> Result<ProfileElements> {
        self.elements
            .ok_or_else(|| ProfileError::Uninitialized(self.name.clone()))
    }

    /// Whether volume is controlled through an element other than the switch
    pub fn has_separate_control(&self) -> bool {
        !self
            .control_element_name
            .eq_ignore_ascii_case(&self.element_name)
    }
}

/// Build profiles from configuration and resolve them against the mixer
///
/// Fails only if not a single profile could be initialized.
pub fn resolve_profiles<B: MixerBackend + ?Sized>(
    configs: &[ProfileConfig],
    backend: &B,
) -> Result<Vec<SoundProfile>> {
    let mut profiles: Vec<SoundProfile> = configs.iter().map(SoundProfile::from_config).collect();
    let resolved = profiles
        .iter_mut()
        .map(|profile| profile.resolve(backend))
        .filter(|ok| *ok)
        .count();

    if resolved == 0 {
        return Err(ProfileError::NoneInitialized);
    }
    info!(resolved, total = profiles.len(), "Sound profiles resolved");
    Ok(profiles)
}

/// Look up a profile by name, ignoring ASCII case
pub fn find_profile<'p>(profiles: &'p [SoundProfile], name: &str) -> Result<&'p SoundProfile> {
    profiles
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| ProfileError::Unknown(name.to_string()))
}

/// Ordered cycle of profile names used to switch outputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToggleGroup {
    members: Vec<String>,
}

impl ToggleGroup {
    /// Each profile may appear at most once, otherwise "next" is ambiguous
    pub fn new(members: Vec<String>) -> Result<Self> {
        for (i, name) in members.iter().enumerate() {
            if members[..i].iter().any(|m| m.eq_ignore_ascii_case(name)) {
                return Err(ProfileError::DuplicateToggleMember(name.clone()));
            }
        }
        Ok(Self { members })
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.eq_ignore_ascii_case(name))
    }
}

/// Finds the active profile and the next one in a toggle cycle
pub struct ProfileSelector<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B: MixerBackend + ?Sized> ProfileSelector<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Playback switch state of the front left channel
    ///
    /// The right channel is assumed to follow the left one.
    pub fn is_playback_switch_on(&self, elem: ElementId) -> Result<bool> {
        Ok(self.backend.playback_switch(elem, Channel::FrontLeft)?)
    }

    fn switch_on_or_off(&self, profile: &SoundProfile, elem: ElementId) -> bool {
        match self.is_playback_switch_on(elem) {
            Ok(on) => on,
            Err(e) => {
                warn!(profile = %profile.name, error = %e, "Could not read playback switch");
                false
            }
        }
    }

    /// The profile whose output is currently switched on
    ///
    /// Profiles are scanned in configured order. A later candidate replaces
    /// an earlier one only if it has its own control element and that
    /// element's switch is on as well.
    pub fn current_profile<'p>(&self, profiles: &'p [SoundProfile]) -> Result<&'p SoundProfile> {
        let mut current: Option<&'p SoundProfile> = None;

        for profile in profiles {
            let Ok(elements) = profile.elements() else {
                continue;
            };
            if !self.backend.has_playback_switch(elements.switch)
                || !self.switch_on_or_off(profile, elements.switch)
            {
                continue;
            }

            let verified_output = profile.has_separate_control()
                && self.backend.has_playback_switch(elements.control)
                && self.switch_on_or_off(profile, elements.control);
            if current.is_none() || verified_output {
                debug!(profile = %profile.name, verified_output, "Active profile candidate");
                current = Some(profile);
            }
        }

        current.ok_or(ProfileError::NoActiveProfile)
    }

    /// Successor of `current` in `group`, wrapping to the front
    ///
    /// Members that are unknown or were not initialized are skipped. A group
    /// with a single usable member wraps around to `current` itself.
    pub fn next_profile<'p>(
        &self,
        current: &SoundProfile,
        group: &ToggleGroup,
        profiles: &'p [SoundProfile],
    ) -> Result<&'p SoundProfile> {
        let start = group
            .position(&current.name)
            .ok_or_else(|| ProfileError::NotInToggleGroup(current.name.clone()))?;

        let len = group.members.len();
        (1..=len)
            .map(|step| &group.members[(start + step) % len])
            .filter_map(|name| find_profile(profiles, name).ok())
            .find(|profile| profile.is_initialized())
            .ok_or_else(|| ProfileError::NoToggleTarget(current.name.clone()))
    }
}
