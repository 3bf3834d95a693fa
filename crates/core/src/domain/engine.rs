//! Volume change engine
//!
//! One invocation of the tool is one [`VolumeRequest`]. The engine finds the
//! profile to work on, optionally switches to the next output of the toggle
//! group, then applies the requested volume change. Every mixer write of an
//! invocation happens inside a single [`ConcurrencyGuard`] section, so two
//! processes never interleave their read-modify-write sequences.
//!
//! Failures never escape as panics or errors: [`VolumeChangeEngine::execute`]
//! always returns an [`ExecutionOutcome`] carrying the exit status and a
//! message for the user.

use crate::domain::guard::{ConcurrencyGuard, GuardError};
use crate::domain::mixer::{BackendError, ElementId, MixerBackend, RoundDirection};
use crate::domain::profile::{
    find_profile, ProfileError, ProfileSelector, SoundProfile, ToggleGroup,
};
use crate::domain::range::{map_range, Range, RangeError};
use crate::domain::volume::{VolumeAccessor, VolumeError, VolumeRepresentation};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// What should happen to the volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChange {
    /// Only report the current volume
    Query,
    SetAbsolute(i64),
    /// Signed change, in units of the request representation
    SetRelative(i64),
    /// Mute when above the hardware minimum, otherwise unmute
    ///
    /// Unmuting goes to `unmute_to` when it is positive, else to the profile
    /// default.
    ToggleOnOff { unmute_to: Option<i64> },
    /// Apply the profile's default volume
    SetDefault,
}

/// One requested change, built from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRequest {
    pub change: VolumeChange,
    /// Switch to the next profile of the toggle group first
    pub toggle_output: bool,
    /// Representation of the requested value; the profile's own when unset
    pub representation: Option<VolumeRepresentation>,
    /// Work on this profile instead of the active one
    pub profile: Option<String>,
}

impl VolumeRequest {
    pub fn new(change: VolumeChange) -> Self {
        Self {
            change,
            toggle_output: false,
            representation: None,
            profile: None,
        }
    }

    pub fn query() -> Self {
        Self::new(VolumeChange::Query)
    }

    pub fn with_toggle_output(mut self) -> Self {
        self.toggle_output = true;
        self
    }

    pub fn with_representation(mut self, representation: VolumeRepresentation) -> Self {
        self.representation = Some(representation);
        self
    }

    pub fn with_profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }

    /// Value given explicitly by the user, if any
    pub fn explicit_value(&self) -> Option<i64> {
        match self.change {
            VolumeChange::SetAbsolute(value) | VolumeChange::SetRelative(value) => Some(value),
            VolumeChange::ToggleOnOff { unmute_to } => unmute_to,
            VolumeChange::Query | VolumeChange::SetDefault => None,
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self.change, VolumeChange::SetRelative(_))
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Domain(#[from] RangeError),

    #[error("cannot set volume {value}: outside the {representation} range [{min}, {max}]")]
    Validation {
        value: i64,
        representation: VolumeRepresentation,
        min: i64,
        max: i64,
    },

    #[error("exclusive mixer access unavailable, volume left unchanged: {0}")]
    ConcurrencyUnavailable(#[source] GuardError),

    #[error("switching output element '{element}' failed: {source}")]
    SwitchFailed {
        element: String,
        #[source]
        source: BackendError,
    },
}

impl EngineError {
    /// Whether the invocation must end with a failure status
    ///
    /// Configuration problems and half-done output switches are fatal.
    /// Rejected values, busy guards and failed volume writes are reported
    /// but leave the exit status clean.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Profile(_) | EngineError::SwitchFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

/// Final result of one invocation
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub status: ExitStatus,
    /// Line for the user: the volume, a summary, or the reported error
    pub message: String,
    /// Profile the request ended up acting on
    pub profile: Option<String>,
    /// Volume after the request, in the reported representation
    pub volume: Option<i64>,
    pub error: Option<EngineError>,
}

impl ExecutionOutcome {
    fn completed(profile: &SoundProfile, volume: Option<i64>, message: String) -> Self {
        Self {
            status: ExitStatus::Success,
            message,
            profile: Some(profile.name.clone()),
            volume,
            error: None,
        }
    }

    fn from_error(err: EngineError) -> Self {
        let status = if err.is_fatal() {
            ExitStatus::Failure
        } else {
            ExitStatus::Success
        };
        Self {
            status,
            message: err.to_string(),
            profile: None,
            volume: None,
            error: Some(err),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExitStatus::Success
    }
}

/// Asks the user whether to go above a profile's soft volume limit
pub trait Confirm {
    fn confirm(&self, question: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, question: &str) -> bool {
        self(question)
    }
}

/// Answers no to everything, for non-interactive use
#[derive(Debug, Clone, Copy, Default)]
pub struct Decline;

impl Confirm for Decline {
    fn confirm(&self, _question: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VolumeStep {
    Absolute { value: i64, repr: VolumeRepresentation },
    Relative { delta: i64, repr: VolumeRepresentation },
    Toggle { unmute_to: Option<i64>, repr: VolumeRepresentation },
}

struct OutputSwitch<'p> {
    from: &'p SoundProfile,
    to: &'p SoundProfile,
    /// Both profiles adjust the same element, so the new volume is written
    /// there before any switch flips
    shared_control: bool,
}

/// Value a volume step ends up writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Target {
    value: i64,
    repr: VolumeRepresentation,
    direction: RoundDirection,
}

struct Plan<'p> {
    profile: &'p SoundProfile,
    switch: Option<OutputSwitch<'p>>,
    step: Option<VolumeStep>,
    report: VolumeRepresentation,
}

/// Applies [`VolumeRequest`]s to a mixer
pub struct VolumeChangeEngine<'a, B: ?Sized, G> {
    backend: &'a B,
    guard: &'a G,
    confirm: Box<dyn Confirm + 'a>,
}

impl<'a, B: MixerBackend + ?Sized, G: ConcurrencyGuard> VolumeChangeEngine<'a, B, G> {
    /// Engine that declines every soft limit confirmation
    pub fn new(backend: &'a B, guard: &'a G) -> Self {
        Self {
            backend,
            guard,
            confirm: Box::new(Decline),
        }
    }

    pub fn with_confirm(mut self, confirm: impl Confirm + 'a) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Run one request to completion
    #[instrument(
        level = "debug",
        skip_all,
        fields(change = ?request.change, toggle_output = request.toggle_output)
    )]
    pub fn execute(
        &self,
        request: &VolumeRequest,
        profiles: &[SoundProfile],
        group: &ToggleGroup,
    ) -> ExecutionOutcome {
        match self.run(request, profiles, group) {
            Ok(outcome) => outcome,
            Err(err) => {
                if err.is_fatal() {
                    error!(error = %err, "Volume request failed");
                } else {
                    warn!(error = %err, "Volume request not applied");
                }
                ExecutionOutcome::from_error(err)
            }
        }
    }

    fn run(
        &self,
        request: &VolumeRequest,
        profiles: &[SoundProfile],
        group: &ToggleGroup,
    ) -> Result<ExecutionOutcome> {
        let selector = ProfileSelector::new(self.backend);
        let current = match &request.profile {
            Some(name) => find_profile(profiles, name)?,
            None => selector.current_profile(profiles)?,
        };
        current.elements()?;
        debug!(profile = %current.name, "Current sound profile");

        let plan = if request.toggle_output {
            let target = selector.next_profile(current, group, profiles)?;
            self.plan_output_toggle(request, current, target)?
        } else {
            let step = Self::volume_step(request, current);
            if let Some(step) = step {
                self.validate(current, step)?;
            }
            Plan {
                profile: current,
                switch: None,
                step,
                report: request.representation.unwrap_or(current.volume_type),
            }
        };

        if plan.switch.is_none() && plan.step.is_none() {
            let control = plan.profile.elements()?.control;
            let volume = VolumeAccessor::new(self.backend).get_volume(control, plan.report)?;
            return Ok(ExecutionOutcome::completed(
                plan.profile,
                Some(volume),
                volume.to_string(),
            ));
        }

        self.guard
            .with_guard(|| self.apply(plan))
            .map_err(EngineError::ConcurrencyUnavailable)?
    }

    fn volume_step(request: &VolumeRequest, profile: &SoundProfile) -> Option<VolumeStep> {
        let repr = request.representation.unwrap_or(profile.volume_type);
        match request.change {
            VolumeChange::Query => None,
            VolumeChange::SetDefault => Some(VolumeStep::Absolute {
                value: profile.default_volume,
                repr: profile.volume_type,
            }),
            VolumeChange::SetAbsolute(value) => Some(VolumeStep::Absolute { value, repr }),
            VolumeChange::SetRelative(delta) => Some(VolumeStep::Relative { delta, repr }),
            VolumeChange::ToggleOnOff { unmute_to } => Some(VolumeStep::Toggle { unmute_to, repr }),
        }
    }

    /// Reject values outside the representation's bounds before anything is written
    fn validate(&self, profile: &SoundProfile, step: VolumeStep) -> Result<()> {
        let control = profile.elements()?.control;
        let accessor = VolumeAccessor::new(self.backend);
        let check = |value: i64, bounds: Range, representation| {
            if bounds.contains(value) {
                Ok(())
            } else {
                Err(EngineError::Validation {
                    value,
                    representation,
                    min: bounds.min,
                    max: bounds.max,
                })
            }
        };

        match step {
            VolumeStep::Absolute { value, repr } => check(value, accessor.bounds(control, repr)?, repr),
            VolumeStep::Relative { delta, repr } => {
                let span = accessor.bounds(control, repr)?.span();
                check(delta, Range::new(-span, span), repr)
            }
            VolumeStep::Toggle {
                unmute_to: Some(value),
                repr,
            } if value > 0 => check(value, accessor.bounds(control, repr)?, repr),
            VolumeStep::Toggle { .. } => Ok(()),
        }
    }

    /// Decide everything the output switch needs without touching the mixer
    ///
    /// The soft limit prompt happens here, so nobody holds the guard while
    /// the user thinks about the answer.
    fn plan_output_toggle<'p>(
        &self,
        request: &VolumeRequest,
        current: &'p SoundProfile,
        target: &'p SoundProfile,
    ) -> Result<Plan<'p>> {
        let from = current.elements()?;
        let to = target.elements()?;
        info!(from = %current.name, to = %target.name, "Toggling output");

        let mut step = match request.change {
            VolumeChange::Query if target.set_default_volume_on_activate => Some(VolumeStep::Absolute {
                value: target.default_volume,
                repr: target.volume_type,
            }),
            _ => Self::volume_step(request, target),
        };

        if let Some(VolumeStep::Absolute { value, repr }) = step {
            if target.confirm_on_exceeding_limit
                && repr == target.volume_type
                && value > target.soft_limit_volume
            {
                let question = format!(
                    "Volume {value} exceeds the soft limit {} of '{}'. Continue?",
                    target.soft_limit_volume, target.name
                );
                if !self.confirm.confirm(&question) {
                    info!(profile = %target.name, "Soft limit not confirmed, using default volume");
                    step = Some(VolumeStep::Absolute {
                        value: target.default_volume,
                        repr: target.volume_type,
                    });
                }
            }
        }
        if let Some(step) = step {
            self.validate(target, step)?;
        }

        let shared_control = from.control == to.control;

        Ok(Plan {
            profile: target,
            switch: Some(OutputSwitch {
                from: current,
                to: target,
                shared_control,
            }),
            step,
            report: request.representation.unwrap_or(target.volume_type),
        })
    }

    /// Everything that writes to the mixer; runs under the guard
    fn apply(&self, plan: Plan<'_>) -> Result<ExecutionOutcome> {
        let Plan {
            profile,
            switch,
            mut step,
            report,
        } = plan;
        let control = profile.elements()?.control;
        let accessor = VolumeAccessor::new(self.backend);

        if let Some(switch) = &switch {
            if switch.shared_control {
                step = step.and_then(|step| self.preset_shared(profile, control, step));
            }
            self.flip_outputs(switch)?;
        }

        if let Some(step) = step {
            self.apply_step(profile, control, step)?;
        }

        let volume = match accessor.get_volume(control, report) {
            Ok(volume) => Some(volume),
            Err(e) => {
                warn!(error = %e, "Could not read back volume");
                None
            }
        };
        let shown = volume.map_or_else(|| "unknown".to_string(), |v| v.to_string());
        let message = match &switch {
            Some(switch) => format!(
                "switched output from '{}' to '{}', volume {shown} ({report})",
                switch.from.name, switch.to.name
            ),
            None => format!("{}: volume {shown} ({report})", profile.name),
        };
        info!(profile = %profile.name, volume = ?volume, %report, "Volume request applied");
        Ok(ExecutionOutcome::completed(profile, volume, message))
    }

    /// Write the volume the target profile ends up with before switching
    ///
    /// Returns the step still to apply after the switch flip, which is the
    /// original step when the early write could not be done.
    fn preset_shared(
        &self,
        profile: &SoundProfile,
        control: ElementId,
        step: VolumeStep,
    ) -> Option<VolumeStep> {
        let accessor = VolumeAccessor::new(self.backend);
        let target = match self.resolve_step(profile, control, step) {
            Ok(Some(target)) => target,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Could not resolve shared control volume, applying after switching");
                return Some(step);
            }
        };

        match accessor.get_volume(control, target.repr) {
            Ok(volume) if volume == target.value => {
                debug!(volume, "Shared control element already at target volume");
                return None;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read shared control volume"),
        }

        match accessor.set_volume(control, target.repr, target.value, target.direction) {
            Ok(()) => {
                debug!(value = target.value, repr = %target.repr, "Pre-set shared control volume");
                None
            }
            Err(e) => {
                warn!(error = %e, "Volume pre-set failed, retrying after switching");
                Some(step)
            }
        }
    }

    /// Current output off first, then the target on
    fn flip_outputs(&self, switch: &OutputSwitch<'_>) -> Result<()> {
        let from = switch.from.elements()?.switch;
        let to = switch.to.elements()?.switch;
        let mut failure = None;

        if from != to {
            if let Err(source) = self.backend.set_playback_switch_all(from, false) {
                warn!(element = %switch.from.element_name, error = %source, "Could not switch output off");
                failure = Some(EngineError::SwitchFailed {
                    element: switch.from.element_name.clone(),
                    source,
                });
            }
        }
        if let Err(source) = self.backend.set_playback_switch_all(to, true) {
            warn!(element = %switch.to.element_name, error = %source, "Could not switch output on");
            failure.get_or_insert(EngineError::SwitchFailed {
                element: switch.to.element_name.clone(),
                source,
            });
        }

        failure.map_or(Ok(()), Err)
    }

    fn apply_step(&self, profile: &SoundProfile, control: ElementId, step: VolumeStep) -> Result<()> {
        if let Some(target) = self.resolve_step(profile, control, step)? {
            VolumeAccessor::new(self.backend).set_volume(
                control,
                target.repr,
                target.value,
                target.direction,
            )?;
        }
        Ok(())
    }

    /// Absolute value `step` writes given the current volume; `None` for a no-op
    fn resolve_step(
        &self,
        profile: &SoundProfile,
        control: ElementId,
        step: VolumeStep,
    ) -> Result<Option<Target>> {
        let accessor = VolumeAccessor::new(self.backend);
        let hardware = VolumeRepresentation::HardwareUnits;

        let target = match step {
            VolumeStep::Absolute { value, repr } => Target {
                value,
                repr,
                direction: RoundDirection::Nearest,
            },
            VolumeStep::Relative { delta: 0, .. } => return Ok(None),
            VolumeStep::Relative {
                delta,
                repr: VolumeRepresentation::HardwarePercentage,
            } => {
                // Native units so that even a 1% step moves a wide range
                let native = accessor.bounds(control, hardware)?;
                let current = accessor.get_volume(control, hardware)?;
                let native_delta = map_range(delta, Range::PERCENT, native, true)?;
                let value = native.clamp(current.saturating_add(native_delta));
                debug!(current, native_delta, value, "Relative percentage change");
                Target {
                    value,
                    repr: hardware,
                    direction: RoundDirection::for_delta(delta),
                }
            }
            VolumeStep::Relative { delta, repr } => {
                let bounds = accessor.bounds(control, repr)?;
                let current = accessor.get_volume(control, repr)?;
                let value = bounds.clamp(current.saturating_add(delta));
                debug!(current, delta, value, %repr, "Relative change");
                Target {
                    value,
                    repr,
                    direction: RoundDirection::for_delta(delta),
                }
            }
            VolumeStep::Toggle { unmute_to, repr } => {
                let current = accessor.get_volume(control, hardware)?;
                let minimum = accessor.bounds(control, hardware)?.min;

                if current != minimum {
                    debug!(current, "Muting");
                    Target {
                        value: 0,
                        repr: VolumeRepresentation::HardwarePercentage,
                        direction: RoundDirection::Nearest,
                    }
                } else if let Some(value) = unmute_to.filter(|v| *v > 0) {
                    debug!(value, %repr, "Unmuting to requested volume");
                    Target {
                        value,
                        repr,
                        direction: RoundDirection::Nearest,
                    }
                } else {
                    debug!(value = profile.default_volume, "Unmuting to default volume");
                    Target {
                        value: profile.default_volume,
                        repr: profile.volume_type,
                        direction: RoundDirection::Nearest,
                    }
                }
            }
        };
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ProfileConfig;
    use crate::domain::guard::Unguarded;
    use crate::domain::mixer::memory::{MemoryElement, MemoryMixer, MixerWrite};
    use crate::domain::mixer::Channel;
    use crate::domain::profile::resolve_profiles;
    use std::cell::Cell;
    use std::io;

    fn profile(
        name: &str,
        element: &str,
        control: Option<&str>,
        default_volume: i64,
        volume_type: VolumeRepresentation,
    ) -> ProfileConfig {
        ProfileConfig {
            name: name.to_string(),
            element: element.to_string(),
            control_element: control.map(str::to_string),
            default_volume,
            volume_type,
            soft_limit_volume: 100,
            set_default_volume: false,
            confirm_exceeding_limit: false,
        }
    }

    fn group(names: &[&str]) -> ToggleGroup {
        ToggleGroup::new(names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn run_on(
        mixer: &MemoryMixer,
        configs: &[ProfileConfig],
        request: VolumeRequest,
    ) -> ExecutionOutcome {
        let profiles = resolve_profiles(configs, mixer).unwrap();
        VolumeChangeEngine::new(mixer, &Unguarded).execute(&request, &profiles, &ToggleGroup::default())
    }

    fn master(range: Range, volume: i64) -> MemoryMixer {
        MemoryMixer::new().with_element(MemoryElement::new("Master", range).with_volume(volume))
    }

    fn master_profile(default_volume: i64) -> Vec<ProfileConfig> {
        vec![profile(
            "master",
            "Master",
            None,
            default_volume,
            VolumeRepresentation::HardwarePercentage,
        )]
    }

    /// Counts acquisitions; optionally refuses them
    struct CountingGuard {
        acquired: Cell<usize>,
        refuse: bool,
    }

    impl CountingGuard {
        fn new(refuse: bool) -> Self {
            Self {
                acquired: Cell::new(0),
                refuse,
            }
        }
    }

    impl ConcurrencyGuard for CountingGuard {
        fn name(&self) -> &str {
            "counting"
        }

        fn with_guard<T>(&self, body: impl FnOnce() -> T) -> crate::domain::guard::Result<T> {
            if self.refuse {
                return Err(GuardError::Acquire {
                    name: "counting".to_string(),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            self.acquired.set(self.acquired.get() + 1);
            Ok(body())
        }
    }

    #[test]
    fn test_query_reads_without_guard() {
        let mixer = master(Range::new(0, 100), 40);
        let profiles = resolve_profiles(&master_profile(32), &mixer).unwrap();
        let guard = CountingGuard::new(false);

        let outcome = VolumeChangeEngine::new(&mixer, &guard).execute(
            &VolumeRequest::query(),
            &profiles,
            &ToggleGroup::default(),
        );

        assert!(outcome.is_success());
        assert_eq!(outcome.volume, Some(40));
        assert_eq!(outcome.message, "40");
        assert_eq!(outcome.profile.as_deref(), Some("master"));
        assert_eq!(guard.acquired.get(), 0);
        assert!(mixer.journal().is_empty());
    }

    #[test]
    fn test_query_in_requested_representation() {
        let mixer = master(Range::new(0, 65535), 65535);
        let outcome = run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::query().with_representation(VolumeRepresentation::HardwareUnits),
        );
        assert_eq!(outcome.volume, Some(65535));
    }

    #[test]
    fn test_relative_change_end_to_end() {
        let mixer = master(Range::new(0, 100), 40);
        let outcome = run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::new(VolumeChange::SetRelative(10)),
        );

        assert!(outcome.is_success(), "{}", outcome.message);
        assert_eq!(mixer.snapshot("Master").unwrap().left, 50);
        assert_eq!(outcome.volume, Some(50));
    }

    #[test]
    fn test_relative_change_always_moves() {
        let mixer = MemoryMixer::new()
            .with_element(MemoryElement::new("Headphone", Range::new(0, 31)).with_volume(30));
        let configs = vec![profile(
            "headphones",
            "Headphone",
            None,
            25,
            VolumeRepresentation::NormalizedPercentage,
        )];

        run_on(&mixer, &configs, VolumeRequest::new(VolumeChange::SetRelative(1)));
        assert_eq!(mixer.snapshot("Headphone").unwrap().left, 31);

        run_on(&mixer, &configs, VolumeRequest::new(VolumeChange::SetRelative(-1)));
        assert_eq!(mixer.snapshot("Headphone").unwrap().left, 30);
    }

    #[test]
    fn test_relative_percentage_moves_wide_range() {
        let mixer = master(Range::new(0, 65535), 20971);
        let outcome = run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::new(VolumeChange::SetRelative(1)),
        );
        assert!(mixer.snapshot("Master").unwrap().left > 20971);
        assert_eq!(outcome.volume, Some(32));
    }

    #[test]
    fn test_relative_change_clamps_at_bounds() {
        let mixer = master(Range::new(0, 100), 95);
        run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::new(VolumeChange::SetRelative(10)),
        );
        assert_eq!(mixer.snapshot("Master").unwrap().left, 100);
    }

    #[test]
    fn test_relative_decibels() {
        let mixer = MemoryMixer::new().with_element(
            MemoryElement::new("PCM", Range::new(0, 255))
                .with_decibels(Range::new(-5100, 0))
                .with_volume(205),
        );
        let configs = vec![profile("pcm", "PCM", None, -20, VolumeRepresentation::Decibels)];

        let outcome = run_on(&mixer, &configs, VolumeRequest::new(VolumeChange::SetRelative(-3)));
        assert_eq!(outcome.volume, Some(-13));
        assert_eq!(mixer.snapshot("PCM").unwrap().left, 190);
    }

    #[test]
    fn test_toggle_unmutes_to_default() {
        let mixer = master(Range::new(0, 65535), 0);
        run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::new(VolumeChange::ToggleOnOff { unmute_to: None }),
        );

        let expected = map_range(32, Range::PERCENT, Range::new(0, 65535), false).unwrap();
        assert_eq!(mixer.snapshot("Master").unwrap().left, expected);
    }

    #[test]
    fn test_toggle_mutes_to_minimum() {
        let mixer = master(Range::new(0, 65535), 32767);
        run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::new(VolumeChange::ToggleOnOff { unmute_to: Some(60) }),
        );
        assert_eq!(mixer.snapshot("Master").unwrap().left, 0);
    }

    #[test]
    fn test_toggle_anchors_at_nonzero_minimum() {
        let mixer = master(Range::new(-40, 60), -40);
        run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::new(VolumeChange::ToggleOnOff { unmute_to: Some(60) }),
        );
        assert_eq!(mixer.snapshot("Master").unwrap().left, 20);

        run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::new(VolumeChange::ToggleOnOff { unmute_to: None }),
        );
        assert_eq!(mixer.snapshot("Master").unwrap().left, -40);
    }

    #[test]
    fn test_absolute_out_of_range_rejected() {
        let mixer = master(Range::new(0, 65535), 1000);
        let outcome = run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::new(VolumeChange::SetAbsolute(150)),
        );

        assert!(outcome.is_success());
        assert!(matches!(
            outcome.error,
            Some(EngineError::Validation {
                value: 150,
                min: 0,
                max: 100,
                ..
            })
        ));
        assert_eq!(mixer.snapshot("Master").unwrap().left, 1000);
        assert!(mixer.journal().is_empty());
    }

    #[test]
    fn test_relative_delta_larger_than_scale_rejected() {
        let mixer = master(Range::new(0, 100), 50);
        let outcome = run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::new(VolumeChange::SetRelative(-101)),
        );
        assert!(matches!(outcome.error, Some(EngineError::Validation { .. })));
        assert_eq!(mixer.snapshot("Master").unwrap().left, 50);
    }

    #[test]
    fn test_hardware_units_validated_against_native_range() {
        let mixer = master(Range::new(0, 87), 10);
        let request = VolumeRequest::new(VolumeChange::SetAbsolute(87))
            .with_representation(VolumeRepresentation::HardwareUnits);
        assert!(run_on(&mixer, &master_profile(32), request.clone()).error.is_none());
        assert_eq!(mixer.snapshot("Master").unwrap().left, 87);

        let too_loud = VolumeRequest::new(VolumeChange::SetAbsolute(88))
            .with_representation(VolumeRepresentation::HardwareUnits);
        let outcome = run_on(&mixer, &master_profile(32), too_loud);
        assert!(matches!(
            outcome.error,
            Some(EngineError::Validation { max: 87, .. })
        ));
    }

    #[test]
    fn test_set_default() {
        let mixer = master(Range::new(0, 200), 0);
        run_on(&mixer, &master_profile(25), VolumeRequest::new(VolumeChange::SetDefault));
        assert_eq!(mixer.snapshot("Master").unwrap().left, 50);
    }

    #[test]
    fn test_write_failure_is_reported_not_fatal() {
        let mixer = MemoryMixer::new().with_element(
            MemoryElement::new("Master", Range::new(0, 100)).rejecting_volume_writes(),
        );
        let outcome = run_on(
            &mixer,
            &master_profile(32),
            VolumeRequest::new(VolumeChange::SetAbsolute(20)),
        );
        assert_eq!(outcome.status, ExitStatus::Success);
        assert!(matches!(outcome.error, Some(EngineError::Volume(_))));
        assert!(outcome.message.contains("Master"), "{}", outcome.message);
    }

    #[test]
    fn test_no_active_profile_is_fatal() {
        let mixer = MemoryMixer::new()
            .with_element(MemoryElement::new("Master", Range::new(0, 100)).with_switch(false));
        let outcome = run_on(&mixer, &master_profile(32), VolumeRequest::query());
        assert_eq!(outcome.status, ExitStatus::Failure);
        assert!(matches!(
            outcome.error,
            Some(EngineError::Profile(ProfileError::NoActiveProfile))
        ));
    }

    #[test]
    fn test_named_profile_overrides_active() {
        let mixer = master(Range::new(0, 100), 10)
            .with_element(MemoryElement::new("PCM", Range::new(0, 255)).with_switch(false));
        let configs = vec![
            master_profile(32).remove(0),
            profile("pcm", "PCM", None, 50, VolumeRepresentation::HardwareUnits),
        ];
        let outcome = run_on(
            &mixer,
            &configs,
            VolumeRequest::new(VolumeChange::SetAbsolute(128)).with_profile("PCM"),
        );
        assert_eq!(outcome.profile.as_deref(), Some("pcm"));
        assert_eq!(mixer.snapshot("PCM").unwrap().left, 128);
        assert_eq!(mixer.snapshot("Master").unwrap().left, 10);
    }

    #[test]
    fn test_guard_unavailable_skips_mutation() {
        let mixer = master(Range::new(0, 100), 40);
        let profiles = resolve_profiles(&master_profile(32), &mixer).unwrap();
        let guard = CountingGuard::new(true);

        let outcome = VolumeChangeEngine::new(&mixer, &guard).execute(
            &VolumeRequest::new(VolumeChange::SetAbsolute(80)),
            &profiles,
            &ToggleGroup::default(),
        );

        assert_eq!(outcome.status, ExitStatus::Success);
        assert!(matches!(
            outcome.error,
            Some(EngineError::ConcurrencyUnavailable(_))
        ));
        assert_eq!(mixer.snapshot("Master").unwrap().left, 40);
    }

    fn output_mixer() -> MemoryMixer {
        MemoryMixer::new()
            .with_element(MemoryElement::new("Master", Range::new(0, 100)).with_volume(60))
            .with_element(MemoryElement::new("Front", Range::new(0, 1)).with_switch(true))
            .with_element(MemoryElement::new("Headphone", Range::new(0, 1)).with_switch(false))
    }

    fn output_profiles() -> Vec<ProfileConfig> {
        let hp = VolumeRepresentation::HardwarePercentage;
        vec![
            ProfileConfig {
                set_default_volume: true,
                ..profile("speakers", "Front", Some("Master"), 40, hp)
            },
            ProfileConfig {
                set_default_volume: true,
                confirm_exceeding_limit: true,
                soft_limit_volume: 30,
                ..profile("headphones", "Headphone", Some("Master"), 25, hp)
            },
        ]
    }

    #[test]
    fn test_toggle_output_presets_shared_volume_before_switching() {
        let mixer = output_mixer();
        let profiles = resolve_profiles(&output_profiles(), &mixer).unwrap();
        let guard = CountingGuard::new(false);

        let outcome = VolumeChangeEngine::new(&mixer, &guard).execute(
            &VolumeRequest::query().with_toggle_output(),
            &profiles,
            &group(&["speakers", "headphones"]),
        );

        assert!(outcome.is_success(), "{}", outcome.message);
        assert_eq!(outcome.profile.as_deref(), Some("headphones"));
        assert_eq!(outcome.volume, Some(25));
        assert_eq!(guard.acquired.get(), 1);

        let volume = |channel| MixerWrite::Volume {
            element: "Master".to_string(),
            channel,
            value: 25,
        };
        assert_eq!(
            mixer.journal(),
            vec![
                volume(Channel::FrontLeft),
                volume(Channel::FrontRight),
                MixerWrite::Switch {
                    element: "Front".to_string(),
                    on: false,
                },
                MixerWrite::Switch {
                    element: "Headphone".to_string(),
                    on: true,
                },
            ]
        );
    }

    #[test]
    fn test_toggle_output_skips_preset_when_volume_matches() {
        let mixer = output_mixer();
        let mut configs = output_profiles();
        configs[1].default_volume = 60;
        configs[1].soft_limit_volume = 100;
        let profiles = resolve_profiles(&configs, &mixer).unwrap();

        VolumeChangeEngine::new(&mixer, &Unguarded).execute(
            &VolumeRequest::query().with_toggle_output(),
            &profiles,
            &group(&["speakers", "headphones"]),
        );

        assert!(mixer
            .journal()
            .iter()
            .all(|write| matches!(write, MixerWrite::Switch { .. })));
        assert!(mixer.snapshot("Headphone").unwrap().switch_left);
    }

    #[test]
    fn test_toggle_output_presets_relative_and_mute_steps() {
        let switches = || {
            vec![
                MixerWrite::Switch {
                    element: "Front".to_string(),
                    on: false,
                },
                MixerWrite::Switch {
                    element: "Headphone".to_string(),
                    on: true,
                },
            ]
        };
        let master = |value| {
            vec![
                MixerWrite::Volume {
                    element: "Master".to_string(),
                    channel: Channel::FrontLeft,
                    value,
                },
                MixerWrite::Volume {
                    element: "Master".to_string(),
                    channel: Channel::FrontRight,
                    value,
                },
            ]
        };

        for (change, expected) in [
            (VolumeChange::SetRelative(-30), 30),
            (VolumeChange::ToggleOnOff { unmute_to: None }, 0),
        ] {
            let mixer = output_mixer();
            let profiles = resolve_profiles(&output_profiles(), &mixer).unwrap();
            let outcome = VolumeChangeEngine::new(&mixer, &Unguarded).execute(
                &VolumeRequest::new(change).with_toggle_output(),
                &profiles,
                &group(&["speakers", "headphones"]),
            );

            assert!(outcome.is_success(), "{}", outcome.message);
            assert_eq!(outcome.volume, Some(expected));
            let mut writes = master(expected);
            writes.extend(switches());
            assert_eq!(mixer.journal(), writes, "{change:?}");
        }
    }

    /// Changes the shared volume right after the guard is taken, the way a
    /// competing invocation would
    struct RacingGuard<'m> {
        mixer: &'m MemoryMixer,
        volume: i64,
    }

    impl ConcurrencyGuard for RacingGuard<'_> {
        fn name(&self) -> &str {
            "racing"
        }

        fn with_guard<T>(&self, body: impl FnOnce() -> T) -> crate::domain::guard::Result<T> {
            let master = self.mixer.resolve_element("Master").unwrap();
            self.mixer.set_volume_all(master, self.volume).unwrap();
            Ok(body())
        }
    }

    #[test]
    fn test_toggle_output_compares_shared_volume_under_guard() {
        let mixer = output_mixer();
        let mut configs = output_profiles();
        configs[1].default_volume = 60;
        configs[1].soft_limit_volume = 100;
        let profiles = resolve_profiles(&configs, &mixer).unwrap();
        let guard = RacingGuard {
            mixer: &mixer,
            volume: 90,
        };

        let outcome = VolumeChangeEngine::new(&mixer, &guard).execute(
            &VolumeRequest::query().with_toggle_output(),
            &profiles,
            &group(&["speakers", "headphones"]),
        );

        assert_eq!(outcome.volume, Some(60));
        assert_eq!(mixer.snapshot("Master").unwrap().left, 60);
    }

    #[test]
    fn test_toggle_output_keeps_volume_without_default() {
        let mixer = output_mixer();
        let mut configs = output_profiles();
        configs[1].set_default_volume = false;
        let profiles = resolve_profiles(&configs, &mixer).unwrap();

        let outcome = VolumeChangeEngine::new(&mixer, &Unguarded).execute(
            &VolumeRequest::query().with_toggle_output(),
            &profiles,
            &group(&["speakers", "headphones"]),
        );
        assert_eq!(outcome.volume, Some(60));
        assert_eq!(mixer.snapshot("Master").unwrap().left, 60);
    }

    #[test]
    fn test_soft_limit_declined_falls_back_to_default() {
        let mixer = output_mixer();
        let profiles = resolve_profiles(&output_profiles(), &mixer).unwrap();
        let guard = CountingGuard::new(false);
        let asked = Cell::new(false);

        let outcome = VolumeChangeEngine::new(&mixer, &guard)
            .with_confirm(|question: &str| {
                assert!(question.contains("headphones"));
                // Prompt must come before the guard is taken
                assert_eq!(guard.acquired.get(), 0);
                asked.set(true);
                false
            })
            .execute(
                &VolumeRequest::new(VolumeChange::SetAbsolute(70)).with_toggle_output(),
                &profiles,
                &group(&["speakers", "headphones"]),
            );

        assert!(asked.get());
        assert_eq!(outcome.volume, Some(25));
        assert_eq!(mixer.snapshot("Master").unwrap().left, 25);
    }

    #[test]
    fn test_soft_limit_confirmed_keeps_request() {
        let mixer = output_mixer();
        let profiles = resolve_profiles(&output_profiles(), &mixer).unwrap();

        VolumeChangeEngine::new(&mixer, &Unguarded)
            .with_confirm(|_: &str| true)
            .execute(
                &VolumeRequest::new(VolumeChange::SetAbsolute(70)).with_toggle_output(),
                &profiles,
                &group(&["speakers", "headphones"]),
            );
        assert_eq!(mixer.snapshot("Master").unwrap().left, 70);
    }

    #[test]
    fn test_toggle_output_wraps_and_applies_default_after_switching() {
        let hp = VolumeRepresentation::HardwarePercentage;
        let mixer = MemoryMixer::new()
            .with_element(MemoryElement::new("A", Range::new(0, 100)).with_switch(false))
            .with_element(MemoryElement::new("B", Range::new(0, 100)).with_switch(false))
            .with_element(
                MemoryElement::new("C", Range::new(0, 100))
                    .with_volume(90)
                    .with_switch(true),
            );
        let configs = vec![
            ProfileConfig {
                set_default_volume: true,
                ..profile("a", "A", None, 20, hp)
            },
            profile("b", "B", None, 30, hp),
            profile("c", "C", None, 40, hp),
        ];
        let profiles = resolve_profiles(&configs, &mixer).unwrap();

        let outcome = VolumeChangeEngine::new(&mixer, &Unguarded).execute(
            &VolumeRequest::query().with_toggle_output(),
            &profiles,
            &group(&["a", "b", "c"]),
        );

        assert_eq!(outcome.profile.as_deref(), Some("a"));
        assert!(mixer.snapshot("A").unwrap().switch_left);
        assert!(!mixer.snapshot("C").unwrap().switch_left);
        assert_eq!(mixer.snapshot("A").unwrap().left, 20);
        assert_eq!(mixer.snapshot("C").unwrap().left, 90);
        assert!(matches!(
            mixer.journal().first(),
            Some(MixerWrite::Switch { on: false, .. })
        ));
    }

    #[test]
    fn test_switch_failure_is_fatal_and_skips_volume() {
        let hp = VolumeRepresentation::HardwarePercentage;
        let mixer = MemoryMixer::new()
            .with_element(MemoryElement::new("A", Range::new(0, 100)).with_volume(10))
            .with_element(
                MemoryElement::new("B", Range::new(0, 100))
                    .with_switch(false)
                    .rejecting_switch_writes(),
            );
        let configs = vec![profile("a", "A", None, 20, hp), profile("b", "B", None, 30, hp)];
        let profiles = resolve_profiles(&configs, &mixer).unwrap();

        let outcome = VolumeChangeEngine::new(&mixer, &Unguarded).execute(
            &VolumeRequest::new(VolumeChange::SetAbsolute(50)).with_toggle_output(),
            &profiles,
            &group(&["a", "b"]),
        );

        assert_eq!(outcome.status, ExitStatus::Failure);
        assert!(matches!(
            &outcome.error,
            Some(EngineError::SwitchFailed { element, .. }) if element == "B"
        ));
        // The off switch already happened, the volume phase did not
        assert!(!mixer.snapshot("A").unwrap().switch_left);
        assert_eq!(mixer.snapshot("B").unwrap().left, 0);
    }

    #[test]
    fn test_toggle_output_outside_group_is_fatal() {
        let mixer = output_mixer();
        let profiles = resolve_profiles(&output_profiles(), &mixer).unwrap();
        let outcome = VolumeChangeEngine::new(&mixer, &Unguarded).execute(
            &VolumeRequest::query().with_toggle_output(),
            &profiles,
            &group(&["headphones"]),
        );
        assert_eq!(outcome.status, ExitStatus::Failure);
        assert!(mixer.journal().is_empty());
    }

    #[test]
    fn test_request_helpers() {
        let request = VolumeRequest::new(VolumeChange::SetRelative(-5));
        assert!(request.is_relative());
        assert_eq!(request.explicit_value(), Some(-5));
        assert_eq!(VolumeRequest::query().explicit_value(), None);
        assert_eq!(
            VolumeRequest::new(VolumeChange::ToggleOnOff { unmute_to: Some(30) }).explicit_value(),
            Some(30)
        );
    }
}
