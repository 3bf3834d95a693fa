//! Integration tests for the volume change engine
//!
//! Configuration is loaded from a real TOML file, resolved against a
//! simulated sound card and driven through whole invocations the way
//! hotkey bindings would.

use avolt_core::domain::{
    resolve_profiles, AvoltConfig, ExitStatus, MemoryElement, MemoryMixer, Range, SoundProfile,
    ToggleGroup, Unguarded, VolumeChange, VolumeChangeEngine, VolumeRepresentation,
    VolumeRequest,
};
use std::fs;
use tempfile::TempDir;

const CONFIG: &str = r#"
device = "default"
toggle_group = ["speakers", "headphones"]

[[profiles]]
name = "speakers"
element = "Front"
control_element = "Master"
default_volume = 40
volume_type = "hardware-percentage"
set_default_volume = true

[[profiles]]
name = "headphones"
element = "Headphone"
control_element = "Master"
default_volume = 20
volume_type = "hardware-percentage"
soft_limit_volume = 30
set_default_volume = true
confirm_exceeding_limit = true

[[profiles]]
name = "pcm"
element = "PCM"
default_volume = -20
volume_type = "decibels"
"#;

/// HDA style card: one volume element feeding two switchable outputs
fn sound_card() -> MemoryMixer {
    MemoryMixer::new()
        .with_element(MemoryElement::new("Master", Range::new(0, 100)).with_volume(40))
        .with_element(MemoryElement::new("Front", Range::new(0, 1)).with_switch(true))
        .with_element(MemoryElement::new("Headphone", Range::new(0, 1)).with_switch(false))
        .with_element(
            MemoryElement::new("PCM", Range::new(0, 255))
                .with_decibels(Range::new(-5100, 0))
                .with_volume(255)
                .without_switch(),
        )
}

fn load(mixer: &MemoryMixer) -> (Vec<SoundProfile>, ToggleGroup) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, CONFIG).unwrap();

    let config = AvoltConfig::load_from_file(&path).unwrap();
    let profiles = resolve_profiles(&config.profiles, mixer).unwrap();
    (profiles, config.toggle_group().unwrap())
}

fn run(mixer: &MemoryMixer, request: VolumeRequest) -> (ExitStatus, Option<i64>) {
    let (profiles, group) = load(mixer);
    let outcome = VolumeChangeEngine::new(mixer, &Unguarded).execute(&request, &profiles, &group);
    (outcome.status, outcome.volume)
}

#[test]
fn test_relative_change_on_active_profile() {
    let mixer = sound_card();
    let (status, volume) = run(&mixer, VolumeRequest::new(VolumeChange::SetRelative(10)));

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(volume, Some(50));
    assert_eq!(mixer.snapshot("Master").unwrap().left, 50);
}

#[test]
fn test_hotkey_repeat_clamps_at_both_ends() {
    let mixer = sound_card();
    for _ in 0..20 {
        run(&mixer, VolumeRequest::new(VolumeChange::SetRelative(5)));
    }
    assert_eq!(mixer.snapshot("Master").unwrap().left, 100);

    for _ in 0..30 {
        run(&mixer, VolumeRequest::new(VolumeChange::SetRelative(-5)));
    }
    assert_eq!(mixer.snapshot("Master").unwrap().left, 0);
}

#[test]
fn test_mute_cycle_returns_to_default() {
    let mixer = sound_card();
    let toggle = || VolumeRequest::new(VolumeChange::ToggleOnOff { unmute_to: None });

    run(&mixer, toggle());
    assert_eq!(mixer.snapshot("Master").unwrap().left, 0);

    run(&mixer, toggle());
    assert_eq!(mixer.snapshot("Master").unwrap().left, 40);
}

#[test]
fn test_output_round_trip() {
    let mixer = sound_card();

    let (status, volume) = run(&mixer, VolumeRequest::query().with_toggle_output());
    assert_eq!(status, ExitStatus::Success);
    assert_eq!(volume, Some(20));
    assert!(!mixer.snapshot("Front").unwrap().switch_left);
    assert!(mixer.snapshot("Headphone").unwrap().switch_left);

    // The headphones are now the active profile
    let (_, volume) = run(&mixer, VolumeRequest::query());
    assert_eq!(volume, Some(20));

    let (_, volume) = run(&mixer, VolumeRequest::query().with_toggle_output());
    assert_eq!(volume, Some(40));
    assert!(mixer.snapshot("Front").unwrap().switch_left);
    assert!(!mixer.snapshot("Headphone").unwrap().switch_left);
}

#[test]
fn test_loud_switch_to_headphones_needs_confirmation() {
    let mixer = sound_card();
    let (_, volume) = run(
        &mixer,
        VolumeRequest::new(VolumeChange::SetAbsolute(90)).with_toggle_output(),
    );

    // Non-interactive engine declines, the headphone default is used
    assert_eq!(volume, Some(20));
}

#[test]
fn test_named_profile_in_decibels() {
    let mixer = sound_card();
    let (status, volume) = run(
        &mixer,
        VolumeRequest::new(VolumeChange::SetDefault).with_profile("pcm"),
    );
    assert_eq!(status, ExitStatus::Success);
    assert_eq!(volume, Some(-20));
    assert_eq!(mixer.snapshot("Master").unwrap().left, 40);

    let (_, volume) = run(
        &mixer,
        VolumeRequest::query()
            .with_profile("pcm")
            .with_representation(VolumeRepresentation::HardwareUnits),
    );
    assert_eq!(volume, Some(mixer.snapshot("PCM").unwrap().left));
}

#[test]
fn test_missing_element_leaves_other_profiles_usable() {
    let mixer = MemoryMixer::new()
        .with_element(MemoryElement::new("Master", Range::new(0, 100)).with_volume(70))
        .with_element(MemoryElement::new("Front", Range::new(0, 1)).with_switch(true));
    let (profiles, group) = load(&mixer);

    assert!(profiles[0].is_initialized());
    assert!(!profiles[1].is_initialized());
    assert!(!profiles[2].is_initialized());

    // Headphones are unavailable, so the toggle comes back to the speakers
    let outcome = VolumeChangeEngine::new(&mixer, &Unguarded).execute(
        &VolumeRequest::query().with_toggle_output(),
        &profiles,
        &group,
    );
    assert_eq!(outcome.status, ExitStatus::Success, "{}", outcome.message);
    assert_eq!(outcome.profile.as_deref(), Some("speakers"));
    assert!(mixer.snapshot("Front").unwrap().switch_left);
    assert_eq!(mixer.snapshot("Master").unwrap().left, 40);
}
