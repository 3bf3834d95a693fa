//! Human readable listings: configuration, mixer elements, status

use avolt_core::domain::{
    AvoltConfig, Channel, MixerBackend, ProfileSelector, SoundProfile, VolumeAccessor,
};
use std::io::{self, Write};

pub fn print_config(config: &AvoltConfig, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Mixer device: {}", config.device)?;
    if config.use_semaphore {
        writeln!(
            out,
            "Using semaphore '{}' to prevent concurrent volume changes",
            config.semaphore_name
        )?;
    } else {
        writeln!(out, "Concurrent volume changes are not serialized")?;
    }
    if let Some(front_panel) = &config.front_panel {
        writeln!(out, "Front panel element: {front_panel}")?;
    }
    if !config.toggle_group.is_empty() {
        writeln!(out, "Toggle group: {}", config.toggle_group.join(" -> "))?;
    }

    writeln!(out, "Sound profiles:")?;
    for profile in &config.profiles {
        writeln!(out, "  {}", profile.name)?;
        writeln!(out, "    Mixer element: {}", profile.element)?;
        writeln!(
            out,
            "    Volume control element: {}",
            profile
                .control_element
                .as_deref()
                .unwrap_or("same as mixer element")
        )?;
        writeln!(out, "    Volume type: {}", profile.volume_type)?;
        writeln!(out, "    Default volume: {}", profile.default_volume)?;
        writeln!(out, "    Soft limit volume: {}", profile.soft_limit_volume)?;
        writeln!(out, "    Set default volume on switch: {}", profile.set_default_volume)?;
        writeln!(
            out,
            "    Confirm exceeding soft limit: {}",
            profile.confirm_exceeding_limit
        )?;
    }
    Ok(())
}

/// One line per element: name, volume range and playback switch state
pub fn list_elements<B: MixerBackend + ?Sized>(mixer: &B, out: &mut impl Write) -> anyhow::Result<()> {
    for info in mixer.elements()? {
        let elem = mixer.resolve_element(&info.name)?;
        write!(out, "{}", info.name)?;
        if info.has_playback_volume {
            write!(out, "  volume {}", mixer.volume_range(elem)?)?;
            if let Some(db) = mixer.decibel_range_hundredths(elem)? {
                write!(out, "  dB [{}, {}]", db.min / 100, db.max / 100)?;
            }
        }
        if info.has_playback_switch {
            let on = mixer.playback_switch(elem, Channel::FrontLeft)?;
            write!(out, "  switch {}", if on { "on" } else { "off" })?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn print_status<B: MixerBackend + ?Sized>(
    mixer: &B,
    config: &AvoltConfig,
    profiles: &[SoundProfile],
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let selector = ProfileSelector::new(mixer);
    match selector.current_profile(profiles) {
        Ok(profile) => {
            let control = profile.elements()?.control;
            let volume = VolumeAccessor::new(mixer).get_volume(control, profile.volume_type)?;
            writeln!(
                out,
                "Active profile: {} (volume {volume}, {})",
                profile.name, profile.volume_type
            )?;
        }
        Err(e) => writeln!(out, "Active profile: none ({e})")?,
    }

    if let Some(name) = &config.front_panel {
        let state = match mixer.resolve_element(name) {
            Ok(elem) if mixer.has_playback_switch(elem) => {
                if selector.is_playback_switch_on(elem)? {
                    "on"
                } else {
                    "off"
                }
            }
            Ok(_) => "no playback switch",
            Err(_) => "not found",
        };
        writeln!(out, "Front panel ({name}): {state}")?;
    }

    for profile in profiles.iter().filter(|p| !p.is_initialized()) {
        writeln!(out, "Profile '{}' is unavailable on this mixer", profile.name)?;
    }
    Ok(())
}
