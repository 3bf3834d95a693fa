//! Command line arguments

use avolt_core::domain::{VolumeChange, VolumeRepresentation, VolumeRequest};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Volume given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeArg {
    Absolute(i64),
    /// Written with a leading `+` or `-`
    Relative(i64),
}

impl VolumeArg {
    pub fn value(self) -> i64 {
        match self {
            VolumeArg::Absolute(v) | VolumeArg::Relative(v) => v,
        }
    }
}

fn parse_volume(arg: &str) -> Result<VolumeArg, String> {
    let invalid = |_| format!("'{arg}' is not a volume (expected N, +N or -N)");
    if let Some(rest) = arg.strip_prefix('+') {
        rest.parse().map(VolumeArg::Relative).map_err(invalid)
    } else if arg.starts_with('-') {
        arg.parse().map(VolumeArg::Relative).map_err(invalid)
    } else {
        arg.parse().map(VolumeArg::Absolute).map_err(invalid)
    }
}

#[derive(Parser, Debug)]
#[command(name = "avolt", version)]
#[command(about = "Read and change ALSA mixer volume", long_about = None)]
#[command(allow_negative_numbers = true)]
pub struct Cli {
    /// Volume: N sets it, +N raises it, -N lowers it
    #[arg(value_name = "VOLUME", value_parser = parse_volume)]
    pub volume: Option<VolumeArg>,

    /// Set the volume; without a value, reset to the profile's default
    #[arg(
        short,
        long,
        value_name = "VOLUME",
        num_args = 0..=1,
        value_parser = parse_volume,
        conflicts_with = "volume"
    )]
    pub set: Option<Option<VolumeArg>>,

    /// Mute, or unmute to VOLUME (or the profile default)
    #[arg(short, long)]
    pub toggle: bool,

    /// Switch to the next output of the toggle group
    #[arg(short = 'o', long, alias = "tf")]
    pub toggle_output: bool,

    /// Use this profile instead of the active one
    #[arg(short, long, value_name = "NAME")]
    pub profile: Option<String>,

    /// Unit of VOLUME and of the printed volume
    /// (alsa-percentage, hardware-percentage, hardware, decibels)
    #[arg(short, long, value_name = "TYPE")]
    pub representation: Option<VolumeRepresentation>,

    /// Configuration file (default: ~/.config/avolt/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    pub write_config: bool,

    /// List mixer elements and exit
    #[arg(long)]
    pub list: bool,

    /// Show the active profile, its volume and the front panel switch
    #[arg(long)]
    pub status: bool,

    /// Remove a semaphore left behind by a killed process and exit
    #[arg(long)]
    pub unlock: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn request(&self) -> VolumeRequest {
        let value = self.set.flatten().or(self.volume);

        let change = if self.toggle {
            VolumeChange::ToggleOnOff {
                unmute_to: value.map(VolumeArg::value),
            }
        } else {
            match (self.set, value) {
                (_, Some(VolumeArg::Absolute(v))) => VolumeChange::SetAbsolute(v),
                (_, Some(VolumeArg::Relative(d))) => VolumeChange::SetRelative(d),
                (Some(None), None) => VolumeChange::SetDefault,
                _ => VolumeChange::Query,
            }
        };

        let mut request = VolumeRequest::new(change);
        if self.toggle_output {
            request = request.with_toggle_output();
        }
        if let Some(repr) = self.representation {
            request = request.with_representation(repr);
        }
        if let Some(name) = &self.profile {
            request = request.with_profile(name.clone());
        }
        request
    }
}
