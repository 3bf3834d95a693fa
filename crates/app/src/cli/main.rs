//! avolt command line tool

mod args;
mod prompt;
mod report;

use anyhow::Context;
use args::Cli;
use avolt_core::domain::{
    resolve_profiles, ConcurrencyGuard, ConfigManager, EngineError, ExecutionOutcome, ExitStatus,
    MixerBackend, SoundProfile, ToggleGroup, Unguarded, VolumeChange, VolumeChangeEngine,
    VolumeRequest,
};
use avolt_infra::{AlsaMixer, NamedSemaphore};
use clap::Parser;
use prompt::StdinConfirm;
use std::io;
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Logging goes to stderr; `RUST_LOG` wins over `-v`
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("avolt: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::new(path.clone()),
        None => ConfigManager::with_default_path()?,
    };
    let config = manager
        .load()
        .with_context(|| format!("invalid configuration in {}", manager.config_path().display()))?;

    if cli.write_config {
        config.save_to_file(manager.config_path())?;
        println!("Configuration written to {}", manager.config_path().display());
        return Ok(ExitCode::SUCCESS);
    }
    if cli.print_config {
        report::print_config(&config, &mut io::stdout().lock())?;
        return Ok(ExitCode::SUCCESS);
    }
    if cli.unlock {
        let removed = NamedSemaphore::unlink(&config.semaphore_name)
            .with_context(|| format!("cannot remove semaphore '{}'", config.semaphore_name))?;
        if removed {
            println!("Removed semaphore '{}'", config.semaphore_name);
        } else {
            println!("Semaphore '{}' does not exist", config.semaphore_name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mixer = AlsaMixer::open(&config.device).context("cannot reach the audio subsystem")?;
    if cli.list {
        report::list_elements(&mixer, &mut io::stdout().lock())?;
        return Ok(ExitCode::SUCCESS);
    }

    let profiles = resolve_profiles(&config.profiles, &mixer)
        .context("no configured sound profile matches this mixer")?;
    let group = config.toggle_group()?;
    if cli.status {
        report::print_status(&mixer, &config, &profiles, &mut io::stdout().lock())?;
        return Ok(ExitCode::SUCCESS);
    }

    let request = cli.request();
    debug!(?request, "Built volume request");
    let read_only = request.change == VolumeChange::Query && !request.toggle_output;

    let outcome = if !config.use_semaphore {
        execute(&mixer, &Unguarded, &request, &profiles, &group)
    } else {
        match NamedSemaphore::open(&config.semaphore_name) {
            Ok(semaphore) => execute(&mixer, &semaphore, &request, &profiles, &group),
            Err(e) if read_only => {
                warn!(error = %e, "Semaphore unavailable, reading without it");
                execute(&mixer, &Unguarded, &request, &profiles, &group)
            }
            Err(e) => {
                // Never change the volume without exclusive access
                eprintln!("avolt: {}", EngineError::ConcurrencyUnavailable(e));
                return Ok(ExitCode::SUCCESS);
            }
        }
    };

    Ok(report_outcome(&outcome, read_only))
}

fn execute<B: MixerBackend + ?Sized, G: ConcurrencyGuard>(
    mixer: &B,
    guard: &G,
    request: &VolumeRequest,
    profiles: &[SoundProfile],
    group: &ToggleGroup,
) -> ExecutionOutcome {
    VolumeChangeEngine::new(mixer, guard)
        .with_confirm(StdinConfirm)
        .execute(request, profiles, group)
}

/// Errors go to stderr, a queried volume to stdout
fn report_outcome(outcome: &ExecutionOutcome, read_only: bool) -> ExitCode {
    if outcome.error.is_some() {
        eprintln!("avolt: {}", outcome.message);
    } else if read_only {
        println!("{}", outcome.message);
    } else {
        info!("{}", outcome.message);
    }

    match outcome.status {
        ExitStatus::Success => ExitCode::SUCCESS,
        ExitStatus::Failure => ExitCode::FAILURE,
    }
}
