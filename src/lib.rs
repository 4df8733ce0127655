//! Attune: live speech sentiment coaching.
//!
//! A background worker captures microphone audio, transcribes it over
//! HTTP, classifies sentiment and tone, derives coaching feedback, and
//! appends the result to an in-memory history mirrored to CSV. A small
//! HTTP dashboard serves the history.

pub mod api_server;
pub mod audio;
pub mod classify;
pub mod cli;
pub mod coaching;
pub mod export;
pub mod history;
pub mod pipeline;
pub mod settings;
pub mod transcription;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use env_filter::Builder as EnvFilterBuilder;
use log::{debug, info, warn};

use crate::api_server::DashboardServer;
use crate::audio::MicrophoneCapture;
use crate::cli::CliArgs;
use crate::export::CsvExporter;
use crate::history::InteractionHistory;
use crate::pipeline::CoachingPipeline;
use crate::settings::DEFAULT_CONFIG_PATH;
use crate::transcription::{HttpRecognizer, MicrophoneSource};

/// Configure console logging from RUST_LOG, falling back to info-level
/// (or debug-level with `--debug`) when the variable is unset.
fn init_logging(debug: bool) {
    let fallback = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(fallback);
    builder.format_timestamp_millis();

    let mut invalid_spec = None;
    if let Ok(spec) = std::env::var("RUST_LOG") {
        if !spec.trim().is_empty() {
            // Validate the directives first so a bad value falls back
            // instead of silencing everything.
            match EnvFilterBuilder::new().try_parse(&spec) {
                Ok(_) => {
                    builder.parse_filters(&spec);
                }
                Err(err) => invalid_spec = Some((spec, err.to_string())),
            }
        }
    }

    // Tests may initialize logging more than once.
    let _ = builder.try_init();

    if let Some((spec, err)) = invalid_spec {
        warn!(
            "Ignoring invalid RUST_LOG value '{}': {}. Falling back to default console logging",
            spec, err
        );
    }
}

#[cfg(unix)]
fn setup_signal_handler(shutdown: Arc<AtomicBool>) -> Result<()> {
    use anyhow::Context;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    debug!("Signal handlers registered (SIGINT, SIGTERM)");
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            let name = match signal {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                _ => "signal",
            };
            info!("Received {}, shutting down", name);
            shutdown.store(true, Ordering::SeqCst);
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handler(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

fn print_input_devices() -> Result<()> {
    let devices = audio::list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }
    for device in devices {
        if device.is_default {
            println!("{}  (default)", device.name);
        } else {
            println!("{}", device.name);
        }
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.debug);

    if args.list_input_devices {
        return print_input_devices();
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut settings = settings::load_or_create(&config_path)?;
    settings.apply_cli_overrides(&args);
    debug!("Effective settings: {:?}", settings);

    let history = Arc::new(InteractionHistory::new(settings.history_limit));
    let pipeline = CoachingPipeline::new(history.clone());

    // Resource setup fails fast; once the worker is running, per-cycle
    // failures are recorded instead of crashing.
    let capture = MicrophoneCapture::open(settings.capture_config())?;
    let recognizer = HttpRecognizer::new(
        &settings.stt_url,
        &settings.language,
        settings.stt_api_key.clone(),
    )?;
    let source = MicrophoneSource::new(capture, recognizer).with_phase_cell(pipeline.phase_cell());
    let exporter = CsvExporter::new(settings.output.clone());

    let mut dashboard = DashboardServer::start(&settings.bind, history, pipeline.phase_cell())?;
    pipeline.start(Box::new(source), exporter);

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handler(shutdown.clone())?;

    info!("Attune is running; press Ctrl-C to stop");
    while !shutdown.load(Ordering::SeqCst) && pipeline.is_running() {
        thread::sleep(Duration::from_millis(250));
    }

    pipeline.stop();
    dashboard.stop();

    if let Some(cause) = pipeline.fatal_error() {
        return Err(anyhow!("Capture pipeline failed: {}", cause));
    }
    info!("Shutdown complete");
    Ok(())
}
