//! drummimasin: headless step-sequenced drum machine driven from the terminal

mod commands;
mod config;
mod console;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use commands::Command;
use console::{Console, Flow};
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use drummimasin_services::{AudioEngine, AudioOutputService, CaptureTap, DefaultFetcher, SampleFetcher, UiEvent};
use tracing::{info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Control loop period; UI events are drained at this rate
const TICK: Duration = Duration::from_millis(15);

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line.trim_end_matches(['\r', '\n']).to_string()).is_err() {
                break;
            }
        }
    });
    rx
}

fn report(event: UiEvent) {
    match event {
        UiEvent::StepChanged { step, time, .. } => trace!(step, time, "Step"),
        UiEvent::PatternChanged { track } => trace!(%track, "Pattern changed"),
        UiEvent::TransportStopped { .. } => println!("stopped"),
        UiEvent::RecordingStopped { auto: true } => println!("recording reached its limit, finalizing"),
        UiEvent::RecordingStopped { auto: false } => println!("recording stopped, finalizing"),
        UiEvent::RecordingFailed { error } => println!("recording lost: {}", error),
        UiEvent::SampleLoaded { track, location } => match track {
            Some(track) => println!("{} <- {}", track, location),
            None => println!("piano <- {}", location),
        },
        UiEvent::SampleLoadFailed { location, error, .. } => println!("could not load {}: {}", location, error),
        UiEvent::LiveLoopAssigned { frames } => println!("live loop ready ({} frames)", frames),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("drummimasin=debug".parse()?))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(config::config_path);
    let config = config::load_config(&config_path);

    let sample_rate = match AudioOutputService::default_device_info() {
        Ok(device) => {
            info!(device = %device.name, sample_rate = device.sample_rate, "Output device");
            device.sample_rate
        }
        Err(e) => {
            warn!(error = %e, "Could not query output device, using configured rate");
            config.audio.sample_rate
        }
    };

    let fetcher: Arc<dyn SampleFetcher> = Arc::new(match &config.samples.root {
        Some(root) => DefaultFetcher::with_base_dir(root),
        None => DefaultFetcher::new(),
    });

    let (mut engine, mut draw_queue) = AudioEngine::new(&config.engine, sample_rate, fetcher);
    if let Some(manifest) = &config.samples.manifest {
        engine.fetch_manifest(manifest);
    }
    engine.start_output().context("failed to open audio output")?;

    if config.engine.recorder.tap == CaptureTap::Input {
        if let Err(e) = engine.enable_capture_input(&config.audio.input_device) {
            warn!(error = %e, "Recording disabled, continuing without capture input");
        }
    }

    info!("Starting drummimasin, type `help` for commands");
    let lines = spawn_stdin_reader();
    let mut console = Console::new();

    loop {
        match lines.recv_timeout(TICK) {
            Ok(line) if line.trim().is_empty() && line != " " => {}
            Ok(line) => {
                let flow = Command::parse(&line).and_then(|command| console.execute(&mut engine, command));
                match flow {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => println!("error: {:#}", e),
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        engine.poll();
        for event in draw_queue.drain_due(engine.now()) {
            report(event);
        }
    }

    if let Err(e) = engine.stop_output() {
        warn!(error = %e, "Failed to stop audio output");
    }
    info!("Shutting down");
    Ok(())
}
