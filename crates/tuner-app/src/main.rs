//! Tuner driver - plays PCM through the track renderer.
//!
//! Usage: `tuner [--list-devices] [--device NAME] [--config PATH] [INPUT.pcm]`
//!
//! INPUT is raw interleaved s16le stereo at 48kHz. Without it a test tone is
//! played.

mod cli;
mod feed;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tuner_audio::{
    list_output_devices, shared_sink, CpalSink, DecoderAdapter, MemorySource, RendererEvent,
    TrackRenderer,
};
use tuner_core::{Clock, DecoderKind, Encoding, Format, RendererConfig, SystemClock};

/// Pause between render steps.
const RENDER_INTERVAL: Duration = Duration::from_millis(5);

const TONE_HZ: f32 = 440.0;
const TONE_DURATION_MS: u64 = 3_000;

/// Explicit path, or `renderer.json` in the platform config directory.
fn config_path(cli: &Cli) -> Option<PathBuf> {
    cli.config.clone().or_else(|| {
        directories::ProjectDirs::from("", "", "tuner")
            .map(|dirs| dirs.config_dir().join("renderer.json"))
    })
}

fn load_config(cli: &Cli) -> Result<RendererConfig> {
    let mut config = match config_path(cli) {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            RendererConfig::load_or_default(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => RendererConfig::default(),
    };

    // The cpal device only takes PCM and no frame decoder is built in.
    if config.target_encoding != Encoding::Pcm16 {
        warn!(
            "Output device plays PCM only; ignoring target encoding {}",
            config.target_encoding.mime_type()
        );
        config.target_encoding = Encoding::Pcm16;
    }
    if config.is_software_decode() {
        warn!("No frame decoder available; using passthrough");
        config.decoder = DecoderKind::Passthrough;
    }
    Ok(config)
}

fn log_event(event: &RendererEvent) {
    match event {
        RendererEvent::TrackInitializationError(e) => {
            warn!("Audio output unavailable, playing silently: {e}");
        }
        RendererEvent::TrackWriteError(e) => error!("Audio write failed: {e}"),
        RendererEvent::DecodeError {
            presentation_time_us,
            message,
        } => error!("Decode failed at {presentation_time_us}us: {message}"),
        RendererEvent::FormatChanged(format) => info!(
            "Playing {} {}ch {}Hz",
            format.encoding.mime_type(),
            format.channel_count,
            format.sample_rate
        ),
        RendererEvent::BufferingChanged(buffering) => debug!("Buffering: {buffering}"),
        RendererEvent::EndOfStream => info!("All audio handed to the device"),
    }
}

/// Drive the renderer until the device has played everything.
fn run(renderer: &mut TrackRenderer, clock: &dyn Clock) -> Result<()> {
    while !renderer.prepare(0)? {
        std::thread::sleep(RENDER_INTERVAL);
    }
    renderer.enable(0)?;
    renderer.start()?;

    let events = renderer.events();
    while !renderer.is_ended() {
        let position_us = renderer.position_us();
        renderer
            .do_some_work(position_us, clock.now_us())
            .context("Renderer failed")?;
        for event in events.try_iter() {
            log_event(&event);
        }
        std::thread::sleep(RENDER_INTERVAL);
    }

    info!("Playback finished at {}ms", renderer.position_us() / 1000);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tuner=debug,tuner_audio=info".into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting tuner v{}", env!("CARGO_PKG_VERSION"));

    if cli.list_devices {
        for name in list_output_devices()? {
            info!("Output device: {name}");
        }
        return Ok(());
    }
    let config = load_config(&cli)?;

    let format = Format::new(2, 48_000, Encoding::Pcm16);
    let pcm = match &cli.input {
        Some(path) => feed::load_pcm(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            info!("No input given, playing a {TONE_HZ}Hz tone");
            feed::tone(&format, TONE_HZ, TONE_DURATION_MS)
        }
    };

    let source = MemorySource::with_format(format);
    let units = feed::feed(&source, &format, pcm);
    info!("Queued {units} units");

    let clock = SystemClock::shared();
    let sink = shared_sink(CpalSink::with_device_name(cli.device.clone()));
    let mut renderer = TrackRenderer::new(
        config,
        Box::new(source),
        DecoderAdapter::passthrough(),
        sink,
        clock.clone(),
    );

    let result = run(&mut renderer, clock.as_ref());
    renderer.release();
    result
}
