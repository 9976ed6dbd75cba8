use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(name = "tuner")]
#[command(about = "Play raw PCM through the track renderer", version)]
pub struct Cli {
    /// List output devices and exit.
    #[arg(short, long)]
    pub list_devices: bool,

    /// Output device name. Defaults to the system default device.
    #[arg(short, long)]
    pub device: Option<String>,

    /// Renderer config file. Defaults to `renderer.json` in the config directory.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Raw interleaved s16le stereo at 48kHz. Plays a test tone when omitted.
    pub input: Option<PathBuf>,
}
