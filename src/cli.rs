use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "attune", about = "Attune - live speech sentiment coaching")]
pub struct CliArgs {
    /// Path to the settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Dashboard bind address, e.g. 0.0.0.0:5000
    #[arg(long)]
    pub bind: Option<String>,

    /// Path of the CSV transcription log
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Recognition language code, e.g. en-US
    #[arg(long)]
    pub language: Option<String>,

    /// Transcription service endpoint URL
    #[arg(long)]
    pub stt_url: Option<String>,

    /// Input device name (exact or substring match)
    #[arg(long)]
    pub device: Option<String>,

    /// List available input devices and exit
    #[arg(long)]
    pub list_input_devices: bool,

    /// Enable debug mode with verbose logging
    #[arg(long)]
    pub debug: bool,
}
