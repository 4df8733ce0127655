//! Service configuration, stored as a JSON file next to the binary.
//!
//! Every field has a default, so a partial file works and a missing
//! file is created on first run. Command line flags override the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::audio::CaptureConfig;
use crate::cli::CliArgs;

pub const DEFAULT_CONFIG_PATH: &str = "attune.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppSettings {
    /// Recognition language code passed to the speech service.
    #[serde(default = "default_language")]
    pub language: String,
    /// Where the CSV transcription log is written.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Dashboard bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Transcription service endpoint.
    #[serde(default = "default_stt_url")]
    pub stt_url: String,
    /// Bearer token for the transcription service, if it wants one.
    #[serde(default)]
    pub stt_api_key: Option<String>,
    /// Input device name, or `None` for the system default.
    #[serde(default)]
    pub input_device: Option<String>,
    #[serde(default = "default_listen_timeout_secs")]
    pub listen_timeout_secs: u64,
    #[serde(default = "default_max_clip_secs")]
    pub max_clip_secs: u64,
    #[serde(default = "default_silence_tail_ms")]
    pub silence_tail_ms: u64,
    #[serde(default = "default_speech_threshold")]
    pub speech_threshold: f32,
    /// Most records kept in memory; 0 keeps everything.
    #[serde(default)]
    pub history_limit: usize,
}

impl AppSettings {
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(bind) = &args.bind {
            self.bind = bind.clone();
        }
        if let Some(output) = &args.output {
            self.output = output.clone();
        }
        if let Some(language) = &args.language {
            self.language = language.clone();
        }
        if let Some(url) = &args.stt_url {
            self.stt_url = url.clone();
        }
        if let Some(device) = &args.device {
            self.input_device = Some(device.clone());
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device: self.input_device.clone(),
            listen_timeout: Duration::from_secs(self.listen_timeout_secs),
            max_clip: Duration::from_secs(self.max_clip_secs),
            silence_tail: Duration::from_millis(self.silence_tail_ms),
            speech_threshold: self.speech_threshold,
        }
    }
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("data/transcriptions.csv")
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_stt_url() -> String {
    "http://127.0.0.1:5500/v1/audio/transcriptions".to_string()
}

fn default_listen_timeout_secs() -> u64 {
    5
}

fn default_max_clip_secs() -> u64 {
    30
}

fn default_silence_tail_ms() -> u64 {
    1200
}

fn default_speech_threshold() -> f32 {
    0.015
}

pub fn get_default_settings() -> AppSettings {
    AppSettings {
        language: default_language(),
        output: default_output(),
        bind: default_bind(),
        stt_url: default_stt_url(),
        stt_api_key: None,
        input_device: None,
        listen_timeout_secs: default_listen_timeout_secs(),
        max_clip_secs: default_max_clip_secs(),
        silence_tail_ms: default_silence_tail_ms(),
        speech_threshold: default_speech_threshold(),
        history_limit: 0,
    }
}

/// Read settings from `path`, creating the file with defaults when it
/// does not exist. A file that fails to parse is left untouched and the
/// defaults are used for this run.
pub fn load_or_create(path: &Path) -> Result<AppSettings> {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                Ok(settings)
            }
            Err(err) => {
                warn!(
                    "Failed to parse {}: {}; falling back to defaults",
                    path.display(),
                    err
                );
                Ok(get_default_settings())
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let settings = get_default_settings();
            save_settings(path, &settings)?;
            info!("Created default settings at {}", path.display());
            Ok(settings)
        }
        Err(err) => {
            Err(err).with_context(|| format!("Failed to read settings from {}", path.display()))
        }
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let contents =
        serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = get_default_settings();
        assert_eq!(settings.language, "en-US");
        assert_eq!(settings.output, PathBuf::from("data/transcriptions.csv"));
        assert_eq!(settings.bind, "0.0.0.0:5000");
        assert_eq!(
            settings.stt_url,
            "http://127.0.0.1:5500/v1/audio/transcriptions"
        );
        assert_eq!(settings.listen_timeout_secs, 5);
        assert_eq!(settings.history_limit, 0);
        assert!(settings.input_device.is_none());
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("attune.json");

        let settings = load_or_create(&path).unwrap();
        assert_eq!(settings, get_default_settings());
        assert!(path.is_file());

        let reloaded = load_or_create(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("attune.json");
        fs::write(&path, "{\"bind\": \"127.0.0.1:8080\", \"history_limit\": 50}").unwrap();

        let settings = load_or_create(&path).unwrap();
        assert_eq!(settings.bind, "127.0.0.1:8080");
        assert_eq!(settings.history_limit, 50);
        assert_eq!(settings.language, "en-US");
        assert_eq!(settings.listen_timeout_secs, 5);
    }

    #[test]
    fn test_unparseable_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("attune.json");
        fs::write(&path, "not json at all").unwrap();

        let settings = load_or_create(&path).unwrap();
        assert_eq!(settings, get_default_settings());
        assert_eq!(fs::read_to_string(&path).unwrap(), "not json at all");
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("attune.json");

        let mut settings = get_default_settings();
        settings.language = "de-DE".to_string();
        settings.stt_api_key = Some("secret".to_string());
        settings.silence_tail_ms = 800;
        save_settings(&path, &settings).unwrap();

        let reloaded = load_or_create(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_cli_overrides() {
        let mut settings = get_default_settings();
        let args = CliArgs {
            bind: Some("127.0.0.1:9000".to_string()),
            output: Some(PathBuf::from("/tmp/log.csv")),
            language: Some("fr-FR".to_string()),
            stt_url: Some("http://stt.local/v1/audio/transcriptions".to_string()),
            device: Some("USB Microphone".to_string()),
            ..CliArgs::default()
        };

        settings.apply_cli_overrides(&args);
        assert_eq!(settings.bind, "127.0.0.1:9000");
        assert_eq!(settings.output, PathBuf::from("/tmp/log.csv"));
        assert_eq!(settings.language, "fr-FR");
        assert_eq!(settings.stt_url, "http://stt.local/v1/audio/transcriptions");
        assert_eq!(settings.input_device.as_deref(), Some("USB Microphone"));

        let untouched = get_default_settings();
        let mut unchanged = get_default_settings();
        unchanged.apply_cli_overrides(&CliArgs::default());
        assert_eq!(unchanged, untouched);
    }

    #[test]
    fn test_capture_config_conversion() {
        let mut settings = get_default_settings();
        settings.input_device = Some("USB Microphone".to_string());
        settings.listen_timeout_secs = 7;
        settings.silence_tail_ms = 900;

        let config = settings.capture_config();
        assert_eq!(config.device.as_deref(), Some("USB Microphone"));
        assert_eq!(config.listen_timeout, Duration::from_secs(7));
        assert_eq!(config.max_clip, Duration::from_secs(30));
        assert_eq!(config.silence_tail, Duration::from_millis(900));
        assert!((config.speech_threshold - 0.015).abs() < f32::EPSILON);
    }
}
