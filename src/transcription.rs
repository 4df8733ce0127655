//! Speech recognition over HTTP.
//!
//! Captured clips are posted as multipart WAV to an OpenAI-compatible
//! `/v1/audio/transcriptions` endpoint. The `SpeechSource` trait is the
//! seam the pipeline worker pulls from, so tests can swap the whole
//! microphone-plus-service stack for a scripted source.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{debug, info};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;

use crate::audio::{encode_wav, MicrophoneCapture, TARGET_SAMPLE_RATE};
use crate::pipeline::{PhaseCell, PipelinePhase};

/// Why a listen attempt produced no usable transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenError {
    /// Nobody spoke in time, or nothing intelligible was said.
    NoSpeech,
    /// The recognition service is unreachable or failing.
    ServiceUnavailable(String),
    /// Anything else: malformed response, rejected request.
    Unexpected(String),
    /// The microphone itself failed. Retrying will not help.
    CaptureFailed(String),
}

impl ListenError {
    /// Whether the pipeline should stop instead of recording the
    /// failure and moving on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ListenError::CaptureFailed(_))
    }

    /// Placeholder feedback line recorded for a failed cycle.
    pub fn describe(&self) -> String {
        match self {
            ListenError::NoSpeech => "Error: Could not understand the audio.".to_string(),
            ListenError::ServiceUnavailable(detail)
            | ListenError::Unexpected(detail)
            | ListenError::CaptureFailed(detail) => format!("Error: {}", detail),
        }
    }
}

impl fmt::Display for ListenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenError::NoSpeech => write!(f, "no speech detected"),
            ListenError::ServiceUnavailable(detail) => {
                write!(f, "speech service unavailable: {}", detail)
            }
            ListenError::Unexpected(detail) => write!(f, "transcription failed: {}", detail),
            ListenError::CaptureFailed(detail) => write!(f, "audio capture failed: {}", detail),
        }
    }
}

impl std::error::Error for ListenError {}

/// One blocking listen-and-recognize attempt.
pub trait SpeechSource: Send {
    fn listen_once(&mut self) -> Result<String, ListenError>;
}

/// Client for the transcription endpoint.
pub struct HttpRecognizer {
    client: Client,
    url: String,
    language: String,
    api_key: Option<String>,
}

impl HttpRecognizer {
    pub fn new(url: &str, language: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        let url = url.trim_end_matches('/').to_string();
        info!("Speech recognition endpoint: {}", url);
        Ok(Self {
            client,
            url,
            language: normalize_language(language),
            api_key,
        })
    }

    /// Send one 16 kHz mono clip and return the trimmed transcript.
    pub fn recognize(&self, samples: &[f32]) -> Result<String, ListenError> {
        if samples.is_empty() {
            return Err(ListenError::NoSpeech);
        }

        let wav_bytes = encode_wav(samples)
            .map_err(|e| ListenError::Unexpected(format!("Failed to encode clip: {}", e)))?;
        let part = Part::bytes(wav_bytes)
            .file_name("clip.wav")
            .mime_str("audio/wav")
            .map_err(|e| ListenError::Unexpected(format!("Failed to build upload: {}", e)))?;
        let form = Form::new()
            .part("file", part)
            .text("response_format", "json")
            .text("language", self.language.clone());

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let started = Instant::now();
        let response = request.send().map_err(|e| {
            ListenError::ServiceUnavailable(format!("Speech service unreachable: {}", e))
        })?;
        let status = response.status();
        let body = response.text().map_err(|e| {
            ListenError::ServiceUnavailable(format!("Speech service connection lost: {}", e))
        })?;

        if status.is_server_error() {
            return Err(ListenError::ServiceUnavailable(format!(
                "Speech service returned status {}: {}",
                status, body
            )));
        }
        if !status.is_success() {
            return Err(ListenError::Unexpected(format!(
                "Transcription request failed with status {}: {}",
                status, body
            )));
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            ListenError::Unexpected(format!("Failed to parse transcription response: {}", e))
        })?;
        let text = value["text"].as_str().unwrap_or("").trim().to_string();
        debug!("Transcription took {:?}: {:?}", started.elapsed(), text);

        if text.is_empty() {
            return Err(ListenError::NoSpeech);
        }
        Ok(text)
    }
}

/// The production speech source: microphone capture plus HTTP
/// recognition.
pub struct MicrophoneSource {
    capture: MicrophoneCapture,
    recognizer: HttpRecognizer,
    phase: Option<Arc<PhaseCell>>,
}

impl MicrophoneSource {
    pub fn new(capture: MicrophoneCapture, recognizer: HttpRecognizer) -> Self {
        Self {
            capture,
            recognizer,
            phase: None,
        }
    }

    /// Report the capture-to-recognition transition through `cell` so
    /// the dashboard can show what the worker is doing.
    pub fn with_phase_cell(mut self, cell: Arc<PhaseCell>) -> Self {
        self.phase = Some(cell);
        self
    }
}

impl SpeechSource for MicrophoneSource {
    fn listen_once(&mut self) -> Result<String, ListenError> {
        let clip = self
            .capture
            .capture_clip()
            .map_err(|e| ListenError::CaptureFailed(format!("{:#}", e)))?;
        let samples = match clip {
            Some(samples) if !samples.is_empty() => samples,
            _ => return Err(ListenError::NoSpeech),
        };

        if let Some(cell) = &self.phase {
            cell.set(PipelinePhase::Recognizing);
        }
        info!(
            "Recognizing {:.1}s of audio",
            samples.len() as f32 / TARGET_SAMPLE_RATE as f32
        );
        self.recognizer.recognize(&samples)
    }
}

/// Reduce a BCP 47 tag like "en-US" to the primary subtag the
/// transcription endpoint expects.
fn normalize_language(language: &str) -> String {
    let primary = language
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    if primary.is_empty() {
        "en".to_string()
    } else {
        primary
    }
}
