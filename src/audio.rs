//! Microphone capture.
//!
//! Opens the configured input device once at startup, then records one
//! clip per pipeline cycle: wait for speech, record until a silence tail
//! or the clip cap, downmix and resample to 16 kHz mono.

use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use hound::{WavSpec, WavWriter};
use log::{debug, error, info};

/// Sample rate of every clip handed to the recognizer.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Clip boundaries and device selection for one capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Input device name, or `None` for the system default.
    pub device: Option<String>,
    /// How long to wait for speech to start before giving up on a cycle.
    pub listen_timeout: Duration,
    /// Hard cap on clip length once speech has started.
    pub max_clip: Duration,
    /// How much continuous quiet ends a clip.
    pub silence_tail: Duration,
    /// RMS level a frame must reach to count as speech.
    pub speech_threshold: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            listen_timeout: Duration::from_secs(5),
            max_clip: Duration::from_secs(30),
            silence_tail: Duration::from_millis(1200),
            speech_threshold: 0.015,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Enumerate input devices for `--list-input-devices`.
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|device| device.name().ok());
    let devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?;

    let mut out = Vec::new();
    for (index, device) in devices.enumerate() {
        let name = device
            .name()
            .unwrap_or_else(|_| format!("Input device {}", index + 1));
        let is_default = default_name.as_deref() == Some(name.as_str());
        out.push(InputDeviceInfo { name, is_default });
    }
    Ok(out)
}

/// A microphone held open for repeated clip capture.
pub struct MicrophoneCapture {
    device: Device,
    config: CaptureConfig,
}

impl MicrophoneCapture {
    /// Resolve the configured device. Fails fast at startup when no
    /// usable microphone exists.
    pub fn open(config: CaptureConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = resolve_input_device(&host, config.device.as_deref())?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let supported = device
            .default_input_config()
            .context("Failed to query default input config")?;
        info!(
            "Capturing from '{}' ({} Hz, {} ch, {:?})",
            name,
            supported.sample_rate().0,
            supported.channels(),
            supported.sample_format()
        );
        Ok(Self { device, config })
    }

    /// Record one clip. Returns `Ok(None)` when no speech started within
    /// the listen timeout, `Ok(Some(samples))` as 16 kHz mono otherwise.
    pub fn capture_clip(&mut self) -> Result<Option<Vec<f32>>> {
        // Re-queried per clip; the default config can change when the OS
        // switches devices underneath us.
        let supported = self
            .device
            .default_input_config()
            .context("Failed to query default input config")?;
        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.config();
        let sample_rate = stream_config.sample_rate.0;
        let channels = usize::from(stream_config.channels.max(1));

        let (frame_tx, frame_rx) = mpsc::sync_channel::<Vec<f32>>(64);
        let stream = build_capture_stream(
            &self.device,
            sample_format,
            &stream_config,
            channels,
            frame_tx,
        )?;
        stream.play().context("Failed to start input stream")?;

        let clip = collect_clip(&frame_rx, sample_rate, &self.config);
        drop(stream);

        match clip {
            Some(samples) => {
                debug!("Captured {} samples at {} Hz", samples.len(), sample_rate);
                let samples = if sample_rate == TARGET_SAMPLE_RATE {
                    samples
                } else {
                    resample_linear(&samples, sample_rate, TARGET_SAMPLE_RATE)
                };
                Ok(Some(samples))
            }
            None => Ok(None),
        }
    }
}

fn resolve_input_device(host: &cpal::Host, requested: Option<&str>) -> Result<Device> {
    if let Some(raw) = requested {
        let wanted = raw.trim();
        if !wanted.is_empty() {
            let wanted_lower = wanted.to_lowercase();
            let devices = host
                .input_devices()
                .context("Failed to enumerate input devices")?;
            let mut partial = None;
            for device in devices {
                let label = match device.name() {
                    Ok(label) => label,
                    Err(_) => continue,
                };
                if label == wanted {
                    return Ok(device);
                }
                if partial.is_none() && label.to_lowercase().contains(&wanted_lower) {
                    partial = Some(device);
                }
            }
            if let Some(device) = partial {
                return Ok(device);
            }
            return Err(anyhow!("No input device matching '{}'", wanted));
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }

    host.input_devices()
        .context("Failed to enumerate input devices")?
        .next()
        .ok_or_else(|| anyhow!("No input device is available"))
}

fn build_capture_stream(
    device: &Device,
    sample_format: SampleFormat,
    stream_config: &StreamConfig,
    channels: usize,
    frame_tx: SyncSender<Vec<f32>>,
) -> Result<Stream> {
    let err_fn = move |err| {
        error!("Input stream error: {}", err);
    };

    let stream = match sample_format {
        SampleFormat::F32 => {
            let tx = frame_tx.clone();
            device
                .build_input_stream(
                    stream_config,
                    move |data: &[f32], _| {
                        let _ = tx.try_send(mono_from_f32(data, channels));
                    },
                    err_fn,
                    None,
                )
                .context("Failed to build f32 input stream")?
        }
        SampleFormat::I16 => {
            let tx = frame_tx.clone();
            device
                .build_input_stream(
                    stream_config,
                    move |data: &[i16], _| {
                        let _ = tx.try_send(mono_from_i16(data, channels));
                    },
                    err_fn,
                    None,
                )
                .context("Failed to build i16 input stream")?
        }
        SampleFormat::U16 => {
            let tx = frame_tx.clone();
            device
                .build_input_stream(
                    stream_config,
                    move |data: &[u16], _| {
                        let _ = tx.try_send(mono_from_u16(data, channels));
                    },
                    err_fn,
                    None,
                )
                .context("Failed to build u16 input stream")?
        }
        _ => {
            return Err(anyhow!(
                "Unsupported input sample format: {:?}",
                sample_format
            ));
        }
    };

    Ok(stream)
}

/// Pull mono frames off `frames` until one clip is complete.
///
/// Phase one waits up to `listen_timeout` for a frame at or above the
/// speech threshold; quieter frames are discarded. Phase two then keeps
/// recording until `silence_tail` worth of continuous quiet arrives, the
/// clip reaches `max_clip`, or the stream ends.
fn collect_clip(
    frames: &Receiver<Vec<f32>>,
    sample_rate: u32,
    config: &CaptureConfig,
) -> Option<Vec<f32>> {
    let listen_deadline = Instant::now() + config.listen_timeout;

    let mut clip: Vec<f32>;
    loop {
        let now = Instant::now();
        if now >= listen_deadline {
            return None;
        }
        match frames.recv_timeout(listen_deadline - now) {
            Ok(frame) => {
                if frame_rms(&frame) >= config.speech_threshold {
                    clip = frame;
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return None;
            }
        }
    }

    let silence_samples = samples_for(sample_rate, config.silence_tail).max(1);
    let max_samples = samples_for(sample_rate, config.max_clip).max(1);
    let mut trailing_quiet = 0usize;

    while clip.len() < max_samples {
        match frames.recv_timeout(config.silence_tail) {
            Ok(frame) => {
                trailing_quiet = if frame_rms(&frame) < config.speech_threshold {
                    trailing_quiet + frame.len()
                } else {
                    0
                };
                clip.extend_from_slice(&frame);
                if trailing_quiet >= silence_samples {
                    break;
                }
            }
            // A stalled or closed stream ends the clip with what we have.
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    clip.truncate(max_samples);

    Some(clip)
}

fn samples_for(sample_rate: u32, duration: Duration) -> usize {
    (sample_rate as f64 * duration.as_secs_f64()).round() as usize
}

pub fn frame_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum();
    (energy / samples.len() as f32).sqrt()
}

fn mono_from_f32(input: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return input.to_vec();
    }
    let mut output = Vec::with_capacity(input.len() / channels);
    for frame in input.chunks_exact(channels) {
        output.push(frame.iter().copied().sum::<f32>() / channels as f32);
    }
    output
}

fn mono_from_i16(input: &[i16], channels: usize) -> Vec<f32> {
    let scale = i16::MAX as f32;
    if channels <= 1 {
        return input.iter().map(|s| *s as f32 / scale).collect();
    }
    let mut output = Vec::with_capacity(input.len() / channels);
    for frame in input.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|s| *s as f32 / scale).sum();
        output.push(sum / channels as f32);
    }
    output
}

fn mono_from_u16(input: &[u16], channels: usize) -> Vec<f32> {
    let scale = u16::MAX as f32;
    if channels <= 1 {
        return input.iter().map(|s| (*s as f32 / scale) * 2.0 - 1.0).collect();
    }
    let mut output = Vec::with_capacity(input.len() / channels);
    for frame in input.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|s| (*s as f32 / scale) * 2.0 - 1.0).sum();
        output.push(sum / channels as f32);
    }
    output
}

fn resample_linear(samples: &[f32], in_rate: u32, out_rate: u32) -> Vec<f32> {
    if samples.is_empty() || in_rate == 0 || out_rate == 0 || in_rate == out_rate {
        return samples.to_vec();
    }

    let ratio = out_rate as f64 / in_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(out_len);

    for idx in 0..out_len {
        let src = idx as f64 / ratio;
        let left = src.floor() as usize;
        let right = (left + 1).min(samples.len() - 1);
        let frac = (src - left as f64) as f32;
        out.push(samples[left] + (samples[right] - samples[left]) * frac);
    }

    out
}

/// Encode a 16 kHz mono clip as 16-bit PCM WAV bytes.
pub fn encode_wav(samples: &[f32]) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).context("Failed to encode WAV clip")?;
    for sample in samples {
        let sample_i16 = (sample * i16::MAX as f32) as i16;
        writer.write_sample(sample_i16)?;
    }
    writer.finalize().context("Failed to finalize WAV clip")?;

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    fn test_config(listen_ms: u64, tail_ms: u64, max_ms: u64) -> CaptureConfig {
        CaptureConfig {
            device: None,
            listen_timeout: Duration::from_millis(listen_ms),
            max_clip: Duration::from_millis(max_ms),
            silence_tail: Duration::from_millis(tail_ms),
            speech_threshold: 0.015,
        }
    }

    fn loud(len: usize) -> Vec<f32> {
        vec![0.5; len]
    }

    fn quiet(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    #[test]
    fn test_frame_rms() {
        assert_eq!(frame_rms(&[]), 0.0);
        assert_eq!(frame_rms(&quiet(512)), 0.0);
        let square = vec![0.5, -0.5, 0.5, -0.5];
        assert!((frame_rms(&square) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_collect_clip_times_out_without_speech() {
        let (tx, rx) = sync_channel::<Vec<f32>>(8);
        let started = Instant::now();
        let clip = collect_clip(&rx, 16_000, &test_config(30, 25, 1000));
        assert!(clip.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
        drop(tx);
    }

    #[test]
    fn test_collect_clip_returns_none_when_stream_closes_early() {
        let (tx, rx) = sync_channel::<Vec<f32>>(8);
        tx.send(quiet(800)).unwrap();
        drop(tx);
        let clip = collect_clip(&rx, 16_000, &test_config(500, 25, 1000));
        assert!(clip.is_none());
    }

    #[test]
    fn test_collect_clip_skips_leading_quiet_and_stops_on_silence_tail() {
        let (tx, rx) = sync_channel::<Vec<f32>>(8);
        tx.send(quiet(160)).unwrap();
        tx.send(loud(800)).unwrap();
        tx.send(loud(800)).unwrap();
        // 25 ms tail at 16 kHz is 400 samples; one 800-sample quiet
        // frame is enough to end the clip.
        tx.send(quiet(800)).unwrap();

        let clip = collect_clip(&rx, 16_000, &test_config(500, 25, 60_000)).unwrap();
        assert_eq!(clip.len(), 2400);
        assert!(clip[0] > 0.4);
        drop(tx);
    }

    #[test]
    fn test_collect_clip_respects_max_clip_length() {
        let (tx, rx) = sync_channel::<Vec<f32>>(8);
        for _ in 0..3 {
            tx.send(loud(400)).unwrap();
        }
        drop(tx);

        // 50 ms cap at 16 kHz is 800 samples.
        let clip = collect_clip(&rx, 16_000, &test_config(500, 1000, 50)).unwrap();
        assert_eq!(clip.len(), 800);
    }

    #[test]
    fn test_collect_clip_keeps_partial_clip_on_disconnect() {
        let (tx, rx) = sync_channel::<Vec<f32>>(8);
        tx.send(loud(800)).unwrap();
        drop(tx);

        let clip = collect_clip(&rx, 16_000, &test_config(500, 1000, 60_000)).unwrap();
        assert_eq!(clip.len(), 800);
    }

    #[test]
    fn test_mono_downmix_averages_channels() {
        let stereo = vec![0.2_f32, 0.6, -0.2, 0.2];
        assert_eq!(mono_from_f32(&stereo, 2), vec![0.4, 0.0]);

        let mono = mono_from_i16(&[i16::MAX, 0], 1);
        assert!((mono[0] - 1.0).abs() < 1e-6);
        assert_eq!(mono[1], 0.0);

        let centered = mono_from_u16(&[u16::MAX / 2, u16::MAX / 2], 2);
        assert!(centered[0].abs() < 0.01);
    }

    #[test]
    fn test_resample_linear_changes_length_by_ratio() {
        let input = vec![0.25_f32; 1000];
        assert_eq!(resample_linear(&input, 32_000, 16_000).len(), 500);
        assert_eq!(resample_linear(&input, 16_000, 16_000).len(), 1000);
        assert!(resample_linear(&[], 48_000, 16_000).is_empty());
    }

    #[test]
    fn test_encode_wav_is_parseable_16k_mono() {
        let bytes = encode_wav(&vec![0.25_f32; 160]).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 160);
    }
}
