//! Microphone capture with RMS-based utterance endpointing.
//!
//! Records from the default input device until the speaker has been quiet for
//! `silence_duration` after saying something, or until the mode's overall
//! listening window elapses with no speech at all. The recorded samples are
//! WAV-encoded in memory and handed to the speech-to-text backend.

use crate::stt::Transcribe;
use alfred_core::adapters::CaptureAdapter;
use alfred_core::error::{AlfredError, AlfredResult};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Input device settings and endpointing thresholds.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per endpointing window.
    pub chunk_size: usize,
    /// RMS level (int16 scale) above which a chunk counts as speech.
    pub silence_threshold: f32,
    /// Quiet time after speech that ends the utterance.
    pub silence_duration: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            chunk_size: 1024,
            silence_threshold: 500.0,
            silence_duration: Duration::from_millis(1500),
        }
    }
}

/// RMS level on the int16 scale, matching the threshold units.
pub(crate) fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean_square.sqrt() * 32_768.0
}

/// Record one utterance from the default input device. Blocking; run on a
/// blocking thread. Returns `None` when the window elapsed without speech.
fn record_utterance(config: &AudioConfig, timeout: Duration) -> AlfredResult<Option<Vec<f32>>> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| AlfredError::Capture("no input device available".to_string()))?;
    debug!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        "opening input stream"
    );

    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<f32>>();
    let chunk_size = config.chunk_size;
    let mut pending = Vec::with_capacity(chunk_size);
    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    pending.push(sample);
                    if pending.len() >= chunk_size {
                        if chunk_tx.send(std::mem::take(&mut pending)).is_err() {
                            return;
                        }
                        pending.reserve(chunk_size);
                    }
                }
            },
            |err| warn!("input stream error: {err}"),
            None,
        )
        .map_err(|e| AlfredError::Capture(e.to_string()))?;
    stream
        .play()
        .map_err(|e| AlfredError::Capture(e.to_string()))?;

    info!("🎤 listening...");

    // Text mode passes an effectively unbounded window; voice modes are finite.
    let deadline = Instant::now().checked_add(timeout);
    let quiet_chunks_needed =
        (config.silence_duration.as_secs_f32() * config.sample_rate as f32 / chunk_size as f32)
            .ceil() as usize;

    let mut samples = Vec::new();
    let mut has_speech = false;
    let mut quiet_chunks = 0usize;

    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        let chunk = match chunk_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(chunk) => chunk,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(AlfredError::Capture("input stream closed".to_string()));
            }
        };

        let level = rms_level(&chunk);
        samples.extend_from_slice(&chunk);

        if level > config.silence_threshold {
            has_speech = true;
            quiet_chunks = 0;
        } else {
            quiet_chunks += 1;
        }

        if has_speech && quiet_chunks >= quiet_chunks_needed {
            debug!("silence after speech; utterance complete");
            break;
        }
    }
    drop(stream);

    if !has_speech {
        return Ok(None);
    }
    Ok(Some(samples))
}

/// Encode captured samples as a 16-bit PCM WAV in memory.
pub(crate) fn encode_wav(samples: &[f32], config: &AudioConfig) -> AlfredResult<Vec<u8>> {
    let spec = WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer =
        WavWriter::new(&mut cursor, spec).map_err(|e| AlfredError::Capture(e.to_string()))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| AlfredError::Capture(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AlfredError::Capture(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Microphone capture adapter: records an utterance, transcribes it, and
/// yields the transcript.
pub struct MicCapture<T: Transcribe> {
    config: AudioConfig,
    transcriber: T,
}

impl<T: Transcribe> MicCapture<T> {
    pub fn new(config: AudioConfig, transcriber: T) -> Self {
        Self { config, transcriber }
    }
}

#[async_trait]
impl<T: Transcribe> CaptureAdapter for MicCapture<T> {
    async fn capture(&mut self, timeout: Duration) -> AlfredResult<Option<String>> {
        let config = self.config.clone();
        let samples = tokio::task::spawn_blocking(move || record_utterance(&config, timeout))
            .await
            .map_err(|e| AlfredError::Capture(e.to_string()))??;
        let Some(samples) = samples else {
            return Err(AlfredError::SilenceTimeout);
        };

        let wav = encode_wav(&samples, &self.config)?;
        let text = self.transcriber.transcribe(&wav).await?;
        let text = text.trim().to_string();
        info!(transcript = %text, "📝 transcribed");
        Ok(Some(text))
    }
}
