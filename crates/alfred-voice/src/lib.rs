//! # Alfred Voice - Microphone In, Speaker Out
//!
//! The voice frontends for Alfred's orchestrator: cpal microphone capture
//! with RMS endpointing, Gemini speech-to-text, and spoken playback through
//! the platform synthesizer. Everything here plugs into the adapter seams
//! defined in `alfred-core`.

pub mod capture;
pub mod playback;
pub mod stt;

pub use capture::{AudioConfig, MicCapture};
pub use playback::SpeakerPlayback;
pub use stt::{GeminiTranscriber, Transcribe};
