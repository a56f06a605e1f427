//! Spoken playback through the platform speech synthesizer.
//!
//! macOS gets `say` with a British voice; Linux gets `espeak`. The synthesizer
//! runs as a child process per utterance, so playback naturally serializes and
//! a dropped future kills nothing that has not already been spoken.

use alfred_core::adapters::PlaybackAdapter;
use alfred_core::error::{AlfredError, AlfredResult};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Words per minute for `say`.
const SPEAKING_RATE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Synthesizer {
    /// macOS `say`.
    Say,
    /// Linux `espeak`.
    Espeak,
}

impl Synthesizer {
    fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            Synthesizer::Say
        } else {
            Synthesizer::Espeak
        }
    }

    fn command(self, text: &str) -> Command {
        match self {
            Synthesizer::Say => {
                let mut cmd = Command::new("say");
                cmd.args(["-v", "Daniel", "-r"])
                    .arg(SPEAKING_RATE.to_string())
                    .arg(text);
                cmd
            }
            Synthesizer::Espeak => {
                let mut cmd = Command::new("espeak");
                cmd.arg(text);
                cmd
            }
        }
    }
}

/// Split off every complete sentence, leaving the unterminated tail pending.
fn drain_sentences(pending: &mut String) -> Vec<String> {
    let mut sentences = Vec::new();
    while let Some(pos) = pending.find(['.', '!', '?']) {
        let rest = pending.split_off(pos + 1);
        let sentence = std::mem::replace(pending, rest);
        let sentence = sentence.trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
    }
    sentences
}

/// Playback adapter that speaks through the system synthesizer.
pub struct SpeakerPlayback {
    synthesizer: Synthesizer,
}

impl SpeakerPlayback {
    pub fn new() -> Self {
        Self {
            synthesizer: Synthesizer::for_platform(),
        }
    }
}

impl Default for SpeakerPlayback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlaybackAdapter for SpeakerPlayback {
    async fn speak(&mut self, text: &str) -> AlfredResult<()> {
        debug!(chars = text.len(), "🔊 speaking");
        let status = self
            .synthesizer
            .command(text)
            .status()
            .await
            .map_err(|e| AlfredError::Playback(e.to_string()))?;
        if !status.success() {
            return Err(AlfredError::Playback(format!(
                "speech synthesizer exited with {status}"
            )));
        }
        Ok(())
    }

    /// Speak sentence by sentence as chunks arrive, so the first sentence
    /// plays while the rest is still being generated. Synthesizer failures
    /// are logged and the stream keeps draining; the assembled text is
    /// returned either way.
    async fn speak_stream(&mut self, mut chunks: mpsc::Receiver<String>) -> AlfredResult<String> {
        let mut full = String::new();
        let mut pending = String::new();
        while let Some(chunk) = chunks.recv().await {
            full.push_str(&chunk);
            pending.push_str(&chunk);
            for sentence in drain_sentences(&mut pending) {
                if let Err(e) = self.speak(&sentence).await {
                    warn!(error = %e, "mid-stream playback failed");
                }
            }
        }
        let tail = pending.trim();
        if !tail.is_empty() {
            if let Err(e) = self.speak(tail).await {
                warn!(error = %e, "mid-stream playback failed");
            }
        }
        Ok(full)
    }
}
