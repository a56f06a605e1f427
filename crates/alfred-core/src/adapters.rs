//! Capture and playback adapter contracts, plus the text-mode variants.
//!
//! Adapters are stateless with respect to session data: they receive only
//! the text (or timeout) for the current call and retain no turn content.
//! Voice variants live in `alfred-voice`; the text variants here keep the
//! core free of audio dependencies.

use crate::error::{AlfredError, AlfredResult};
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::warn;

/// Produces a transcript from one utterance.
///
/// `Ok(Some(text))` is a transcript (possibly empty, e.g. a blank input
/// line); `Ok(None)` means the input source is exhausted (stdin closed) and
/// the session should end; `SilenceTimeout` means no utterance arrived
/// within `timeout`.
#[async_trait]
pub trait CaptureAdapter: Send {
    async fn capture(&mut self, timeout: Duration) -> AlfredResult<Option<String>>;
}

/// Renders a reply to the user, audibly or on the console.
#[async_trait]
pub trait PlaybackAdapter: Send {
    async fn speak(&mut self, text: &str) -> AlfredResult<()>;

    /// Render a stream of partial chunks in arrival order, returning the
    /// assembled text. Rendering failures are logged, not returned: the
    /// assembled text is the reply regardless of whether it was heard, so
    /// `Err` means no text could be assembled at all. The default drains
    /// the stream, then speaks once.
    async fn speak_stream(&mut self, mut chunks: mpsc::Receiver<String>) -> AlfredResult<String> {
        let mut full = String::new();
        while let Some(chunk) = chunks.recv().await {
            full.push_str(&chunk);
        }
        if let Err(e) = self.speak(&full).await {
            warn!(error = %e, "playback failed; reply text preserved");
        }
        Ok(full)
    }
}

/// Text-mode capture: one line of stdin per turn, no timeout.
pub struct TextLineCapture {
    lines: Lines<BufReader<Stdin>>,
}

impl TextLineCapture {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for TextLineCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureAdapter for TextLineCapture {
    async fn capture(&mut self, _timeout: Duration) -> AlfredResult<Option<String>> {
        print!("\u{1F464} You: ");
        std::io::stdout().flush().ok();
        let line = self
            .lines
            .next_line()
            .await
            .map_err(|e| AlfredError::Capture(e.to_string()))?;
        Ok(line.map(|l| l.trim().to_string()))
    }
}

/// Text-mode playback: writes the reply to stdout. Streaming chunks are
/// printed as they arrive so partial replies are visible immediately.
pub struct ConsolePlayback;

#[async_trait]
impl PlaybackAdapter for ConsolePlayback {
    async fn speak(&mut self, text: &str) -> AlfredResult<()> {
        println!("\n\u{1F3A9} Alfred: {text}\n");
        Ok(())
    }

    async fn speak_stream(&mut self, mut chunks: mpsc::Receiver<String>) -> AlfredResult<String> {
        print!("\n\u{1F3A9} Alfred: ");
        std::io::stdout().flush().ok();
        let mut full = String::new();
        while let Some(chunk) = chunks.recv().await {
            print!("{chunk}");
            std::io::stdout().flush().ok();
            full.push_str(&chunk);
        }
        println!("\n");
        Ok(full)
    }
}

/// Scripted capture: yields each queued utterance once, then end-of-input.
/// Backs the one-shot diagnostic path; also useful in tests.
pub struct ScriptedCapture {
    queued: std::collections::VecDeque<String>,
}

impl ScriptedCapture {
    pub fn new<I, S>(utterances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queued: utterances.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl CaptureAdapter for ScriptedCapture {
    async fn capture(&mut self, _timeout: Duration) -> AlfredResult<Option<String>> {
        Ok(self.queued.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectingPlayback {
        spoken: Vec<String>,
    }

    #[async_trait]
    impl PlaybackAdapter for CollectingPlayback {
        async fn speak(&mut self, text: &str) -> AlfredResult<()> {
            self.spoken.push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn scripted_capture_drains_then_ends() {
        let mut capture = ScriptedCapture::new(["one", "two"]);
        let t = Duration::from_secs(1);
        assert_eq!(capture.capture(t).await.unwrap().as_deref(), Some("one"));
        assert_eq!(capture.capture(t).await.unwrap().as_deref(), Some("two"));
        assert_eq!(capture.capture(t).await.unwrap(), None);
    }

    #[tokio::test]
    async fn default_speak_stream_assembles_in_order() {
        let (tx, rx) = mpsc::channel(4);
        for part in ["Exec", "ution ", "beats ideas."] {
            tx.send(part.to_string()).await.unwrap();
        }
        drop(tx);
        let mut playback = CollectingPlayback { spoken: Vec::new() };
        let full = playback.speak_stream(rx).await.unwrap();
        assert_eq!(full, "Execution beats ideas.");
        assert_eq!(playback.spoken, vec!["Execution beats ideas."]);
    }

    struct BrokenPlayback;

    #[async_trait]
    impl PlaybackAdapter for BrokenPlayback {
        async fn speak(&mut self, _text: &str) -> AlfredResult<()> {
            Err(AlfredError::Playback("device gone".to_string()))
        }
    }

    #[tokio::test]
    async fn default_speak_stream_preserves_text_when_playback_fails() {
        let (tx, rx) = mpsc::channel(2);
        tx.send("Ship it.".to_string()).await.unwrap();
        drop(tx);
        let mut playback = BrokenPlayback;
        let full = playback.speak_stream(rx).await.unwrap();
        assert_eq!(full, "Ship it.");
    }
}
