//! Interaction modes and their policy bundles.
//!
//! A mode fixes the timing, token, streaming, and loop policy for a turn.
//! The lookup is pure; switching modes mid-session takes effect on the next
//! turn only (see `Session::switch_mode`).

use crate::error::{AlfredError, AlfredResult};
use std::str::FromStr;
use std::time::Duration;

/// Ceiling on generated tokens while in fast mode.
pub const FAST_MODE_MAX_TOKENS: u32 = 512;

/// Named interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Single-shot voice interaction (default).
    Voice,
    /// Text-only: stdin line in, stdout out, no audio.
    Text,
    /// Voice with automatic re-listen after each reply.
    Continuous,
    /// Low-latency voice: small token budget, streamed partial output.
    Fast,
    /// One-shot diagnostic turn; exit code reflects the outcome.
    Test,
}

impl Mode {
    /// Policy bundle for this mode.
    pub fn config(self) -> ModeConfig {
        match self {
            Mode::Voice => ModeConfig {
                streaming: false,
                max_output_tokens: 1024,
                silence_timeout: Duration::from_secs(10),
                retry_attempts: 3,
                loop_turns: false,
            },
            Mode::Text => ModeConfig {
                streaming: false,
                max_output_tokens: 1024,
                // stdin has no utterance boundary; wait as long as it takes
                silence_timeout: Duration::MAX,
                retry_attempts: 3,
                loop_turns: true,
            },
            Mode::Continuous => ModeConfig {
                streaming: false,
                max_output_tokens: 1024,
                silence_timeout: Duration::from_secs(10),
                retry_attempts: 3,
                loop_turns: true,
            },
            Mode::Fast => ModeConfig {
                streaming: true,
                max_output_tokens: FAST_MODE_MAX_TOKENS,
                silence_timeout: Duration::from_secs(8),
                retry_attempts: 2,
                loop_turns: false,
            },
            Mode::Test => ModeConfig {
                streaming: false,
                max_output_tokens: 256,
                silence_timeout: Duration::from_secs(5),
                retry_attempts: 1,
                loop_turns: false,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Voice => "voice",
            Mode::Text => "text",
            Mode::Continuous => "continuous",
            Mode::Fast => "fast",
            Mode::Test => "test",
        }
    }
}

impl FromStr for Mode {
    type Err = AlfredError;

    fn from_str(s: &str) -> AlfredResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "voice" => Ok(Mode::Voice),
            "text" => Ok(Mode::Text),
            "continuous" => Ok(Mode::Continuous),
            "fast" => Ok(Mode::Fast),
            "test" => Ok(Mode::Test),
            other => Err(AlfredError::Config(format!("unknown mode: {other}"))),
        }
    }
}

/// Immutable policy bundle selected per mode.
#[derive(Debug, Clone, Copy)]
pub struct ModeConfig {
    /// Speak/print partial replies as chunks arrive.
    pub streaming: bool,
    /// Token budget for the reply.
    pub max_output_tokens: u32,
    /// Max time to wait for an utterance before giving up the turn.
    pub silence_timeout: Duration,
    /// Total gateway calls allowed per turn for transient failures.
    pub retry_attempts: u32,
    /// Re-enter capture automatically after each reply.
    pub loop_turns: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_mode_respects_token_ceiling() {
        assert!(Mode::Fast.config().max_output_tokens <= FAST_MODE_MAX_TOKENS);
        assert!(Mode::Fast.config().streaming);
    }

    #[test]
    fn loop_policy_per_mode() {
        assert!(Mode::Continuous.config().loop_turns);
        assert!(Mode::Text.config().loop_turns);
        assert!(!Mode::Voice.config().loop_turns);
        assert!(!Mode::Test.config().loop_turns);
    }

    #[test]
    fn parse_mode_names() {
        assert_eq!("Voice".parse::<Mode>().unwrap(), Mode::Voice);
        assert_eq!(" fast ".parse::<Mode>().unwrap(), Mode::Fast);
        assert!("karaoke".parse::<Mode>().is_err());
    }

    #[test]
    fn every_mode_allows_at_least_one_call() {
        for mode in [Mode::Voice, Mode::Text, Mode::Continuous, Mode::Fast, Mode::Test] {
            assert!(mode.config().retry_attempts >= 1, "{}", mode.as_str());
        }
    }
}
