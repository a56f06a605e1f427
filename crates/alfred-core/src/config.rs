//! Startup configuration loaded from the environment.
//!
//! The API credential is required; everything else has a sensible default.
//! `.env` loading (dotenvy) happens in the binary before any `env::var` call.

use crate::error::{AlfredError, AlfredResult};
use std::time::Duration;

const DEFAULT_MODEL: &str = "gemini-1.5-pro";
const DEFAULT_FAST_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_HISTORY_WINDOW: usize = 20;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Static configuration for one session. Built once at startup, never
/// mutated afterwards.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | GOOGLE_API_KEY / GEMINI_API_KEY | required | API credential (either name accepted). |
/// | ALFRED_MODEL | gemini-1.5-pro | Full model for `--full` runs. |
/// | ALFRED_FAST_MODEL | gemini-1.5-flash | Fast model (default). |
/// | ALFRED_HISTORY_WINDOW | 20 | Max turns kept as model-visible context. |
/// | ALFRED_REQUEST_TIMEOUT_SECS | 60 | Overall per-request timeout, distinct from retry backoff. |
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub fast_model: String,
    pub history_window: usize,
    pub request_timeout: Duration,
}

impl Config {
    /// Load from environment. A missing API key is startup-fatal.
    pub fn from_env() -> AlfredResult<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                AlfredError::Config(
                    "No API key found. Set GOOGLE_API_KEY or GEMINI_API_KEY in .env".to_string(),
                )
            })?;

        Ok(Self {
            api_key,
            model: env_string("ALFRED_MODEL", DEFAULT_MODEL),
            fast_model: env_string("ALFRED_FAST_MODEL", DEFAULT_FAST_MODEL),
            history_window: env_parse("ALFRED_HISTORY_WINDOW", DEFAULT_HISTORY_WINDOW),
            request_timeout: Duration::from_secs(env_parse(
                "ALFRED_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
        })
    }

    /// Build with an explicit key (tests, non-env wiring). Other fields
    /// take their defaults.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Model identifier for the given fast/full preference.
    pub fn model_for(&self, fast: bool) -> &str {
        if fast {
            &self.fast_model
        } else {
            &self.model
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}
