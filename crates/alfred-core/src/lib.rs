//! # Alfred Core - Conversation Turn Orchestration
//!
//! The mode-agnostic heart of the Alfred assistant: the turn state machine,
//! bounded conversation history, the retrying AI gateway, and the adapter
//! contracts that voice and text frontends plug into.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Orchestrator                         │
//! │  ┌───────────┐   ┌────────────┐   ┌─────────────────┐   │
//! │  │  Capture  │ → │  Retrying  │ → │    Playback      │   │
//! │  │  Adapter  │   │  Gateway   │   │    Adapter       │   │
//! │  └───────────┘   └────────────┘   └─────────────────┘   │
//! │        ↓                ↓                                 │
//! │  ┌───────────┐   ┌────────────┐                          │
//! │  │  Session  │ ← │  History   │  (bounded window)        │
//! │  └───────────┘   └────────────┘                          │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod modes;
pub mod orchestrator;
pub mod persona;

pub use adapters::{CaptureAdapter, ConsolePlayback, PlaybackAdapter, ScriptedCapture, TextLineCapture};
pub use config::Config;
pub use error::{AlfredError, AlfredResult, GatewayError, GatewayErrorKind};
pub use gateway::{AiGateway, AiReply, AiRequest, GeminiClient, Retrying, RetryPolicy};
pub use history::{ConversationHistory, Session, Turn, TurnStatus};
pub use modes::{Mode, ModeConfig, FAST_MODE_MAX_TOKENS};
pub use orchestrator::{Orchestrator, Phase, TurnOutcome, DIAGNOSTIC_QUESTION};
pub use persona::{FALLBACK_REPLY, GREETING, SIGN_OFF};
