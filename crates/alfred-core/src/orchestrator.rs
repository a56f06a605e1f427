//! The turn orchestrator: drives one conversational turn end-to-end
//! (capture → inference → playback) and the continuous-mode loop.
//!
//! State transitions: IDLE → CAPTURING → THINKING → SPEAKING → IDLE, with
//! ERROR reachable from the three active states. Only one turn is ever
//! non-terminal: the orchestrator is sequential and owns the sole pending
//! `Turn`; history receives terminal turns only.

use crate::adapters::{CaptureAdapter, PlaybackAdapter};
use crate::error::{AlfredError, AlfredResult};
use crate::gateway::{AiGateway, AiRequest, Retrying, RetryPolicy};
use crate::history::{Session, Turn, TurnStatus};
use crate::persona::{self, FALLBACK_REPLY, SIGN_OFF};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed question for the one-shot diagnostic path.
pub const DIAGNOSTIC_QUESTION: &str = "What should I focus on today?";

/// Orchestrator phase, for logging and introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Capturing,
    Thinking,
    Speaking,
    Error,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Capturing => "capturing",
            Phase::Thinking => "thinking",
            Phase::Speaking => "speaking",
            Phase::Error => "error",
        }
    }
}

/// How one pass through the state machine ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The turn reached a terminal status and was appended to history.
    Finished(Turn),
    /// Empty input; nothing captured, nothing appended.
    Silence,
    /// The user asked to end the session; the pending turn was discarded.
    Exit,
    /// The input source is exhausted (stdin closed).
    EndOfInput,
    /// The external stop flag was observed.
    Stopped,
}

/// Drives the conversation. Owns the session exclusively; the gateway and
/// adapters receive only what they need per call.
pub struct Orchestrator {
    session: Session,
    gateway: Arc<dyn AiGateway>,
    capture: Box<dyn CaptureAdapter>,
    playback: Box<dyn PlaybackAdapter>,
    persona: &'static str,
    phase: Phase,
    stop: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        session: Session,
        gateway: Arc<dyn AiGateway>,
        capture: Box<dyn CaptureAdapter>,
        playback: Box<dyn PlaybackAdapter>,
        fast: bool,
    ) -> Self {
        Self {
            session,
            gateway,
            capture,
            playback,
            persona: persona::prompt_for(fast),
            phase: Phase::Idle,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between suspension points; flip to end the loop. The
    /// binary additionally races the loop against Ctrl-C with `select!`,
    /// which cancels any in-flight wait outright.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    fn set_phase(&mut self, next: Phase) {
        debug!("state: {} -> {}", self.phase.as_str(), next.as_str());
        self.phase = next;
    }

    /// Run one turn end-to-end. Capture failures surface to the caller; the
    /// loop-vs-single-shot recovery policy lives in `run_loop`.
    pub async fn run_turn(&mut self) -> AlfredResult<TurnOutcome> {
        let mut turn = self.session.begin_turn();
        let mode = turn.mode.config();

        self.set_phase(Phase::Capturing);
        let captured = match self.capture.capture(mode.silence_timeout).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                self.set_phase(Phase::Idle);
                return Ok(TurnOutcome::EndOfInput);
            }
            Err(e) => {
                self.set_phase(Phase::Error);
                // Looping modes treat a failed capture as a no-op turn and
                // are listening again next iteration; the machine must be
                // back at idle before then. Single-shot modes end here.
                if mode.loop_turns {
                    self.set_phase(Phase::Idle);
                }
                return Err(e);
            }
        };

        if captured.is_empty() {
            self.set_phase(Phase::Idle);
            return Ok(TurnOutcome::Silence);
        }

        if self.stop.load(Ordering::Relaxed) {
            turn.finish(TurnStatus::TimedOut, String::new());
            self.set_phase(Phase::Idle);
            return Ok(TurnOutcome::Stopped);
        }

        info!(user = %captured, "user said");

        if persona::is_exit_phrase(&captured) {
            turn.finish(TurnStatus::TimedOut, String::new());
            self.set_phase(Phase::Speaking);
            if let Err(e) = self.playback.speak(SIGN_OFF).await {
                warn!(error = %e, "sign-off playback failed");
            }
            self.set_phase(Phase::Idle);
            return Ok(TurnOutcome::Exit);
        }

        turn.user_text = captured;

        self.set_phase(Phase::Thinking);
        let window = self.session.history().window_size();
        let request = AiRequest::new(
            self.persona,
            &self.session.history().recent(window),
            turn.user_text.clone(),
            &mode,
        );
        let gateway = Retrying::new(Arc::clone(&self.gateway), RetryPolicy::from_mode(&mode));

        if mode.streaming {
            match gateway.open_stream(&request).await {
                Ok(chunks) => {
                    self.set_phase(Phase::Speaking);
                    match self.playback.speak_stream(chunks).await {
                        Ok(full) if !full.trim().is_empty() => {
                            turn.finish(TurnStatus::Completed, full);
                        }
                        Ok(_) => {
                            warn!("stream produced no text");
                            return Ok(self.fail_turn(turn).await);
                        }
                        Err(e) => {
                            warn!(error = %e, "streamed playback failed");
                            return Ok(self.fail_turn(turn).await);
                        }
                    }
                }
                Err(e) => {
                    warn!(kind = e.kind.as_str(), error = %e, "inference failed");
                    return Ok(self.fail_turn(turn).await);
                }
            }
            info!(assistant = %turn.assistant_text, latency_ms = turn.latency_ms, "alfred said");
            self.session.history_mut().append(turn.clone());
            self.set_phase(Phase::Idle);
            return Ok(TurnOutcome::Finished(turn));
        }

        match gateway.send(&request).await {
            Ok(reply) => {
                turn.finish(TurnStatus::Completed, reply.text);
                info!(assistant = %turn.assistant_text, latency_ms = turn.latency_ms, "alfred said");
                self.session.history_mut().append(turn.clone());
                self.set_phase(Phase::Speaking);
                if let Err(e) = self.playback.speak(&turn.assistant_text).await {
                    // A speech failure does not retroactively fail a correct answer.
                    warn!(error = %e, "playback failed");
                    self.set_phase(Phase::Error);
                }
                self.set_phase(Phase::Idle);
                Ok(TurnOutcome::Finished(turn))
            }
            Err(e) => {
                warn!(kind = e.kind.as_str(), error = %e, "inference failed");
                Ok(self.fail_turn(turn).await)
            }
        }
    }

    /// Inference failed for good: the turn fails with the fallback reply,
    /// is still appended (context is not silently lost), and the fallback
    /// is spoken so the session keeps its conversational continuity.
    async fn fail_turn(&mut self, mut turn: Turn) -> TurnOutcome {
        turn.finish(TurnStatus::Failed, FALLBACK_REPLY.to_string());
        self.session.history_mut().append(turn.clone());
        self.set_phase(Phase::Speaking);
        if let Err(e) = self.playback.speak(FALLBACK_REPLY).await {
            warn!(error = %e, "fallback playback failed");
        }
        self.set_phase(Phase::Idle);
        TurnOutcome::Finished(turn)
    }

    /// Run turns until the session ends: single pass for single-shot modes,
    /// repeated passes when the active mode loops. Speaks `greeting` first
    /// when given.
    pub async fn run_loop(&mut self, greeting: Option<&str>) -> AlfredResult<()> {
        if let Some(text) = greeting {
            self.set_phase(Phase::Speaking);
            if let Err(e) = self.playback.speak(text).await {
                warn!(error = %e, "greeting playback failed");
            }
            self.set_phase(Phase::Idle);
        }

        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop flag set; ending session");
                return Ok(());
            }
            let looping = self.session.active_mode().config().loop_turns;
            match self.run_turn().await {
                Ok(TurnOutcome::Exit | TurnOutcome::EndOfInput | TurnOutcome::Stopped) => {
                    return Ok(());
                }
                Ok(TurnOutcome::Finished(_)) | Ok(TurnOutcome::Silence) => {
                    if !looping {
                        return Ok(());
                    }
                }
                Err(e) if looping => {
                    // Silence and capture hiccups are no-op turns here.
                    warn!(error = %e, "turn failed; listening again");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One-shot diagnostic: a single turn, no greeting. The caller maps the
    /// terminal status to a process exit code.
    pub async fn run_diagnostic(&mut self) -> AlfredResult<Turn> {
        info!("running diagnostic turn");
        match self.run_turn().await? {
            TurnOutcome::Finished(turn) => Ok(turn),
            other => Err(AlfredError::Capture(format!(
                "diagnostic produced no turn: {other:?}"
            ))),
        }
    }
}
