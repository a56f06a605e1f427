//! Conversation history: turns, the bounded context window, and the session.
//!
//! A `Turn` is one user-input/assistant-reply exchange. The history keeps at
//! most `window_size` completed turns as model-visible context, evicting
//! strictly oldest-first. Turns are never mutated after append; corrections
//! are new turns.

use crate::modes::Mode;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

/// Lifecycle status of a turn. Set exactly once; terminal states never revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// Capture or inference still in progress.
    InFlight,
    Completed,
    Failed,
    TimedOut,
}

impl TurnStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TurnStatus::InFlight)
    }
}

/// One user-input/assistant-reply exchange.
#[derive(Debug, Clone)]
pub struct Turn {
    pub id: u64,
    pub user_text: String,
    pub assistant_text: String,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub status: TurnStatus,
}

impl Turn {
    /// Start a new turn. `user_text` is filled in as capture completes.
    pub fn begin(id: u64, mode: Mode) -> Self {
        Self {
            id,
            user_text: String::new(),
            assistant_text: String::new(),
            mode,
            started_at: Utc::now(),
            latency_ms: 0,
            status: TurnStatus::InFlight,
        }
    }

    /// Milliseconds elapsed since the turn started.
    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }

    /// Move to a terminal status. A terminal turn is immutable; a second
    /// finish is a logic error and is ignored (debug-asserted).
    pub fn finish(&mut self, status: TurnStatus, assistant_text: String) {
        debug_assert!(status.is_terminal(), "finish() requires a terminal status");
        if self.status.is_terminal() {
            debug_assert!(false, "turn {} finished twice", self.id);
            return;
        }
        self.assistant_text = assistant_text;
        self.latency_ms = self.elapsed_ms();
        self.status = status;
    }
}

/// Ordered, bounded buffer of completed turns (newest last).
#[derive(Debug)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    window_size: usize,
}

impl ConversationHistory {
    pub fn new(window_size: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Append a terminal turn, evicting the oldest once past the window.
    /// Non-terminal turns are rejected: only one turn may be in flight and
    /// it lives with the orchestrator, not here.
    pub fn append(&mut self, turn: Turn) {
        debug_assert!(turn.status.is_terminal(), "history holds terminal turns only");
        if !turn.status.is_terminal() {
            return;
        }
        self.turns.push_back(turn);
        while self.turns.len() > self.window_size {
            if let Some(evicted) = self.turns.pop_front() {
                debug!(turn_id = evicted.id, "evicted oldest turn past window");
            }
        }
    }

    /// The most recent `n` turns, oldest first, length ≤ min(n, window).
    pub fn recent(&self, n: usize) -> Vec<&Turn> {
        let take = n.min(self.turns.len());
        self.turns.iter().skip(self.turns.len() - take).collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

/// One run of the assistant: the history, the active mode, and the turn
/// counter. Created at process start (or per diagnostic invocation) and
/// owned exclusively by the orchestrator.
#[derive(Debug)]
pub struct Session {
    history: ConversationHistory,
    active_mode: Mode,
    pending_mode: Option<Mode>,
    next_turn_id: u64,
}

impl Session {
    pub fn new(mode: Mode, window_size: usize) -> Self {
        Self {
            history: ConversationHistory::new(window_size),
            active_mode: mode,
            pending_mode: None,
            next_turn_id: 0,
        }
    }

    /// Begin the next turn under the active mode. Applies any pending mode
    /// switch first: a switch takes effect only at a turn boundary.
    pub fn begin_turn(&mut self) -> Turn {
        if let Some(mode) = self.pending_mode.take() {
            debug!(?mode, "mode switch taking effect");
            self.active_mode = mode;
        }
        let id = self.next_turn_id;
        self.next_turn_id += 1;
        Turn::begin(id, self.active_mode)
    }

    /// Request a mode switch; the in-flight turn (if any) completes under
    /// the config it started with.
    pub fn switch_mode(&mut self, mode: Mode) {
        self.pending_mode = Some(mode);
    }

    pub fn active_mode(&self) -> Mode {
        self.active_mode
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut ConversationHistory {
        &mut self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(id: u64, user: &str) -> Turn {
        let mut t = Turn::begin(id, Mode::Text);
        t.user_text = user.to_string();
        t.finish(TurnStatus::Completed, format!("reply to {user}"));
        t
    }

    #[test]
    fn window_bound_and_retention_order() {
        let mut history = ConversationHistory::new(3);
        for i in 0..10 {
            history.append(completed(i, &format!("u{i}")));
            assert!(history.len() <= 3);
        }
        let recent: Vec<u64> = history.recent(10).iter().map(|t| t.id).collect();
        assert_eq!(recent, vec![7, 8, 9]);
    }

    #[test]
    fn recent_is_oldest_first_and_capped() {
        let mut history = ConversationHistory::new(5);
        for i in 0..4 {
            history.append(completed(i, "q"));
        }
        let two: Vec<u64> = history.recent(2).iter().map(|t| t.id).collect();
        assert_eq!(two, vec![2, 3]);
        assert_eq!(history.recent(100).len(), 4);
    }

    #[test]
    fn status_set_once() {
        let mut t = Turn::begin(0, Mode::Voice);
        t.finish(TurnStatus::Failed, "fallback".to_string());
        assert_eq!(t.status, TurnStatus::Failed);
        // Release builds ignore a second finish; the status never reverts.
        #[cfg(not(debug_assertions))]
        {
            t.finish(TurnStatus::Completed, "late".to_string());
            assert_eq!(t.status, TurnStatus::Failed);
            assert_eq!(t.assistant_text, "fallback");
        }
    }

    #[test]
    fn session_counter_is_monotonic() {
        let mut session = Session::new(Mode::Text, 4);
        let a = session.begin_turn();
        let b = session.begin_turn();
        assert!(b.id > a.id);
    }

    #[test]
    fn mode_switch_applies_next_turn() {
        let mut session = Session::new(Mode::Voice, 4);
        let t = session.begin_turn();
        assert_eq!(t.mode, Mode::Voice);
        session.switch_mode(Mode::Fast);
        assert_eq!(session.active_mode(), Mode::Voice);
        let t2 = session.begin_turn();
        assert_eq!(t2.mode, Mode::Fast);
        assert_eq!(session.active_mode(), Mode::Fast);
    }
}
