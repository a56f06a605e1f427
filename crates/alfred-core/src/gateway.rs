//! AI gateway: the request/response boundary to the hosted language model.
//!
//! `GeminiClient` speaks the Gemini REST API (`generateContent`, or
//! `streamGenerateContent?alt=sse` for partial replies). `Retrying` wraps any
//! gateway with bounded exponential backoff, retrying transient kinds only.
//! The gateway never touches session state; it is stateless across calls.

use crate::error::{GatewayError, GatewayErrorKind};
use crate::history::Turn;
use crate::modes::ModeConfig;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One prior exchange message as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    /// "user" or "model".
    pub role: &'static str,
    pub text: String,
}

/// Everything the gateway needs for one call. Assembled by the orchestrator;
/// the gateway reads nothing else.
#[derive(Debug, Clone)]
pub struct AiRequest {
    pub persona: &'static str,
    pub history: Vec<HistoryMessage>,
    pub user_text: String,
    pub max_output_tokens: u32,
    pub stream: bool,
}

impl AiRequest {
    /// Build from persona + the bounded history snapshot + the new input,
    /// policy-shaped by the active mode config.
    pub fn new(persona: &'static str, turns: &[&Turn], user_text: String, mode: &ModeConfig) -> Self {
        let mut history = Vec::with_capacity(turns.len() * 2);
        for turn in turns {
            history.push(HistoryMessage {
                role: "user",
                text: turn.user_text.clone(),
            });
            history.push(HistoryMessage {
                role: "model",
                text: turn.assistant_text.clone(),
            });
        }
        Self {
            persona,
            history,
            user_text,
            max_output_tokens: mode.max_output_tokens,
            stream: mode.streaming,
        }
    }
}

/// A complete model reply.
#[derive(Debug, Clone)]
pub struct AiReply {
    pub text: String,
}

/// Request/response boundary to the language model.
#[async_trait]
pub trait AiGateway: Send + Sync {
    /// One complete call.
    async fn send(&self, request: &AiRequest) -> Result<AiReply, GatewayError>;

    /// Open a finite, non-restartable sequence of partial-text chunks, in
    /// arrival order; channel close marks completion. The default adapts a
    /// non-streaming gateway by yielding the whole reply as one chunk.
    async fn open_stream(
        &self,
        request: &AiRequest,
    ) -> Result<mpsc::Receiver<String>, GatewayError> {
        let reply = self.send(request).await?;
        let (tx, rx) = mpsc::channel(1);
        // Receiver is returned before this send resolves; capacity 1 holds it.
        let _ = tx.send(reply.text).await;
        Ok(rx)
    }
}

#[async_trait]
impl<G: AiGateway + ?Sized> AiGateway for std::sync::Arc<G> {
    async fn send(&self, request: &AiRequest) -> Result<AiReply, GatewayError> {
        (**self).send(request).await
    }

    async fn open_stream(
        &self,
        request: &AiRequest,
    ) -> Result<mpsc::Receiver<String>, GatewayError> {
        (**self).open_stream(request).await
    }
}

// Gemini wire contract (camelCase JSON)

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn build_wire_request(request: &AiRequest) -> GenerateRequest {
    let mut contents: Vec<Content> = request
        .history
        .iter()
        .map(|m| Content {
            role: Some(m.role.to_string()),
            parts: vec![Part { text: m.text.clone() }],
        })
        .collect();
    contents.push(Content {
        role: Some("user".to_string()),
        parts: vec![Part {
            text: request.user_text.clone(),
        }],
    });
    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: request.persona.to_string(),
            }],
        },
        contents,
        generation_config: GenerationConfig {
            max_output_tokens: request.max_output_tokens,
        },
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, GatewayError> {
    if let Some(feedback) = response.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            return Err(GatewayError::new(
                GatewayErrorKind::ContentFiltered,
                format!("prompt blocked: {reason}"),
            ));
        }
    }
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(GatewayError::new(
            GatewayErrorKind::Unknown,
            "empty response from model",
        ));
    }
    Ok(text.trim().to_string())
}

fn map_send_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::new(GatewayErrorKind::Timeout, err.to_string())
    } else {
        GatewayError::new(GatewayErrorKind::Network, err.to_string())
    }
}

fn map_status(status: reqwest::StatusCode, body: &str, retry_after: Option<Duration>) -> GatewayError {
    let kind = match status.as_u16() {
        401 | 403 => GatewayErrorKind::Auth,
        429 => GatewayErrorKind::RateLimited,
        400 => GatewayErrorKind::InvalidRequest,
        s if s >= 500 => GatewayErrorKind::Network,
        _ => GatewayErrorKind::Unknown,
    };
    let mut err = GatewayError::new(kind, format!("API error {status}: {body}"));
    if let Some(hint) = retry_after {
        err = err.with_retry_after(hint);
    }
    err
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Gemini REST client. One connection is acquired per call and released on
/// every exit path, including cancellation (dropping the future aborts the
/// request).
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::new(GatewayErrorKind::Unknown, e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            client,
        })
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, verb: &str) -> String {
        format!(
            "{}/models/{}:{verb}?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }
}

#[async_trait]
impl AiGateway for GeminiClient {
    async fn send(&self, request: &AiRequest) -> Result<AiReply, GatewayError> {
        let body = build_wire_request(request);
        let response = self
            .client
            .post(self.url("generateContent"))
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let hint = retry_after_header(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body, hint));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::new(GatewayErrorKind::Unknown, e.to_string()))?;
        Ok(AiReply {
            text: extract_text(parsed)?,
        })
    }

    async fn open_stream(
        &self,
        request: &AiRequest,
    ) -> Result<mpsc::Receiver<String>, GatewayError> {
        let body = build_wire_request(request);
        let response = self
            .client
            .post(format!("{}&alt=sse", self.url("streamGenerateContent")))
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let hint = retry_after_header(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body, hint));
        }

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            'outer: while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(error = %e, "response stream ended early");
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                // SSE events are newline-delimited; payload lines carry "data: {json}"
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<GenerateResponse>(payload.trim()) else {
                        continue;
                    };
                    if let Ok(text) = extract_text(event) {
                        if tx.send(text).await.is_err() {
                            debug!("stream consumer dropped; abandoning response");
                            break 'outer;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }
}

/// Backoff schedule: base delay doubling per attempt, capped. Monotone
/// non-decreasing with a finite attempt cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total calls allowed, including the first.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn from_mode(mode: &ModeConfig) -> Self {
        Self {
            attempts: mode.retry_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before the retry following failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map(|d| d.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }
}

/// Retrying wrapper around any gateway. Transient failures are retried up
/// to the policy's attempt cap; permanent failures surface immediately.
pub struct Retrying<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: AiGateway> Retrying<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn backoff(&self, attempt: u32, err: &GatewayError) {
        let delay = err.retry_after.unwrap_or_else(|| self.policy.delay_for(attempt));
        warn!(
            attempt = attempt + 1,
            attempts = self.policy.attempts,
            kind = err.kind.as_str(),
            ?delay,
            "gateway call failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl<G: AiGateway> AiGateway for Retrying<G> {
    async fn send(&self, request: &AiRequest) -> Result<AiReply, GatewayError> {
        let mut last = None;
        for attempt in 0..self.policy.attempts {
            match self.inner.send(request).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transient() => {
                    if attempt + 1 < self.policy.attempts {
                        self.backoff(attempt, &e).await;
                    }
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| {
            GatewayError::new(GatewayErrorKind::Unknown, "retry attempts exhausted")
        }))
    }

    async fn open_stream(
        &self,
        request: &AiRequest,
    ) -> Result<mpsc::Receiver<String>, GatewayError> {
        // Retry applies to establishing the stream; chunks are never replayed.
        let mut last = None;
        for attempt in 0..self.policy.attempts {
            match self.inner.open_stream(request).await {
                Ok(rx) => return Ok(rx),
                Err(e) if e.is_transient() => {
                    if attempt + 1 < self.policy.attempts {
                        self.backoff(attempt, &e).await;
                    }
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| {
            GatewayError::new(GatewayErrorKind::Unknown, "retry attempts exhausted")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::TurnStatus;
    use crate::modes::Mode;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedGateway {
        calls: AtomicU32,
        /// Calls that fail before one succeeds; u32::MAX fails forever.
        failures: u32,
        kind: GatewayErrorKind,
    }

    impl ScriptedGateway {
        fn failing(kind: GatewayErrorKind, failures: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                kind,
            }
        }
    }

    #[async_trait]
    impl AiGateway for ScriptedGateway {
        async fn send(&self, _request: &AiRequest) -> Result<AiReply, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(GatewayError::new(self.kind, "scripted failure"))
            } else {
                Ok(AiReply {
                    text: "ok".to_string(),
                })
            }
        }
    }

    fn request() -> AiRequest {
        AiRequest::new("persona", &[], "hello".to_string(), &Mode::Text.config())
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn transient_failures_hit_the_retry_ceiling() {
        let gateway = Retrying::new(
            ScriptedGateway::failing(GatewayErrorKind::Network, u32::MAX),
            fast_policy(3),
        );
        let err = gateway.send(&request()).await.unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Network);
        assert_eq!(gateway.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        for kind in [GatewayErrorKind::ContentFiltered, GatewayErrorKind::Auth] {
            let gateway = Retrying::new(ScriptedGateway::failing(kind, u32::MAX), fast_policy(5));
            let err = gateway.send(&request()).await.unwrap_err();
            assert_eq!(err.kind, kind);
            assert_eq!(gateway.inner.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let gateway = Retrying::new(
            ScriptedGateway::failing(GatewayErrorKind::RateLimited, 2),
            fast_policy(3),
        );
        let reply = gateway.send(&request()).await.unwrap();
        assert_eq!(reply.text, "ok");
        assert_eq!(gateway.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn default_stream_yields_whole_reply_as_one_chunk() {
        let gateway = ScriptedGateway::failing(GatewayErrorKind::Network, 0);
        let mut rx = gateway.open_stream(&request()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("ok"));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn backoff_is_monotone_and_capped() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..16 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(30), policy.max_delay);
    }

    #[test]
    fn request_serializes_history_as_alternating_roles() {
        let mut turn = Turn::begin(0, Mode::Text);
        turn.user_text = "hi".to_string();
        turn.finish(TurnStatus::Completed, "hey".to_string());
        let req = AiRequest::new("p", &[&turn], "next".to_string(), &Mode::Text.config());
        assert_eq!(req.history.len(), 2);
        assert_eq!(req.history[0].role, "user");
        assert_eq!(req.history[0].text, "hi");
        assert_eq!(req.history[1].role, "model");
        assert_eq!(req.history[1].text, "hey");
    }

    #[test]
    fn wire_request_uses_camel_case_keys() {
        let wire = build_wire_request(&request());
        let value = serde_json::to_value(&wire).unwrap();
        assert!(value.get("systemInstruction").is_some());
        assert!(value.get("generationConfig").is_some());
        assert_eq!(
            value["generationConfig"]["maxOutputTokens"],
            serde_json::json!(Mode::Text.config().max_output_tokens)
        );
        // last content entry is the new user text
        let contents = value["contents"].as_array().unwrap();
        assert_eq!(contents.last().unwrap()["role"], "user");
    }

    #[test]
    fn blocked_prompt_maps_to_content_filtered() {
        let raw = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let err = extract_text(parsed).unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::ContentFiltered);
    }

    #[test]
    fn candidate_text_is_joined_and_trimmed() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Execution "},{"text":"beats ideas.  "}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_text(parsed).unwrap(), "Execution beats ideas.");
    }

    #[test]
    fn status_codes_map_to_kinds() {
        use reqwest::StatusCode;
        assert_eq!(
            map_status(StatusCode::UNAUTHORIZED, "", None).kind,
            GatewayErrorKind::Auth
        );
        assert_eq!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "", Some(Duration::from_secs(7)))
                .retry_after,
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            map_status(StatusCode::BAD_REQUEST, "", None).kind,
            GatewayErrorKind::InvalidRequest
        );
        assert_eq!(
            map_status(StatusCode::BAD_GATEWAY, "", None).kind,
            GatewayErrorKind::Network
        );
    }
}
