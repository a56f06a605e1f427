//! Speech-to-text via Gemini audio understanding.
//!
//! The recorded WAV is sent inline (base64) with a transcription instruction;
//! the model's reply is the transcript. Transcription failures surface as
//! capture errors so the orchestrator treats them like any other failed
//! capture.

use alfred_core::error::{AlfredError, AlfredResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const TRANSCRIBE_INSTRUCTION: &str =
    "Transcribe this audio exactly as spoken. Output only the transcription, nothing else.";

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Audio-to-text backend seam.
#[async_trait]
pub trait Transcribe: Send + Sync {
    async fn transcribe(&self, wav: &[u8]) -> AlfredResult<String>;
}

#[derive(Serialize)]
struct TranscribeRequest {
    contents: Vec<ContentIn>,
}

#[derive(Serialize)]
struct ContentIn {
    parts: Vec<PartIn>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PartIn {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    candidates: Vec<CandidateOut>,
}

#[derive(Deserialize)]
struct CandidateOut {
    content: Option<ContentOut>,
}

#[derive(Deserialize)]
struct ContentOut {
    #[serde(default)]
    parts: Vec<PartOut>,
}

#[derive(Deserialize)]
struct PartOut {
    #[serde(default)]
    text: String,
}

fn build_request_body(wav: &[u8]) -> TranscribeRequest {
    TranscribeRequest {
        contents: vec![ContentIn {
            parts: vec![
                PartIn {
                    text: Some(TRANSCRIBE_INSTRUCTION.to_string()),
                    inline_data: None,
                },
                PartIn {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: "audio/wav".to_string(),
                        data: BASE64.encode(wav),
                    }),
                },
            ],
        }],
    }
}

/// Gemini-backed transcriber.
pub struct GeminiTranscriber {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiTranscriber {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> AlfredResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AlfredError::Capture(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            client,
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Transcribe for GeminiTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> AlfredResult<String> {
        debug!(bytes = wav.len(), model = %self.model, "transcribing utterance");
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&build_request_body(wav))
            .send()
            .await
            .map_err(|e| AlfredError::Capture(format!("transcription request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlfredError::Capture(format!(
                "transcription returned {status}: {body}"
            )));
        }

        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| AlfredError::Capture(format!("malformed transcription response: {e}")))?;
        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AlfredError::Capture(
                "transcription produced no text".to_string(),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_instruction_and_inline_audio() {
        let body = serde_json::to_value(build_request_body(b"RIFFdata")).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], TRANSCRIBE_INSTRUCTION);
        assert_eq!(parts[1]["inlineData"]["mimeType"], "audio/wav");
        assert_eq!(parts[1]["inlineData"]["data"], BASE64.encode(b"RIFFdata"));
    }

    #[test]
    fn response_text_is_joined_across_parts() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"hello "},{"text":"there"}]}}]}"#;
        let parsed: TranscribeResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(text, "hello there");
    }
}
