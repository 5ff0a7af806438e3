use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use verse_core::{ChatMessage, CompletionProvider, RelayError, TranscriptionProvider};

use crate::types::{ChatRequest, ChatResponse, TranscriptionResponse};

const API_BASE: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const CHAT_MODEL: &str = "gpt-3.5-turbo";
const TRANSCRIPTION_MODEL: &str = "whisper-1";
const TEMPERATURE: f32 = 0.6;
const MAX_TOKENS: u32 = 256;

/// OpenAI-backed completion + transcription provider.
///
/// Transcription uploads the audio as an in-memory multipart part, one
/// per request, so concurrent calls never share a resource.
pub struct OpenAiProvider {
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            api_key,
            base_url: API_BASE.to_string(),
        }
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        CHAT_MODEL
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RelayError> {
        let body = ChatRequest {
            model: CHAT_MODEL,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        debug!(model = CHAT_MODEL, messages = messages.len(), "chat completion request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::from_status(status, body));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RelayError::Malformed("no completion choice in response".into()))
    }
}

#[async_trait]
impl TranscriptionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, RelayError> {
        let part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/webm")
            .map_err(|e| RelayError::Resource(format!("audio part: {e}")))?;

        let form = Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .part("file", part);

        debug!(model = TRANSCRIPTION_MODEL, file = file_name, "transcription request");

        let resp = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::from_status(status, body));
        }

        let parsed: TranscriptionResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Malformed(e.to_string()))?;

        Ok(parsed.text)
    }
}
