use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::warn;

use verse_core::ids::UserId;
use verse_core::{ChatMessage, ChatTurn, CompletionProvider, RelayError, TranscriptionProvider};
use verse_store::TurnRepo;

const DEFAULT_PERSONA: &str =
    "You are the host of a small 3D world, chatting with visitors in real time. \
     Keep replies short, warm, and conversational.";

/// Tuning for the completion relay.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Deadline for the upstream completion call.
    pub timeout: Duration,
    /// Maximum history turns included in the conversation window.
    pub max_window_turns: usize,
    /// System instruction prepended to every window.
    pub persona: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_window_turns: 20,
            persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

/// Result of a transcribe-then-respond round trip.
#[derive(Clone, Debug)]
pub struct AudioReply {
    pub transcript: String,
    pub response: String,
}

/// Mediates between per-user chat history and the external completion
/// API: builds a bounded conversation window, races the call against a
/// timeout, and persists the turn (fallback text included) so the
/// window stays coherent for future calls.
pub struct CompletionRelay {
    completion: Arc<dyn CompletionProvider>,
    transcription: Arc<dyn TranscriptionProvider>,
    turns: TurnRepo,
    config: RelayConfig,
    // Serializes respond() per user; different users never contend.
    user_locks: DashMap<UserId, Arc<tokio::sync::Mutex<()>>>,
}

impl CompletionRelay {
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        transcription: Arc<dyn TranscriptionProvider>,
        turns: TurnRepo,
        config: RelayConfig,
    ) -> Self {
        Self {
            completion,
            transcription,
            turns,
            config,
            user_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        self.user_locks
            .entry(user.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .value()
            .clone()
    }

    /// Relay one chat message for `user` and return the response text.
    ///
    /// Upstream failures never surface: the failure class's fixed
    /// fallback string is persisted as the turn's response and
    /// returned. Only a missing user (`Unauthenticated`) or a store
    /// failure (`Resource`) comes back as an error, and the
    /// unauthenticated path touches neither the upstream API nor the
    /// store.
    pub async fn respond(
        &self,
        user: Option<&UserId>,
        message: &str,
    ) -> Result<String, RelayError> {
        let user = user.ok_or(RelayError::Unauthenticated)?;

        let lock = self.lock_for(user);
        let _held = lock.lock().await;

        let history = self
            .turns
            .history(user)
            .map_err(|e| RelayError::Resource(e.to_string()))?;
        let window = self.window(&history, message);

        let response =
            match tokio::time::timeout(self.config.timeout, self.completion.complete(&window))
                .await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(user = %user, kind = e.error_kind(), error = %e, "completion failed");
                    e.fallback_text().to_string()
                }
                // Timer won: the losing future was dropped with the
                // race, which aborts the in-flight request.
                Err(_) => {
                    let e = RelayError::Timeout(self.config.timeout);
                    warn!(user = %user, kind = e.error_kind(), "completion timed out");
                    e.fallback_text().to_string()
                }
            };

        self.turns
            .append(user, message, &response)
            .map_err(|e| RelayError::Resource(e.to_string()))?;

        Ok(response)
    }

    /// Transcribe a recorded audio payload, then relay the transcript
    /// through `respond`. The transcription API is never invoked for
    /// an unauthenticated caller.
    pub async fn respond_audio(
        &self,
        user: Option<&UserId>,
        audio: Vec<u8>,
    ) -> Result<AudioReply, RelayError> {
        if user.is_none() {
            return Err(RelayError::Unauthenticated);
        }

        let transcript = self.transcription.transcribe(audio, "recording.webm").await?;
        let response = self.respond(user, &transcript).await?;

        Ok(AudioReply {
            transcript,
            response,
        })
    }

    /// Persona, then each history turn flattened to a user/assistant
    /// pair oldest-first (bounded to the most recent
    /// `max_window_turns`), then the new message.
    fn window(&self, history: &[ChatTurn], new_message: &str) -> Vec<ChatMessage> {
        let start = history.len().saturating_sub(self.config.max_window_turns);

        let mut messages = Vec::with_capacity(2 * (history.len() - start) + 2);
        messages.push(ChatMessage::system(&self.config.persona));
        for turn in &history[start..] {
            messages.extend(turn.to_messages());
        }
        messages.push(ChatMessage::user(new_message));
        messages
    }
}
