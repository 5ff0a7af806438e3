use async_trait::async_trait;

use crate::chat::ChatMessage;
use crate::errors::RelayError;

/// Seam to the external text-generation API.
///
/// The relay only ever sends a full message list and expects a single
/// response text back; streaming is not part of this contract.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RelayError>;
}

/// Seam to the external speech-to-text API.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe a recorded audio payload. `file_name` carries the
    /// container format hint (e.g. `recording.webm`).
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, RelayError>;
}
