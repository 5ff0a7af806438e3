use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use verse_core::{ChatMessage, CompletionProvider, RelayError, TranscriptionProvider};

/// Pre-programmed completion results for deterministic tests.
pub enum MockReply {
    Text(String),
    Error(RelayError),
    /// Wait, then yield the inner reply.
    Delay(Duration, Box<MockReply>),
    /// Never resolves, for exercising the timeout race.
    Pending,
}

impl MockReply {
    pub fn text(s: &str) -> Self {
        Self::Text(s.to_string())
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Completion provider that replays queued responses in order and
/// records every request it receives.
pub struct MockCompletion {
    replies: Mutex<VecDeque<MockReply>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockCompletion {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Every message list this mock was called with, in order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletion {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RelayError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(messages.to_vec());

        let mut reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockReply::Error(RelayError::Malformed("mock queue empty".into())));

        loop {
            match reply {
                MockReply::Text(text) => return Ok(text),
                MockReply::Error(e) => return Err(e),
                MockReply::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                MockReply::Pending => return futures::future::pending().await,
            }
        }
    }
}

/// Transcription provider replaying queued results.
pub struct MockTranscription {
    replies: Mutex<VecDeque<Result<String, RelayError>>>,
    calls: AtomicUsize,
    received: Mutex<Vec<(usize, String)>>,
}

impl MockTranscription {
    pub fn new(replies: Vec<Result<String, RelayError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// (payload length, file name) per call, in order.
    pub fn received(&self) -> Vec<(usize, String)> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl TranscriptionProvider for MockTranscription {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, RelayError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.received.lock().push((audio.len(), file_name.to_string()));

        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(RelayError::Malformed("mock queue empty".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_in_order() {
        let mock = MockCompletion::new(vec![MockReply::text("one"), MockReply::text("two")]);
        assert_eq!(mock.complete(&[]).await.unwrap(), "one");
        assert_eq!(mock.complete(&[]).await.unwrap(), "two");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn empty_queue_errors() {
        let mock = MockCompletion::new(vec![]);
        assert!(mock.complete(&[]).await.is_err());
    }

    #[tokio::test]
    async fn records_requests() {
        let mock = MockCompletion::new(vec![MockReply::text("ok")]);
        mock.complete(&[ChatMessage::user("hi")]).await.unwrap();
        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0].content, "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_reply_waits() {
        let mock = MockCompletion::new(vec![MockReply::delayed(
            Duration::from_secs(3),
            MockReply::text("late"),
        )]);
        // Paused time auto-advances through the sleep.
        assert_eq!(mock.complete(&[]).await.unwrap(), "late");
    }

    #[tokio::test]
    async fn transcription_records_payload() {
        let mock = MockTranscription::new(vec![Ok("hello".into())]);
        let text = mock.transcribe(vec![0; 42], "recording.webm").await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(mock.received(), vec![(42, "recording.webm".to_string())]);
    }
}
