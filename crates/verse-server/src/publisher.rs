use std::sync::Arc;

use tokio::sync::broadcast;
use verse_core::PresenceEvent;

use crate::client::ClientRegistry;

/// Forwards presence diffs from the store's broadcast channel to every
/// subscribed, authenticated WebSocket client. This is the publish side
/// of the live player-state query: subscribers never poll, the store's
/// mutation enqueues the diff and each client drains its own queue.
pub fn start_publisher(
    registry: Arc<ClientRegistry>,
    mut rx: broadcast::Receiver<PresenceEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(json) = serialize_diff(&event) {
                        registry.broadcast_presence(&json);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "presence publisher lagged, dropped diffs");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("presence channel closed");
                    break;
                }
            }
        }
    })
}

/// Wire form of a presence diff notification.
pub fn serialize_diff(event: &PresenceEvent) -> Option<String> {
    serde_json::to_string(&serde_json::json!({
        "type": "presence.diff",
        "event": event,
    }))
    .ok()
}
