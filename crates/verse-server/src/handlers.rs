//! RPC method handlers organized by domain.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;

use verse_core::ids::UserId;
use verse_core::player::Pose;
use verse_core::RelayError;
use verse_presence::PresenceStore;
use verse_relay::CompletionRelay;
use verse_store::{Database, TurnRepo};

use crate::client::{ClientId, ClientRegistry};
use crate::rpc::{self, RpcResponse};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub db: Database,
    pub registry: Arc<ClientRegistry>,
    pub presence: Arc<PresenceStore>,
    pub relay: Arc<CompletionRelay>,
    turns: TurnRepo,
    // name → user id, stable across reconnects
    users: DashMap<String, UserId>,
}

impl HandlerState {
    pub fn new(
        db: Database,
        registry: Arc<ClientRegistry>,
        presence: Arc<PresenceStore>,
        relay: Arc<CompletionRelay>,
    ) -> Self {
        let turns = TurnRepo::new(db.clone());
        Self {
            db,
            registry,
            presence,
            relay,
            turns,
            users: DashMap::new(),
        }
    }

    /// The authenticated user behind `caller`, if any.
    async fn authed_user(&self, caller: Option<&ClientId>) -> Option<UserId> {
        match caller {
            Some(client_id) => self.registry.user_of(client_id).await,
            None => None,
        }
    }
}

/// Dispatch an RPC method to the appropriate handler. `caller` is the
/// WebSocket connection the request arrived on (None for plain HTTP).
pub async fn dispatch(
    state: &Arc<HandlerState>,
    caller: Option<&ClientId>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    match method {
        // Auth
        "auth.login" => auth_login(state, caller, params, id).await,
        "auth.logout" => auth_logout(state, caller, id).await,

        // Chat
        "chat.send" => chat_send(state, caller, params, id).await,
        "chat.sendAudio" => chat_send_audio(state, caller, params, id).await,
        "chat.history" => chat_history(state, caller, id).await,
        "chat.reset" => chat_reset(state, id),

        // Player state
        "player.update" => player_update(state, caller, params, id).await,

        // Presence
        "presence.subscribe" => presence_subscribe(state, caller, id).await,
        "presence.unsubscribe" => presence_unsubscribe(state, caller, id).await,
        "presence.list" => presence_list(state, caller, id).await,

        // System
        "health" | "system.ping" => health(state, id),

        _ => RpcResponse::method_not_found(id, method),
    }
}

// ── Auth handlers ──

async fn auth_login(
    state: &Arc<HandlerState>,
    caller: Option<&ClientId>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(client_id) = caller else {
        return RpcResponse::invalid_params(id, "auth.login requires a WebSocket connection");
    };

    let name = match rpc::require_str(params, "name") {
        Ok(n) if !n.trim().is_empty() => n.trim().to_string(),
        Ok(_) => return RpcResponse::invalid_params(id, "name must not be empty"),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    let user_id = state
        .users
        .entry(name.clone())
        .or_insert_with(UserId::new)
        .value()
        .clone();

    state.registry.bind_user(client_id, user_id.clone()).await;
    tracing::info!(client_id = %client_id, user_id = %user_id, name = %name, "logged in");

    RpcResponse::success(id, serde_json::json!({ "userId": user_id }))
}

async fn auth_logout(
    state: &Arc<HandlerState>,
    caller: Option<&ClientId>,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(client_id) = caller else {
        return RpcResponse::unauthenticated(id);
    };

    if let Some(user_id) = state.registry.unbind_user(client_id).await {
        state.presence.remove(&user_id);
        tracing::info!(client_id = %client_id, user_id = %user_id, "logged out");
    }

    RpcResponse::success(id, serde_json::json!({ "loggedOut": true }))
}

// ── Chat handlers ──

async fn chat_send(
    state: &Arc<HandlerState>,
    caller: Option<&ClientId>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let text = match rpc::require_str(params, "text") {
        Ok(t) => t.to_string(),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    let user = state.authed_user(caller).await;
    match state.relay.respond(user.as_ref(), &text).await {
        Ok(response) => RpcResponse::success(id, serde_json::json!({ "response": response })),
        Err(RelayError::Unauthenticated) => RpcResponse::unauthenticated(id),
        Err(e) => RpcResponse::internal_error(id, e.to_string()),
    }
}

async fn chat_send_audio(
    state: &Arc<HandlerState>,
    caller: Option<&ClientId>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let encoded = match rpc::require_str(params, "audio") {
        Ok(a) => a,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    let audio = match BASE64.decode(encoded) {
        Ok(bytes) => bytes,
        Err(e) => return RpcResponse::invalid_params(id, format!("audio is not valid base64: {e}")),
    };

    let user = state.authed_user(caller).await;
    match state.relay.respond_audio(user.as_ref(), audio).await {
        Ok(reply) => RpcResponse::success(
            id,
            serde_json::json!({
                "transcript": reply.transcript,
                "response": reply.response,
            }),
        ),
        Err(RelayError::Unauthenticated) => RpcResponse::unauthenticated(id),
        // Transcription failed: degrade to the fallback text, like a
        // failed completion, rather than breaking the call.
        Err(e) if e.is_upstream() => RpcResponse::success(
            id,
            serde_json::json!({
                "transcript": serde_json::Value::Null,
                "response": e.fallback_text(),
            }),
        ),
        Err(e) => RpcResponse::internal_error(id, e.to_string()),
    }
}

async fn chat_history(
    state: &Arc<HandlerState>,
    caller: Option<&ClientId>,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(user) = state.authed_user(caller).await else {
        return RpcResponse::unauthenticated(id);
    };

    match state.turns.history(&user) {
        Ok(turns) => {
            let count = turns.len();
            match serde_json::to_value(&turns) {
                Ok(turns) => RpcResponse::success(
                    id,
                    serde_json::json!({ "turns": turns, "totalCount": count }),
                ),
                Err(e) => RpcResponse::internal_error(id, format!("serialization failed: {e}")),
            }
        }
        Err(e) => RpcResponse::internal_error(id, e.to_string()),
    }
}

/// Administrative clear of all conversation history (dev/test tooling).
fn chat_reset(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    match state.turns.reset() {
        Ok(cleared) => RpcResponse::success(id, serde_json::json!({ "cleared": cleared })),
        Err(e) => RpcResponse::internal_error(id, e.to_string()),
    }
}

// ── Player state handlers ──

async fn player_update(
    state: &Arc<HandlerState>,
    caller: Option<&ClientId>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(user) = state.authed_user(caller).await else {
        return RpcResponse::unauthenticated(id);
    };

    let pose: Pose = match serde_json::from_value(params.clone()) {
        Ok(p) => p,
        Err(e) => return RpcResponse::invalid_params(id, format!("bad player state: {e}")),
    };

    let stored = state.presence.upsert(&user, pose);
    RpcResponse::success(id, serde_json::json!({ "updatedAt": stored.last_update }))
}

// ── Presence handlers ──

async fn presence_subscribe(
    state: &Arc<HandlerState>,
    caller: Option<&ClientId>,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(client_id) = caller else {
        return RpcResponse::unauthenticated(id);
    };
    if state.authed_user(caller).await.is_none() {
        return RpcResponse::unauthenticated(id);
    }

    state.registry.set_subscribed(client_id, true).await;
    snapshot_response(state, id)
}

async fn presence_unsubscribe(
    state: &Arc<HandlerState>,
    caller: Option<&ClientId>,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(client_id) = caller else {
        return RpcResponse::unauthenticated(id);
    };

    state.registry.set_subscribed(client_id, false).await;
    RpcResponse::success(id, serde_json::json!({ "subscribed": false }))
}

async fn presence_list(
    state: &Arc<HandlerState>,
    caller: Option<&ClientId>,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    if state.authed_user(caller).await.is_none() {
        return RpcResponse::unauthenticated(id);
    }
    snapshot_response(state, id)
}

fn snapshot_response(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    match serde_json::to_value(state.presence.all()) {
        Ok(players) => RpcResponse::success(id, serde_json::json!({ "players": players })),
        Err(e) => RpcResponse::internal_error(id, format!("serialization failed: {e}")),
    }
}

// ── System handlers ──

fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let db_ok = state
        .db
        .with_conn(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(true)
        })
        .unwrap_or(false);

    RpcResponse::success(
        id,
        serde_json::json!({
            "status": if db_ok { "healthy" } else { "degraded" },
            "components": {
                "database": if db_ok { "ok" } else { "error" },
                "players": state.presence.len(),
            },
        }),
    )
}
