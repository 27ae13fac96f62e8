//! Chat endpoints. The REST and live paths are deliberately disjoint:
//! a POSTed message is persisted but not pushed to live subscribers, and
//! a frame received on the live channel is broadcast but not persisted.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use forge_core::ids::ProposalId;
use forge_store::chat::{ChatMessageRow, ChatRepo};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::rooms::RoomRegistry;
use crate::server::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/proposals/{id}/chat", get(history).post(post_message))
        .route("/ws/proposals/{id}/chat", get(ws_chat))
}

#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    message: String,
}

async fn history(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<ProposalId>,
) -> Result<Json<Vec<ChatMessageRow>>, ApiError> {
    let repo = ChatRepo::new(state.db.clone());
    Ok(Json(repo.history(&id)?))
}

async fn post_message(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<ProposalId>,
    Json(input): Json<PostMessageRequest>,
) -> Result<Json<ChatMessageRow>, ApiError> {
    let repo = ChatRepo::new(state.db.clone());
    Ok(Json(repo.post(&id, &actor.0.id, &input.message)?))
}

/// WebSocket upgrade for a proposal's chat room. No membership check is
/// enforced at this layer.
async fn ws_chat(
    Path(id): Path<ProposalId>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_room_socket(socket, id, state.rooms))
}

/// Handle one live chat connection: split into reader/writer, relay each
/// received text frame to the whole room, leave the room on disconnect.
async fn handle_room_socket(socket: WebSocket, proposal_id: ProposalId, rooms: Arc<RoomRegistry>) {
    let (connection_id, mut rx) = rooms.subscribe(&proposal_id);
    tracing::info!(proposal_id = %proposal_id, connection = %connection_id, "chat client joined");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward room payloads to the socket + periodic ping
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader task: every received text frame is broadcast verbatim to the
    // room. Frames are not persisted here.
    let reader_rooms = Arc::clone(&rooms);
    let reader_room = proposal_id.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    reader_rooms.publish(&reader_room, text.as_str());
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum replies with pong automatically
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    rooms.unsubscribe(&proposal_id, &connection_id);
    tracing::info!(proposal_id = %proposal_id, connection = %connection_id, "chat client left");
}
