//! WebSocket handler for Axum
//!
//! Upgrades agent connections, pumps outbound events to the socket, and
//! reacts to inbound control messages (ping, typing, viewing, stop_viewing).

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

use super::{
    connection::AgentConnection,
    events::{ClientEvent, ServerEvent},
    hub::ConnectionHub,
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    agent_id: Uuid,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
///
/// Agent identity is caller-supplied via query parameter and not validated
/// against the record store at this layer.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Response {
    tracing::info!(agent_id = %params.agent_id, "WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, params.agent_id, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, agent_id: Uuid, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Channel feeding this connection's outbound pump
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Registers presence and queues the connected ack as the first event
    let conn = state.hub.connect(agent_id, tx).await;
    let handle = conn.handle;

    if let Err(e) = set_agent_online_flag(&state.pool, agent_id, true).await {
        tracing::warn!(error = ?e, agent_id = %agent_id, "Failed to mark agent online");
    }

    // Spawn task to push events to the client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming control messages; the loop suspends only while
    // awaiting the next inbound frame
    while let Some(msg) = receiver.next().await {
        let Ok(msg) = msg else {
            break; // transport error, clean up below
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(event, &conn, &state.hub).await,
                Err(_) if serde_json::from_str::<serde_json::Value>(&text).is_ok() => {
                    // Well-formed JSON with an unrecognized type: ignored by design
                    tracing::debug!(
                        agent_id = %agent_id,
                        message = %text,
                        "Ignoring unrecognized control message"
                    );
                }
                Err(_) => {
                    // Reported only to the sender; never aborts the connection
                    let _ = conn.send(ServerEvent::Error {
                        message: "Invalid JSON format".to_string(),
                    });
                }
            },
            Message::Close(_) => {
                tracing::info!(agent_id = %agent_id, handle = %handle, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles protocol-level ping/pong automatically
            }
            _ => {} // Ignore binary messages
        }
    }

    // Cleanup on disconnect; cancels only this channel's pending sends
    tracing::info!(agent_id = %agent_id, handle = %handle, "WebSocket connection closing");
    let went_offline = state.hub.disconnect(agent_id, handle).await;

    if went_offline {
        if let Err(e) = set_agent_online_flag(&state.pool, agent_id, false).await {
            tracing::warn!(error = ?e, agent_id = %agent_id, "Failed to mark agent offline");
        }
    }

    send_task.abort();
}

/// Handle a parsed client control message
async fn handle_client_event(event: ClientEvent, conn: &Arc<AgentConnection>, hub: &ConnectionHub) {
    match event {
        ClientEvent::Ping {} => {
            let _ = conn.send(ServerEvent::Pong {});
        }

        ClientEvent::Typing {
            conversation_id,
            is_typing,
        } => {
            // Relay only to the other agents currently viewing this conversation
            let mut viewers = hub.presence().viewers_of(conversation_id).await;
            viewers.retain(|agent| *agent != conn.agent_id);
            if viewers.is_empty() {
                return;
            }
            hub.broadcast_to(
                &viewers,
                ServerEvent::AgentTyping {
                    conversation_id,
                    agent_id: conn.agent_id,
                    is_typing,
                },
            )
            .await;
        }

        ClientEvent::Viewing { conversation_id } => {
            hub.presence().set_viewing(conn.agent_id, conversation_id).await;
        }

        ClientEvent::StopViewing { conversation_id } => {
            hub.presence()
                .clear_viewing(conn.agent_id, conversation_id)
                .await;
        }
    }
}

/// Persist the agent's online flag so list endpoints reflect live presence
async fn set_agent_online_flag(
    pool: &PgPool,
    agent_id: Uuid,
    is_online: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE agents SET is_online = $2 WHERE id = $1")
        .bind(agent_id)
        .bind(is_online)
        .execute(pool)
        .await?;
    Ok(())
}
