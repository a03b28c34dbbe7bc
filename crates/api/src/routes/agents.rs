//! Agent endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use deskline_shared::AgentRecord;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// List agents alphabetically, online agents first
pub async fn list_agents(State(state): State<AppState>) -> ApiResult<Json<Vec<AgentRecord>>> {
    let agents = sqlx::query_as::<_, AgentRecord>(
        "SELECT id, name, email, avatar_url, is_online, created_at \
         FROM agents ORDER BY is_online DESC, name ASC",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(agents))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> ApiResult<Json<AgentRecord>> {
    let agent = sqlx::query_as::<_, AgentRecord>(
        "SELECT id, name, email, avatar_url, is_online, created_at FROM agents WHERE id = $1",
    )
    .bind(agent_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("Agent not found".to_string()))?;
    Ok(Json(agent))
}

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

pub async fn create_agent(
    State(state): State<AppState>,
    Json(body): Json<CreateAgentRequest>,
) -> ApiResult<(StatusCode, Json<AgentRecord>)> {
    if body.name.trim().is_empty() || body.email.trim().is_empty() {
        return Err(ApiError::Validation("name and email are required".to_string()));
    }

    let agent = sqlx::query_as::<_, AgentRecord>(
        "INSERT INTO agents (name, email, avatar_url) VALUES ($1, $2, $3) \
         RETURNING id, name, email, avatar_url, is_online, created_at",
    )
    .bind(body.name.trim())
    .bind(body.email.trim())
    .bind(body.avatar_url)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(agent)))
}

/// Manually mark an agent online. The WebSocket handler maintains this flag
/// automatically; this exists for clients without a live socket.
pub async fn set_agent_online(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> ApiResult<Json<AgentRecord>> {
    set_online_flag(&state, agent_id, true).await
}

/// Manually mark an agent offline
pub async fn set_agent_offline(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> ApiResult<Json<AgentRecord>> {
    set_online_flag(&state, agent_id, false).await
}

async fn set_online_flag(
    state: &AppState,
    agent_id: Uuid,
    is_online: bool,
) -> ApiResult<Json<AgentRecord>> {
    let agent = sqlx::query_as::<_, AgentRecord>(
        "UPDATE agents SET is_online = $2 WHERE id = $1 \
         RETURNING id, name, email, avatar_url, is_online, created_at",
    )
    .bind(agent_id)
    .bind(is_online)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("Agent not found".to_string()))?;
    Ok(Json(agent))
}
