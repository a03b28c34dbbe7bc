//! Canned reply endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use deskline_shared::CannedReplyRecord;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CannedReplyListQuery {
    pub category: Option<String>,
}

/// List canned replies, most used first
pub async fn list_canned_replies(
    State(state): State<AppState>,
    Query(query): Query<CannedReplyListQuery>,
) -> ApiResult<Json<Vec<CannedReplyRecord>>> {
    let replies = sqlx::query_as::<_, CannedReplyRecord>(
        "SELECT * FROM canned_replies \
         WHERE ($1::text IS NULL OR category = $1) \
         ORDER BY usage_count DESC, title ASC",
    )
    .bind(query.category.as_deref())
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(replies))
}

/// Distinct categories in use
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let categories = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT category FROM canned_replies WHERE category IS NOT NULL ORDER BY category",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(categories))
}

pub async fn get_canned_reply(
    State(state): State<AppState>,
    Path(reply_id): Path<Uuid>,
) -> ApiResult<Json<CannedReplyRecord>> {
    let reply = sqlx::query_as::<_, CannedReplyRecord>("SELECT * FROM canned_replies WHERE id = $1")
        .bind(reply_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Canned reply not found".to_string()))?;
    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
pub struct CreateCannedReplyRequest {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub shortcut: Option<String>,
}

/// Create a canned reply; shortcuts are unique across the team
pub async fn create_canned_reply(
    State(state): State<AppState>,
    Json(body): Json<CreateCannedReplyRequest>,
) -> ApiResult<(StatusCode, Json<CannedReplyRecord>)> {
    if body.title.trim().is_empty() || body.content.trim().is_empty() {
        return Err(ApiError::Validation("title and content are required".to_string()));
    }

    if let Some(shortcut) = body.shortcut.as_deref() {
        let taken =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM canned_replies WHERE shortcut = $1")
                .bind(shortcut)
                .fetch_optional(&state.pool)
                .await?;
        if taken.is_some() {
            return Err(ApiError::Conflict(format!(
                "Shortcut '{shortcut}' is already in use"
            )));
        }
    }

    let reply = sqlx::query_as::<_, CannedReplyRecord>(
        "INSERT INTO canned_replies (title, content, category, shortcut) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(body.title.trim())
    .bind(&body.content)
    .bind(body.category)
    .bind(body.shortcut)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(reply)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCannedReplyRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub shortcut: Option<String>,
}

pub async fn update_canned_reply(
    State(state): State<AppState>,
    Path(reply_id): Path<Uuid>,
    Json(body): Json<UpdateCannedReplyRequest>,
) -> ApiResult<Json<CannedReplyRecord>> {
    let reply = sqlx::query_as::<_, CannedReplyRecord>(
        "UPDATE canned_replies SET \
             title = COALESCE($2, title), \
             content = COALESCE($3, content), \
             category = COALESCE($4, category), \
             shortcut = COALESCE($5, shortcut), \
             updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(reply_id)
    .bind(body.title)
    .bind(body.content)
    .bind(body.category)
    .bind(body.shortcut)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("Canned reply not found".to_string()))?;
    Ok(Json(reply))
}

pub async fn delete_canned_reply(
    State(state): State<AppState>,
    Path(reply_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM canned_replies WHERE id = $1")
        .bind(reply_id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Canned reply not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Record one use of a reply and return its current content.
/// The increment is a single statement, so concurrent uses all count.
pub async fn use_canned_reply(
    State(state): State<AppState>,
    Path(reply_id): Path<Uuid>,
) -> ApiResult<Json<CannedReplyRecord>> {
    let reply = sqlx::query_as::<_, CannedReplyRecord>(
        "UPDATE canned_replies SET usage_count = usage_count + 1, updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(reply_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("Canned reply not found".to_string()))?;
    Ok(Json(reply))
}
