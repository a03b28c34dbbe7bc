//! Search endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use deskline_shared::CustomerRecord;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

use super::conversations::{
    fetch_conversation_list, parse_priority_filter, parse_status_filter, ConversationListItem,
    ListFilters,
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    /// Narrow conversation matches by status or priority
    pub status: Option<String>,
    pub priority: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub conversations: Vec<ConversationListItem>,
    pub customers: Vec<CustomerRecord>,
}

/// Search message content and customer profiles in one call
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResults>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(ApiError::Validation("Search query is required".to_string()));
    }
    let limit = query.limit.unwrap_or(25).clamp(1, 100);

    let conversations = fetch_conversation_list(
        &state.pool,
        ListFilters {
            status: parse_status_filter(query.status.as_deref())?,
            priority: parse_priority_filter(query.priority.as_deref())?,
            message_like: Some(q),
            limit,
            ..Default::default()
        },
    )
    .await?;

    let customers = sqlx::query_as::<_, CustomerRecord>(
        "SELECT * FROM customers \
         WHERE name ILIKE '%' || $1 || '%' \
            OR email ILIKE '%' || $1 || '%' \
            OR phone ILIKE '%' || $1 || '%' \
         ORDER BY last_activity DESC LIMIT $2",
    )
    .bind(q)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(SearchResults {
        conversations,
        customers,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    pub q: String,
}

#[derive(Debug, FromRow)]
struct SuggestionRow {
    value: String,
}

/// Typeahead suggestions drawn from customer names and emails
pub async fn suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionQuery>,
) -> ApiResult<Json<Vec<String>>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let names = sqlx::query_as::<_, SuggestionRow>(
        "SELECT DISTINCT name AS value FROM customers \
         WHERE name ILIKE '%' || $1 || '%' ORDER BY value LIMIT 5",
    )
    .bind(q)
    .fetch_all(&state.pool)
    .await?;

    let emails = sqlx::query_as::<_, SuggestionRow>(
        "SELECT DISTINCT email AS value FROM customers \
         WHERE email ILIKE '%' || $1 || '%' ORDER BY value LIMIT 5",
    )
    .bind(q)
    .fetch_all(&state.pool)
    .await?;

    let suggestions: Vec<String> = names
        .into_iter()
        .chain(emails)
        .map(|row| row.value)
        .take(10)
        .collect();
    Ok(Json(suggestions))
}
