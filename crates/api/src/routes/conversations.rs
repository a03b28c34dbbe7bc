//! Conversation endpoints
//!
//! Reads query the database directly; every write that can change routing or
//! ownership state goes through the conversation service so the matching
//! events reach connected agents.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use deskline_shared::{ConversationStatus, MessageRecord, Priority};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::ownership::ClaimOutcome;
use crate::state::AppState;
use crate::store::ConversationChanges;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

// =============================================================================
// List
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ConversationListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub agent_id: Option<Uuid>,
    /// Only conversations nobody owns yet
    #[serde(default)]
    pub unassigned: bool,
    /// Substring match against message content
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, FromRow)]
struct ConversationListRow {
    id: Uuid,
    customer_id: Uuid,
    agent_id: Option<Uuid>,
    status: String,
    priority: String,
    subject: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    customer_name: String,
    customer_email: String,
    agent_name: Option<String>,
    last_message_content: Option<String>,
    last_message_at: Option<OffsetDateTime>,
    last_message_from_customer: Option<bool>,
    unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct AgentSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct LastMessage {
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_from_customer: bool,
}

#[derive(Debug, Serialize)]
pub struct ConversationListItem {
    pub id: Uuid,
    pub status: ConversationStatus,
    pub priority: Priority,
    pub subject: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub customer: CustomerSummary,
    pub agent: Option<AgentSummary>,
    pub last_message: Option<LastMessage>,
    pub unread_count: i64,
}

impl From<ConversationListRow> for ConversationListItem {
    fn from(row: ConversationListRow) -> Self {
        let agent = match (row.agent_id, row.agent_name) {
            (Some(id), Some(name)) => Some(AgentSummary { id, name }),
            _ => None,
        };
        let last_message = match (
            row.last_message_content,
            row.last_message_at,
            row.last_message_from_customer,
        ) {
            (Some(content), Some(created_at), Some(is_from_customer)) => Some(LastMessage {
                content,
                created_at,
                is_from_customer,
            }),
            _ => None,
        };
        ConversationListItem {
            id: row.id,
            status: row.status.parse().unwrap_or_default(),
            priority: row.priority.parse().unwrap_or_default(),
            subject: row.subject,
            created_at: row.created_at,
            updated_at: row.updated_at,
            customer: CustomerSummary {
                id: row.customer_id,
                name: row.customer_name,
                email: row.customer_email,
            },
            agent,
            last_message,
            unread_count: row.unread_count,
        }
    }
}

pub(crate) fn parse_status_filter(raw: Option<&str>) -> ApiResult<Option<ConversationStatus>> {
    raw.map(|s| {
        s.parse::<ConversationStatus>()
            .map_err(|_| ApiError::BadRequest(format!("Invalid status filter: {s}")))
    })
    .transpose()
}

pub(crate) fn parse_priority_filter(raw: Option<&str>) -> ApiResult<Option<Priority>> {
    raw.map(|s| {
        s.parse::<Priority>()
            .map_err(|_| ApiError::BadRequest(format!("Invalid priority filter: {s}")))
    })
    .transpose()
}

/// Filters used by the conversation list, customer history, and search
pub(crate) struct ListFilters<'a> {
    pub status: Option<ConversationStatus>,
    pub priority: Option<Priority>,
    pub agent_id: Option<Uuid>,
    pub unassigned: bool,
    pub customer_id: Option<Uuid>,
    pub message_like: Option<&'a str>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListFilters<'_> {
    fn default() -> Self {
        ListFilters {
            status: None,
            priority: None,
            agent_id: None,
            unassigned: false,
            customer_id: None,
            message_like: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// One query serves every list surface; absent filters bind as NULL.
/// Ordering is urgency first, then most recent activity.
pub(crate) async fn fetch_conversation_list(
    pool: &PgPool,
    filters: ListFilters<'_>,
) -> ApiResult<Vec<ConversationListItem>> {
    let rows = sqlx::query_as::<_, ConversationListRow>(
        r#"
        SELECT c.id, c.customer_id, c.agent_id, c.status, c.priority, c.subject,
               c.created_at, c.updated_at,
               cu.name AS customer_name, cu.email AS customer_email,
               a.name AS agent_name,
               lm.content AS last_message_content,
               lm.created_at AS last_message_at,
               lm.is_from_customer AS last_message_from_customer,
               (SELECT COUNT(*) FROM messages m
                 WHERE m.conversation_id = c.id
                   AND m.is_from_customer AND m.read_at IS NULL) AS unread_count
          FROM conversations c
          JOIN customers cu ON cu.id = c.customer_id
          LEFT JOIN agents a ON a.id = c.agent_id
          LEFT JOIN LATERAL (
                SELECT content, created_at, is_from_customer
                  FROM messages m
                 WHERE m.conversation_id = c.id
                 ORDER BY m.created_at DESC
                 LIMIT 1
          ) lm ON TRUE
         WHERE ($1::text IS NULL OR c.status = $1)
           AND ($2::text IS NULL OR c.priority = $2)
           AND ($3::uuid IS NULL OR c.agent_id = $3)
           AND (NOT $4 OR c.agent_id IS NULL)
           AND ($5::uuid IS NULL OR c.customer_id = $5)
           AND ($6::text IS NULL OR EXISTS (
                SELECT 1 FROM messages m
                 WHERE m.conversation_id = c.id
                   AND m.content ILIKE '%' || $6 || '%'))
         ORDER BY CASE c.priority
                    WHEN 'urgent' THEN 0
                    WHEN 'high' THEN 1
                    WHEN 'medium' THEN 2
                    ELSE 3
                  END,
                  c.updated_at DESC
         LIMIT $7 OFFSET $8
        "#,
    )
    .bind(filters.status.map(|s| s.as_str()))
    .bind(filters.priority.map(|p| p.as_str()))
    .bind(filters.agent_id)
    .bind(filters.unassigned)
    .bind(filters.customer_id)
    .bind(filters.message_like)
    .bind(filters.limit.clamp(1, MAX_PAGE_SIZE))
    .bind(filters.offset.max(0))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// List conversations, urgent first
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationListQuery>,
) -> ApiResult<Json<Vec<ConversationListItem>>> {
    let filters = ListFilters {
        status: parse_status_filter(query.status.as_deref())?,
        priority: parse_priority_filter(query.priority.as_deref())?,
        agent_id: query.agent_id,
        unassigned: query.unassigned,
        message_like: query.search.as_deref(),
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        offset: query.offset.unwrap_or(0),
        ..Default::default()
    };
    let items = fetch_conversation_list(&state.pool, filters).await?;
    Ok(Json(items))
}

// =============================================================================
// Stats
// =============================================================================

#[derive(Debug, FromRow)]
struct CountRow {
    key: String,
    count: i64,
}

/// Queue overview counts for the dashboard header
pub async fn conversation_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let by_status = sqlx::query_as::<_, CountRow>(
        "SELECT status AS key, COUNT(*) AS count FROM conversations GROUP BY status",
    )
    .fetch_all(&state.pool)
    .await?;

    let by_priority = sqlx::query_as::<_, CountRow>(
        "SELECT priority AS key, COUNT(*) AS count FROM conversations \
         WHERE status IN ('open', 'in_progress') GROUP BY priority",
    )
    .fetch_all(&state.pool)
    .await?;

    let unassigned: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM conversations \
         WHERE agent_id IS NULL AND status IN ('open', 'in_progress')",
    )
    .fetch_one(&state.pool)
    .await?;

    let total: i64 = by_status.iter().map(|row| row.count).sum();
    let status_map: serde_json::Map<String, Value> = by_status
        .into_iter()
        .map(|row| (row.key, row.count.into()))
        .collect();
    let priority_map: serde_json::Map<String, Value> = by_priority
        .into_iter()
        .map(|row| (row.key, row.count.into()))
        .collect();

    Ok(Json(json!({
        "total": total,
        "by_status": status_map,
        "by_priority": priority_map,
        "unassigned": unassigned,
    })))
}

// =============================================================================
// Detail
// =============================================================================

#[derive(Debug, FromRow)]
struct MessageDetailRow {
    id: Uuid,
    conversation_id: Uuid,
    customer_id: Option<Uuid>,
    agent_id: Option<Uuid>,
    content: String,
    is_from_customer: bool,
    priority: String,
    created_at: OffsetDateTime,
    read_at: Option<OffsetDateTime>,
    customer_name: Option<String>,
    agent_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageDetail {
    pub id: Uuid,
    pub conversation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,
    pub content: String,
    pub is_from_customer: bool,
    pub priority: Priority,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    pub sender_name: Option<String>,
}

impl From<MessageDetailRow> for MessageDetail {
    fn from(row: MessageDetailRow) -> Self {
        let sender_name = if row.is_from_customer {
            row.customer_name
        } else {
            row.agent_name
        };
        MessageDetail {
            id: row.id,
            conversation_id: row.conversation_id,
            customer_id: row.customer_id,
            agent_id: row.agent_id,
            content: row.content,
            is_from_customer: row.is_from_customer,
            priority: row.priority.parse().unwrap_or_default(),
            created_at: row.created_at,
            read_at: row.read_at,
            sender_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub id: Uuid,
    pub status: ConversationStatus,
    pub priority: Priority,
    pub subject: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub customer: CustomerSummary,
    pub agent: Option<AgentSummary>,
    pub messages: Vec<MessageDetail>,
}

/// Fetch one conversation with its full message history
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<ConversationDetail>> {
    let header = sqlx::query_as::<_, ConversationListRow>(
        r#"
        SELECT c.id, c.customer_id, c.agent_id, c.status, c.priority, c.subject,
               c.created_at, c.updated_at,
               cu.name AS customer_name, cu.email AS customer_email,
               a.name AS agent_name,
               NULL::text AS last_message_content,
               NULL::timestamptz AS last_message_at,
               NULL::boolean AS last_message_from_customer,
               0::bigint AS unread_count
          FROM conversations c
          JOIN customers cu ON cu.id = c.customer_id
          LEFT JOIN agents a ON a.id = c.agent_id
         WHERE c.id = $1
        "#,
    )
    .bind(conversation_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    let messages = sqlx::query_as::<_, MessageDetailRow>(
        r#"
        SELECT m.id, m.conversation_id, m.customer_id, m.agent_id, m.content,
               m.is_from_customer, m.priority, m.created_at, m.read_at,
               cu.name AS customer_name, a.name AS agent_name
          FROM messages m
          LEFT JOIN customers cu ON cu.id = m.customer_id
          LEFT JOIN agents a ON a.id = m.agent_id
         WHERE m.conversation_id = $1
         ORDER BY m.created_at ASC
        "#,
    )
    .bind(conversation_id)
    .fetch_all(&state.pool)
    .await?;

    let agent = match (header.agent_id, header.agent_name) {
        (Some(id), Some(name)) => Some(AgentSummary { id, name }),
        _ => None,
    };

    Ok(Json(ConversationDetail {
        id: header.id,
        status: header.status.parse().unwrap_or_default(),
        priority: header.priority.parse().unwrap_or_default(),
        subject: header.subject,
        created_at: header.created_at,
        updated_at: header.updated_at,
        customer: CustomerSummary {
            id: header.customer_id,
            name: header.customer_name,
            email: header.customer_email,
        },
        agent,
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}

// =============================================================================
// Mutations
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub subject: Option<String>,
}

/// Update status, priority, or subject. Ownership is not editable here;
/// assign and release are the only paths that move it.
pub async fn update_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<UpdateConversationRequest>,
) -> ApiResult<Json<deskline_shared::ConversationRecord>> {
    let changes = ConversationChanges {
        status: parse_status_filter(body.status.as_deref())?,
        priority: parse_priority_filter(body.priority.as_deref())?,
        subject: body.subject,
    };
    let updated = state
        .conversations
        .update_conversation(conversation_id, changes)
        .await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct AgentMessageRequest {
    pub agent_id: Uuid,
    pub content: String,
}

/// Agent reply; replying to an unowned conversation claims it
pub async fn send_agent_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<AgentMessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageRecord>)> {
    let message = state
        .conversations
        .submit_agent_message(conversation_id, body.agent_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Mark all unread customer messages as read
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let marked = state.conversations.mark_read(conversation_id).await?;
    Ok(Json(json!({ "marked_read": marked })))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub agent_id: Uuid,
    #[serde(default)]
    pub force: bool,
}

/// Claim a conversation for an agent
pub async fn assign_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<AssignRequest>,
) -> ApiResult<Json<ClaimOutcome>> {
    let outcome = state
        .conversations
        .claim(conversation_id, body.agent_id, body.force)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub agent_id: Uuid,
}

/// Return a conversation to the unowned pool (owner only)
pub async fn release_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<ReleaseRequest>,
) -> ApiResult<Json<Value>> {
    state
        .conversations
        .release(conversation_id, body.agent_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}
