//! Customer endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use deskline_shared::CustomerRecord;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::ownership::{InboundMessage, InboundReceipt};
use crate::state::AppState;

use super::conversations::{fetch_conversation_list, ConversationListItem, ListFilters};

#[derive(Debug, Deserialize)]
pub struct CustomerListQuery {
    /// Substring match against name or email
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// List customers, most recently active first
pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<CustomerListQuery>,
) -> ApiResult<Json<Vec<CustomerRecord>>> {
    let customers = sqlx::query_as::<_, CustomerRecord>(
        "SELECT * FROM customers \
         WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR email ILIKE '%' || $1 || '%') \
         ORDER BY last_activity DESC \
         LIMIT $2 OFFSET $3",
    )
    .bind(query.search.as_deref())
    .bind(query.limit.unwrap_or(50).clamp(1, 200))
    .bind(query.offset.unwrap_or(0).max(0))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(customers))
}

pub async fn get_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> ApiResult<Json<CustomerRecord>> {
    let customer = sqlx::query_as::<_, CustomerRecord>("SELECT * FROM customers WHERE id = $1")
        .bind(customer_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Customer not found".to_string()))?;
    Ok(Json(customer))
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub loan_status: Option<String>,
    pub loan_amount: Option<f64>,
    pub profile_notes: Option<String>,
}

/// Create a customer; a duplicate email is a conflict
pub async fn create_customer(
    State(state): State<AppState>,
    Json(body): Json<CreateCustomerRequest>,
) -> ApiResult<(StatusCode, Json<CustomerRecord>)> {
    if body.name.trim().is_empty() || body.email.trim().is_empty() {
        return Err(ApiError::Validation("name and email are required".to_string()));
    }

    let customer = sqlx::query_as::<_, CustomerRecord>(
        "INSERT INTO customers (name, email, phone, loan_status, loan_amount, profile_notes) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(body.name.trim())
    .bind(body.email.trim())
    .bind(body.phone)
    .bind(body.loan_status)
    .bind(body.loan_amount)
    .bind(body.profile_notes)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(customer)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub account_status: Option<String>,
    pub loan_status: Option<String>,
    pub loan_amount: Option<f64>,
    pub profile_notes: Option<String>,
}

/// Update customer profile fields. Email is immutable; it is the identity
/// external channels route on.
pub async fn update_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(body): Json<UpdateCustomerRequest>,
) -> ApiResult<Json<CustomerRecord>> {
    let customer = sqlx::query_as::<_, CustomerRecord>(
        "UPDATE customers SET \
             name = COALESCE($2, name), \
             phone = COALESCE($3, phone), \
             account_status = COALESCE($4, account_status), \
             loan_status = COALESCE($5, loan_status), \
             loan_amount = COALESCE($6, loan_amount), \
             profile_notes = COALESCE($7, profile_notes) \
         WHERE id = $1 RETURNING *",
    )
    .bind(customer_id)
    .bind(body.name)
    .bind(body.phone)
    .bind(body.account_status)
    .bind(body.loan_status)
    .bind(body.loan_amount)
    .bind(body.profile_notes)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("Customer not found".to_string()))?;
    Ok(Json(customer))
}

/// Conversation history for one customer, newest activity first
pub async fn get_customer_conversations(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ConversationListItem>>> {
    // 404 for unknown customers rather than an empty list
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM customers WHERE id = $1")
        .bind(customer_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Customer not found".to_string()))?;

    let items = fetch_conversation_list(
        &state.pool,
        ListFilters {
            customer_id: Some(customer_id),
            ..Default::default()
        },
    )
    .await?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct CustomerMessageRequest {
    pub content: String,
}

/// Submit a message on behalf of a known customer
pub async fn send_customer_message(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(body): Json<CustomerMessageRequest>,
) -> ApiResult<(StatusCode, Json<InboundReceipt>)> {
    let receipt = state
        .conversations
        .submit_customer_message(InboundMessage {
            customer_id: Some(customer_id),
            customer_email: None,
            customer_name: None,
            content: body.content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
