//! Inbound messages from external channels
//!
//! Entry point for chat widgets, email bridges, and other channels that speak
//! on behalf of customers. The sender identifies the customer by id or email;
//! unknown emails create a customer on the fly.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::ownership::{InboundMessage, InboundReceipt};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExternalMessageRequest {
    pub customer_id: Option<Uuid>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub content: String,
}

/// Receive an external customer message and route it
pub async fn receive_external_message(
    State(state): State<AppState>,
    Json(body): Json<ExternalMessageRequest>,
) -> ApiResult<(StatusCode, Json<InboundReceipt>)> {
    let receipt = state
        .conversations
        .submit_customer_message(InboundMessage {
            customer_id: body.customer_id,
            customer_email: body.customer_email,
            customer_name: body.customer_name,
            content: body.content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
