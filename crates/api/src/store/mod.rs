//! Persistence seam for the conversation service
//!
//! `RecordStore` abstracts exactly the queries the real-time routing path
//! needs, so the ownership logic can be exercised against an in-memory
//! double while production wires in [`postgres::PgStore`].

use async_trait::async_trait;
use deskline_shared::{
    AgentRecord, ConversationRecord, ConversationStatus, CustomerRecord, MessageRecord, Priority,
};
use uuid::Uuid;

use crate::error::ApiResult;

pub mod postgres;

pub use postgres::PgStore;

/// A message about to be persisted
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub content: String,
    pub is_from_customer: bool,
    pub priority: Priority,
}

/// Partial update for conversation fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ConversationChanges {
    pub status: Option<ConversationStatus>,
    pub priority: Option<Priority>,
    pub subject: Option<String>,
}

/// Queries and mutations the routing and ownership paths depend on
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_agent(&self, id: Uuid) -> ApiResult<AgentRecord>;

    async fn get_customer(&self, id: Uuid) -> ApiResult<CustomerRecord>;

    async fn find_customer_by_email(&self, email: &str) -> ApiResult<Option<CustomerRecord>>;

    async fn create_customer(&self, name: &str, email: &str) -> ApiResult<CustomerRecord>;

    /// Bump the customer's last_seen timestamp
    async fn touch_customer_activity(&self, id: Uuid) -> ApiResult<()>;

    async fn get_conversation(&self, id: Uuid) -> ApiResult<ConversationRecord>;

    /// Most recently updated conversation for the customer whose status is
    /// still open or in_progress, if any
    async fn find_open_conversation_for_customer(
        &self,
        customer_id: Uuid,
    ) -> ApiResult<Option<ConversationRecord>>;

    async fn create_conversation(
        &self,
        customer_id: Uuid,
        priority: Priority,
        subject: Option<&str>,
    ) -> ApiResult<ConversationRecord>;

    async fn create_message(&self, message: NewMessage) -> ApiResult<MessageRecord>;

    /// Compare-and-set the conversation owner.
    ///
    /// Succeeds only when the current owner still equals `expected`, so
    /// concurrent claims resolve to exactly one winner. Returns false when
    /// the precondition no longer holds.
    async fn update_conversation_owner_atomic(
        &self,
        id: Uuid,
        expected: Option<Uuid>,
        new: Option<Uuid>,
    ) -> ApiResult<bool>;

    /// Raise the conversation priority to `floor` if it is currently lower.
    /// Priority never decreases through this path.
    async fn raise_conversation_priority(&self, id: Uuid, floor: Priority) -> ApiResult<()>;

    async fn set_conversation_status(&self, id: Uuid, status: ConversationStatus) -> ApiResult<()>;

    async fn update_conversation_fields(
        &self,
        id: Uuid,
        changes: ConversationChanges,
    ) -> ApiResult<ConversationRecord>;

    /// Mark all unread customer messages in the conversation as read.
    /// Returns the number of messages affected.
    async fn mark_messages_read(&self, conversation_id: Uuid) -> ApiResult<u64>;
}
