//! Postgres-backed record store

use async_trait::async_trait;
use deskline_shared::{
    AgentRecord, ConversationRecord, ConversationStatus, CustomerRecord, MessageRecord, Priority,
};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

use super::{ConversationChanges, NewMessage, RecordStore};

/// Raw conversation row; status and priority arrive as text
#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    customer_id: Uuid,
    agent_id: Option<Uuid>,
    status: String,
    priority: String,
    subject: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ConversationRow> for ConversationRecord {
    fn from(row: ConversationRow) -> Self {
        ConversationRecord {
            id: row.id,
            customer_id: row.customer_id,
            agent_id: row.agent_id,
            // CHECK constraints keep the column in range; default on mismatch
            status: row.status.parse().unwrap_or_default(),
            priority: row.priority.parse().unwrap_or_default(),
            subject: row.subject,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    customer_id: Option<Uuid>,
    agent_id: Option<Uuid>,
    content: String,
    is_from_customer: bool,
    priority: String,
    created_at: OffsetDateTime,
    read_at: Option<OffsetDateTime>,
}

impl From<MessageRow> for MessageRecord {
    fn from(row: MessageRow) -> Self {
        MessageRecord {
            id: row.id,
            conversation_id: row.conversation_id,
            customer_id: row.customer_id,
            agent_id: row.agent_id,
            content: row.content,
            is_from_customer: row.is_from_customer,
            priority: row.priority.parse().unwrap_or_default(),
            created_at: row.created_at,
            read_at: row.read_at,
        }
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, customer_id, agent_id, status, priority, subject, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, customer_id, agent_id, content, is_from_customer, priority, created_at, read_at";

/// Production [`RecordStore`] backed by the shared connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn get_agent(&self, id: Uuid) -> ApiResult<AgentRecord> {
        sqlx::query_as::<_, AgentRecord>(
            "SELECT id, name, email, avatar_url, is_online, created_at FROM agents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Agent not found".to_string()))
    }

    async fn get_customer(&self, id: Uuid) -> ApiResult<CustomerRecord> {
        sqlx::query_as::<_, CustomerRecord>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Customer not found".to_string()))
    }

    async fn find_customer_by_email(&self, email: &str) -> ApiResult<Option<CustomerRecord>> {
        let customer =
            sqlx::query_as::<_, CustomerRecord>("SELECT * FROM customers WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(customer)
    }

    async fn create_customer(&self, name: &str, email: &str) -> ApiResult<CustomerRecord> {
        let customer = sqlx::query_as::<_, CustomerRecord>(
            "INSERT INTO customers (name, email) VALUES ($1, $2) RETURNING *",
        )
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(customer)
    }

    async fn touch_customer_activity(&self, id: Uuid) -> ApiResult<()> {
        sqlx::query("UPDATE customers SET last_activity = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> ApiResult<ConversationRecord> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;
        Ok(row.into())
    }

    async fn find_open_conversation_for_customer(
        &self,
        customer_id: Uuid,
    ) -> ApiResult<Option<ConversationRecord>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE customer_id = $1 AND status IN ('open', 'in_progress') \
             ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn create_conversation(
        &self,
        customer_id: Uuid,
        priority: Priority,
        subject: Option<&str>,
    ) -> ApiResult<ConversationRecord> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "INSERT INTO conversations (customer_id, priority, subject) \
             VALUES ($1, $2, $3) RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(customer_id)
        .bind(priority.as_str())
        .bind(subject)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn create_message(&self, message: NewMessage) -> ApiResult<MessageRecord> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages (conversation_id, customer_id, agent_id, content, is_from_customer, priority) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message.conversation_id)
        .bind(message.customer_id)
        .bind(message.agent_id)
        .bind(&message.content)
        .bind(message.is_from_customer)
        .bind(message.priority.as_str())
        .fetch_one(&self.pool)
        .await?;

        // Any new message counts as conversation activity
        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(message.conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn update_conversation_owner_atomic(
        &self,
        id: Uuid,
        expected: Option<Uuid>,
        new: Option<Uuid>,
    ) -> ApiResult<bool> {
        // IS NOT DISTINCT FROM makes NULL (unowned) a comparable expectation,
        // so concurrent claims resolve to exactly one winner
        let result = sqlx::query(
            "UPDATE conversations SET agent_id = $3, updated_at = NOW() \
             WHERE id = $1 AND agent_id IS NOT DISTINCT FROM $2",
        )
        .bind(id)
        .bind(expected)
        .bind(new)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn raise_conversation_priority(&self, id: Uuid, floor: Priority) -> ApiResult<()> {
        // Monotonic: only rewrites when the stored rank is strictly lower
        sqlx::query(
            "UPDATE conversations SET priority = $2, updated_at = NOW() \
             WHERE id = $1 \
               AND CASE priority WHEN 'low' THEN 1 WHEN 'medium' THEN 2 WHEN 'high' THEN 3 ELSE 4 END \
                 < CASE $2 WHEN 'low' THEN 1 WHEN 'medium' THEN 2 WHEN 'high' THEN 3 ELSE 4 END",
        )
        .bind(id)
        .bind(floor.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_conversation_status(&self, id: Uuid, status: ConversationStatus) -> ApiResult<()> {
        sqlx::query("UPDATE conversations SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_conversation_fields(
        &self,
        id: Uuid,
        changes: ConversationChanges,
    ) -> ApiResult<ConversationRecord> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "UPDATE conversations SET \
                 status = COALESCE($2, status), \
                 priority = COALESCE($3, priority), \
                 subject = COALESCE($4, subject), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.status.map(|s| s.as_str()))
        .bind(changes.priority.map(|p| p.as_str()))
        .bind(changes.subject)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;
        Ok(row.into())
    }

    async fn mark_messages_read(&self, conversation_id: Uuid) -> ApiResult<u64> {
        let result = sqlx::query(
            "UPDATE messages SET read_at = NOW() \
             WHERE conversation_id = $1 AND is_from_customer AND read_at IS NULL",
        )
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // Requires a live database:
    //   DATABASE_URL=postgres://... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_owner_cas_single_winner() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = deskline_shared::db::create_pool(&url, 5).await.unwrap();
        deskline_shared::db::run_migrations(&pool).await.unwrap();

        let suffix = Uuid::new_v4().simple().to_string();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for (id, tag) in [(a, "a"), (b, "b")] {
            sqlx::query("INSERT INTO agents (id, name, email) VALUES ($1, $2, $3)")
                .bind(id)
                .bind(format!("CAS Agent {tag}"))
                .bind(format!("cas-agent-{tag}-{suffix}@example.com"))
                .execute(&pool)
                .await
                .unwrap();
        }

        let store = PgStore::new(pool);
        let customer = store
            .create_customer("CAS Test", &format!("cas-{suffix}@example.com"))
            .await
            .unwrap();
        let conversation = store
            .create_conversation(customer.id, Priority::Medium, Some("cas test"))
            .await
            .unwrap();
        assert!(conversation.agent_id.is_none());

        let first = store
            .update_conversation_owner_atomic(conversation.id, None, Some(a))
            .await
            .unwrap();
        let second = store
            .update_conversation_owner_atomic(conversation.id, None, Some(b))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        let reread = store.get_conversation(conversation.id).await.unwrap();
        assert_eq!(reread.agent_id, Some(a));
    }
}
