//! Conversation routing and ownership
//!
//! Single write path for conversation state: inbound customer messages,
//! agent replies, claim/release, and field updates all flow through
//! [`ConversationService`], which persists through a [`RecordStore`] and
//! pushes the resulting events through the connection hub.
//!
//! Ownership is single-owner at every instant. All transfers go through a
//! compare-and-set on the stored owner, so two agents racing for the same
//! conversation resolve to exactly one winner without locks held across
//! requests.

use std::sync::Arc;

use deskline_shared::{ConversationRecord, ConversationStatus, MessageRecord, Priority};
use serde::Serialize;
use uuid::Uuid;

use crate::classifier;
use crate::error::{ApiError, ApiResult};
use crate::store::{ConversationChanges, NewMessage, RecordStore};
use crate::websocket::{ConnectionHub, ServerEvent};

/// Longest subject line derived from a first message
const SUBJECT_MAX_CHARS: usize = 100;

/// An inbound customer message from an external channel
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub customer_id: Option<Uuid>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub content: String,
}

/// What the external channel gets back after submitting a message
#[derive(Debug, Clone, Serialize)]
pub struct InboundReceipt {
    pub success: bool,
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub customer_id: Uuid,
    pub priority: Priority,
    pub priority_confidence: f64,
}

/// Result of a claim operation
#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub conversation_id: Uuid,
    pub agent_id: Uuid,
    pub agent_name: String,
    /// True when the conversation was taken over from another agent
    pub reassigned: bool,
}

/// Coordinates persistence and live event fan-out for conversations
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn RecordStore>,
    hub: ConnectionHub,
}

impl ConversationService {
    pub fn new(store: Arc<dyn RecordStore>, hub: ConnectionHub) -> Self {
        Self { store, hub }
    }

    /// Ingest a customer message from an external channel.
    ///
    /// Resolves or creates the customer, classifies urgency, attaches the
    /// message to the customer's open conversation (creating one if none is
    /// active), and escalates conversation priority monotonically.
    pub async fn submit_customer_message(
        &self,
        inbound: InboundMessage,
    ) -> ApiResult<InboundReceipt> {
        let content = inbound.content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("Message content is required".to_string()));
        }

        let customer = self.resolve_customer(&inbound).await?;
        let classification = classifier::classify(content);

        let (conversation, created) = match self
            .store
            .find_open_conversation_for_customer(customer.id)
            .await?
        {
            Some(existing) => {
                if classification.priority > existing.priority {
                    self.store
                        .raise_conversation_priority(existing.id, classification.priority)
                        .await?;
                }
                (existing, false)
            }
            None => {
                let subject: String = content.chars().take(SUBJECT_MAX_CHARS).collect();
                let conversation = self
                    .store
                    .create_conversation(customer.id, classification.priority, Some(&subject))
                    .await?;
                (conversation, true)
            }
        };

        let message = self
            .store
            .create_message(NewMessage {
                conversation_id: conversation.id,
                customer_id: Some(customer.id),
                agent_id: None,
                content: content.to_string(),
                is_from_customer: true,
                priority: classification.priority,
            })
            .await?;

        self.store.touch_customer_activity(customer.id).await?;

        let effective_priority = conversation.priority.max(classification.priority);

        tracing::info!(
            conversation_id = %conversation.id,
            customer_id = %customer.id,
            priority = %classification.priority,
            confidence = classification.confidence,
            created = created,
            "Customer message routed"
        );

        if created {
            self.hub
                .broadcast_all(ServerEvent::NewConversation {
                    id: conversation.id,
                    customer_id: customer.id,
                    status: conversation.status,
                    priority: effective_priority,
                    subject: conversation.subject.clone(),
                    customer_name: customer.name.clone(),
                    customer_email: customer.email.clone(),
                })
                .await;
        }

        self.hub
            .broadcast_all(ServerEvent::NewMessage {
                id: message.id,
                conversation_id: message.conversation_id,
                customer_id: message.customer_id,
                agent_id: None,
                content: message.content.clone(),
                is_from_customer: true,
                priority: message.priority,
                created_at: message.created_at,
                customer_name: Some(customer.name.clone()),
                customer_email: Some(customer.email.clone()),
                agent_name: None,
            })
            .await;

        if !created && classification.priority > conversation.priority {
            self.broadcast_conversation_updated(conversation.id).await;
        }

        Ok(InboundReceipt {
            success: true,
            message_id: message.id,
            conversation_id: conversation.id,
            customer_id: customer.id,
            priority: effective_priority,
            priority_confidence: classification.confidence,
        })
    }

    /// Persist an agent reply.
    ///
    /// Replying to an unowned conversation claims it for the sender (first
    /// responder wins); replying to a conversation owned by someone else is
    /// rejected. The first reply also moves an open conversation to
    /// in_progress.
    pub async fn submit_agent_message(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
        content: &str,
    ) -> ApiResult<MessageRecord> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("Message content is required".to_string()));
        }

        let agent = self.store.get_agent(agent_id).await?;
        let conversation = self.store.get_conversation(conversation_id).await?;

        let mut ownership_changed = false;
        match conversation.agent_id {
            Some(owner) if owner == agent_id => {}
            Some(owner) => {
                let owner_name = self.owner_name(Some(owner)).await;
                return Err(ApiError::Forbidden(format!(
                    "Conversation is assigned to {}",
                    owner_name.unwrap_or_else(|| "another agent".to_string())
                )));
            }
            None => {
                let won = self
                    .store
                    .update_conversation_owner_atomic(conversation_id, None, Some(agent_id))
                    .await?;
                if won {
                    ownership_changed = true;
                } else {
                    // Lost the first-responder race; report who got there first
                    let current = self.store.get_conversation(conversation_id).await?;
                    if current.agent_id != Some(agent_id) {
                        let owner_name = self.owner_name(current.agent_id).await;
                        return Err(ApiError::Conflict(format!(
                            "Conversation was just claimed by {}",
                            owner_name.unwrap_or_else(|| "another agent".to_string())
                        )));
                    }
                }
            }
        }

        let mut status_changed = false;
        if conversation.status == ConversationStatus::Open {
            self.store
                .set_conversation_status(conversation_id, ConversationStatus::InProgress)
                .await?;
            status_changed = true;
        }

        let message = self
            .store
            .create_message(NewMessage {
                conversation_id,
                customer_id: None,
                agent_id: Some(agent_id),
                content: content.to_string(),
                is_from_customer: false,
                priority: conversation.priority,
            })
            .await?;

        self.hub
            .broadcast_all(ServerEvent::NewMessage {
                id: message.id,
                conversation_id: message.conversation_id,
                customer_id: None,
                agent_id: Some(agent_id),
                content: message.content.clone(),
                is_from_customer: false,
                priority: message.priority,
                created_at: message.created_at,
                customer_name: None,
                customer_email: None,
                agent_name: Some(agent.name.clone()),
            })
            .await;

        if ownership_changed || status_changed {
            self.broadcast_conversation_updated(conversation_id).await;
        }

        Ok(message)
    }

    /// Explicitly assign a conversation to an agent.
    ///
    /// Claiming a conversation already owned by the caller is an idempotent
    /// no-op. Claiming one owned by someone else requires `force`.
    pub async fn claim(
        &self,
        conversation_id: Uuid,
        agent_id: Uuid,
        force: bool,
    ) -> ApiResult<ClaimOutcome> {
        let agent = self.store.get_agent(agent_id).await?;
        let conversation = self.store.get_conversation(conversation_id).await?;

        let reassigned = match conversation.agent_id {
            Some(owner) if owner == agent_id => {
                // Already ours; nothing changed, nothing to announce
                return Ok(ClaimOutcome {
                    conversation_id,
                    agent_id,
                    agent_name: agent.name,
                    reassigned: false,
                });
            }
            Some(owner) => {
                if !force {
                    let owner_name = self.owner_name(Some(owner)).await;
                    return Err(ApiError::Conflict(format!(
                        "Conversation is already assigned to {}. Use force=true to reassign.",
                        owner_name.unwrap_or_else(|| "another agent".to_string())
                    )));
                }
                let won = self
                    .store
                    .update_conversation_owner_atomic(
                        conversation_id,
                        Some(owner),
                        Some(agent_id),
                    )
                    .await?;
                if !won {
                    return Err(self.claim_race_error(conversation_id).await);
                }
                true
            }
            None => {
                let won = self
                    .store
                    .update_conversation_owner_atomic(conversation_id, None, Some(agent_id))
                    .await?;
                if !won {
                    return Err(self.claim_race_error(conversation_id).await);
                }
                false
            }
        };

        tracing::info!(
            conversation_id = %conversation_id,
            agent_id = %agent_id,
            reassigned = reassigned,
            "Conversation claimed"
        );
        self.broadcast_conversation_updated(conversation_id).await;

        Ok(ClaimOutcome {
            conversation_id,
            agent_id,
            agent_name: agent.name,
            reassigned,
        })
    }

    /// Release a conversation back to the unowned pool.
    ///
    /// Only the current owner may release; the conversation status is left
    /// untouched.
    pub async fn release(&self, conversation_id: Uuid, agent_id: Uuid) -> ApiResult<()> {
        self.store.get_agent(agent_id).await?;
        let conversation = self.store.get_conversation(conversation_id).await?;

        if conversation.agent_id != Some(agent_id) {
            return Err(ApiError::Forbidden(
                "You can only release conversations assigned to you".to_string(),
            ));
        }

        let released = self
            .store
            .update_conversation_owner_atomic(conversation_id, Some(agent_id), None)
            .await?;
        if !released {
            // Ownership moved between the read and the CAS
            return Err(ApiError::Forbidden(
                "You can only release conversations assigned to you".to_string(),
            ));
        }

        tracing::info!(conversation_id = %conversation_id, agent_id = %agent_id, "Conversation released");
        self.broadcast_conversation_updated(conversation_id).await;
        Ok(())
    }

    /// Mark all unread customer messages in a conversation as read
    pub async fn mark_read(&self, conversation_id: Uuid) -> ApiResult<u64> {
        self.store.get_conversation(conversation_id).await?;
        self.store.mark_messages_read(conversation_id).await
    }

    /// Update conversation fields (status, priority, subject).
    ///
    /// Ownership cannot be changed this way; claim and release are the only
    /// assignment paths.
    pub async fn update_conversation(
        &self,
        conversation_id: Uuid,
        changes: ConversationChanges,
    ) -> ApiResult<ConversationRecord> {
        let updated = self
            .store
            .update_conversation_fields(conversation_id, changes)
            .await?;
        self.broadcast_conversation_updated(conversation_id).await;
        Ok(updated)
    }

    async fn resolve_customer(
        &self,
        inbound: &InboundMessage,
    ) -> ApiResult<deskline_shared::CustomerRecord> {
        if let Some(id) = inbound.customer_id {
            return self.store.get_customer(id).await;
        }

        let Some(email) = inbound.customer_email.as_deref() else {
            return Err(ApiError::BadRequest(
                "customer_id or customer_email is required".to_string(),
            ));
        };

        if let Some(existing) = self.store.find_customer_by_email(email).await? {
            return Ok(existing);
        }

        let name = match inbound.customer_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => email.split('@').next().unwrap_or(email).to_string(),
        };
        self.store.create_customer(&name, email).await
    }

    async fn owner_name(&self, owner: Option<Uuid>) -> Option<String> {
        let owner = owner?;
        self.store.get_agent(owner).await.ok().map(|agent| agent.name)
    }

    /// The CAS lost to a concurrent ownership change; re-read to report what
    /// actually happened. A lost force-claim may find the conversation
    /// released rather than claimed.
    async fn claim_race_error(&self, conversation_id: Uuid) -> ApiError {
        match self.store.get_conversation(conversation_id).await {
            Ok(current) => match current.agent_id {
                Some(owner) => {
                    let owner_name = self.owner_name(Some(owner)).await;
                    ApiError::Conflict(format!(
                        "Conversation was just claimed by {}",
                        owner_name.unwrap_or_else(|| "another agent".to_string())
                    ))
                }
                None => ApiError::Conflict(
                    "Conversation was just released; retry the claim".to_string(),
                ),
            },
            Err(_) => ApiError::Conflict("Conversation ownership just changed".to_string()),
        }
    }

    /// Push the conversation's full current assignment state to all agents
    async fn broadcast_conversation_updated(&self, conversation_id: Uuid) {
        let conversation = match self.store.get_conversation(conversation_id).await {
            Ok(conversation) => conversation,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = ?e,
                    "Skipping conversation_updated broadcast"
                );
                return;
            }
        };
        let agent_name = self.owner_name(conversation.agent_id).await;

        self.hub
            .broadcast_all(ServerEvent::ConversationUpdated {
                id: conversation.id,
                status: conversation.status,
                priority: conversation.priority,
                agent_id: conversation.agent_id,
                agent_name,
            })
            .await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deskline_shared::{AgentRecord, CustomerRecord};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use time::OffsetDateTime;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MemoryState {
        agents: HashMap<Uuid, AgentRecord>,
        customers: HashMap<Uuid, CustomerRecord>,
        conversations: HashMap<Uuid, ConversationRecord>,
        messages: Vec<MessageRecord>,
        /// When set, the next owner compare-and-set observes a concurrent
        /// release landing first and loses
        release_before_next_cas: bool,
    }

    /// In-memory store double; the Mutex mirrors the single-row atomicity
    /// Postgres provides for the owner compare-and-set
    #[derive(Default)]
    struct MemoryStore {
        state: Mutex<MemoryState>,
    }

    impl MemoryStore {
        fn add_agent(&self, name: &str) -> Uuid {
            let id = Uuid::new_v4();
            let mut state = self.state.lock().unwrap();
            state.agents.insert(
                id,
                AgentRecord {
                    id,
                    name: name.to_string(),
                    email: format!("{}@deskline.test", name.to_lowercase()),
                    avatar_url: None,
                    is_online: true,
                    created_at: OffsetDateTime::now_utc(),
                },
            );
            id
        }

        fn conversation(&self, id: Uuid) -> ConversationRecord {
            self.state
                .lock()
                .unwrap()
                .conversations
                .get(&id)
                .cloned()
                .unwrap()
        }

        fn message_count(&self) -> usize {
            self.state.lock().unwrap().messages.len()
        }

        fn release_on_next_owner_cas(&self) {
            self.state.lock().unwrap().release_before_next_cas = true;
        }
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn get_agent(&self, id: Uuid) -> ApiResult<AgentRecord> {
            self.state
                .lock()
                .unwrap()
                .agents
                .get(&id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound("Agent not found".to_string()))
        }

        async fn get_customer(&self, id: Uuid) -> ApiResult<CustomerRecord> {
            self.state
                .lock()
                .unwrap()
                .customers
                .get(&id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound("Customer not found".to_string()))
        }

        async fn find_customer_by_email(&self, email: &str) -> ApiResult<Option<CustomerRecord>> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .customers
                .values()
                .find(|c| c.email == email)
                .cloned())
        }

        async fn create_customer(&self, name: &str, email: &str) -> ApiResult<CustomerRecord> {
            let now = OffsetDateTime::now_utc();
            let customer = CustomerRecord {
                id: Uuid::new_v4(),
                name: name.to_string(),
                email: email.to_string(),
                phone: None,
                account_status: "active".to_string(),
                loan_status: None,
                loan_amount: None,
                profile_notes: None,
                account_created: now,
                last_activity: now,
            };
            self.state
                .lock()
                .unwrap()
                .customers
                .insert(customer.id, customer.clone());
            Ok(customer)
        }

        async fn touch_customer_activity(&self, id: Uuid) -> ApiResult<()> {
            if let Some(customer) = self.state.lock().unwrap().customers.get_mut(&id) {
                customer.last_activity = OffsetDateTime::now_utc();
            }
            Ok(())
        }

        async fn get_conversation(&self, id: Uuid) -> ApiResult<ConversationRecord> {
            self.state
                .lock()
                .unwrap()
                .conversations
                .get(&id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))
        }

        async fn find_open_conversation_for_customer(
            &self,
            customer_id: Uuid,
        ) -> ApiResult<Option<ConversationRecord>> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .conversations
                .values()
                .filter(|c| c.customer_id == customer_id && c.status.is_active())
                .max_by_key(|c| c.updated_at)
                .cloned())
        }

        async fn create_conversation(
            &self,
            customer_id: Uuid,
            priority: Priority,
            subject: Option<&str>,
        ) -> ApiResult<ConversationRecord> {
            let now = OffsetDateTime::now_utc();
            let conversation = ConversationRecord {
                id: Uuid::new_v4(),
                customer_id,
                agent_id: None,
                status: ConversationStatus::Open,
                priority,
                subject: subject.map(str::to_string),
                created_at: now,
                updated_at: now,
            };
            self.state
                .lock()
                .unwrap()
                .conversations
                .insert(conversation.id, conversation.clone());
            Ok(conversation)
        }

        async fn create_message(&self, message: NewMessage) -> ApiResult<MessageRecord> {
            let record = MessageRecord {
                id: Uuid::new_v4(),
                conversation_id: message.conversation_id,
                customer_id: message.customer_id,
                agent_id: message.agent_id,
                content: message.content,
                is_from_customer: message.is_from_customer,
                priority: message.priority,
                created_at: OffsetDateTime::now_utc(),
                read_at: None,
            };
            let mut state = self.state.lock().unwrap();
            if let Some(conversation) = state.conversations.get_mut(&record.conversation_id) {
                conversation.updated_at = record.created_at;
            }
            state.messages.push(record.clone());
            Ok(record)
        }

        async fn update_conversation_owner_atomic(
            &self,
            id: Uuid,
            expected: Option<Uuid>,
            new: Option<Uuid>,
        ) -> ApiResult<bool> {
            let mut state = self.state.lock().unwrap();
            let squeeze_in_release = std::mem::take(&mut state.release_before_next_cas);
            let Some(conversation) = state.conversations.get_mut(&id) else {
                return Ok(false);
            };
            if squeeze_in_release && expected.is_some() {
                conversation.agent_id = None;
                return Ok(false);
            }
            if conversation.agent_id != expected {
                return Ok(false);
            }
            conversation.agent_id = new;
            conversation.updated_at = OffsetDateTime::now_utc();
            Ok(true)
        }

        async fn raise_conversation_priority(&self, id: Uuid, floor: Priority) -> ApiResult<()> {
            let mut state = self.state.lock().unwrap();
            if let Some(conversation) = state.conversations.get_mut(&id) {
                if conversation.priority < floor {
                    conversation.priority = floor;
                    conversation.updated_at = OffsetDateTime::now_utc();
                }
            }
            Ok(())
        }

        async fn set_conversation_status(
            &self,
            id: Uuid,
            status: ConversationStatus,
        ) -> ApiResult<()> {
            let mut state = self.state.lock().unwrap();
            if let Some(conversation) = state.conversations.get_mut(&id) {
                conversation.status = status;
                conversation.updated_at = OffsetDateTime::now_utc();
            }
            Ok(())
        }

        async fn update_conversation_fields(
            &self,
            id: Uuid,
            changes: ConversationChanges,
        ) -> ApiResult<ConversationRecord> {
            let mut state = self.state.lock().unwrap();
            let conversation = state
                .conversations
                .get_mut(&id)
                .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;
            if let Some(status) = changes.status {
                conversation.status = status;
            }
            if let Some(priority) = changes.priority {
                conversation.priority = priority;
            }
            if let Some(subject) = changes.subject {
                conversation.subject = Some(subject);
            }
            conversation.updated_at = OffsetDateTime::now_utc();
            Ok(conversation.clone())
        }

        async fn mark_messages_read(&self, conversation_id: Uuid) -> ApiResult<u64> {
            let mut state = self.state.lock().unwrap();
            let mut marked = 0;
            for message in state
                .messages
                .iter_mut()
                .filter(|m| m.conversation_id == conversation_id)
            {
                if message.is_from_customer && message.read_at.is_none() {
                    message.read_at = Some(OffsetDateTime::now_utc());
                    marked += 1;
                }
            }
            Ok(marked)
        }
    }

    fn service() -> (Arc<MemoryStore>, ConversationService, ConnectionHub) {
        let store = Arc::new(MemoryStore::default());
        let hub = ConnectionHub::new();
        let service = ConversationService::new(store.clone(), hub.clone());
        (store, service, hub)
    }

    async fn observer(hub: &ConnectionHub) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.connect(Uuid::new_v4(), tx).await;
        rx.recv().await.unwrap(); // connected ack
        rx
    }

    fn inbound(email: &str, content: &str) -> InboundMessage {
        InboundMessage {
            customer_id: None,
            customer_email: Some(email.to_string()),
            customer_name: None,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_urgent_message_creates_conversation_and_broadcasts() {
        let (store, service, hub) = service();
        let mut rx = observer(&hub).await;

        let receipt = service
            .submit_customer_message(inbound(
                "maria@example.com",
                "This is an emergency, my account was hacked!",
            ))
            .await
            .unwrap();

        assert!(receipt.success);
        assert_eq!(receipt.priority, Priority::Urgent);
        assert!(receipt.priority_confidence > 0.5);

        let conversation = store.conversation(receipt.conversation_id);
        assert_eq!(conversation.status, ConversationStatus::Open);
        assert_eq!(conversation.priority, Priority::Urgent);
        assert!(conversation.agent_id.is_none());

        match rx.try_recv().unwrap() {
            ServerEvent::NewConversation {
                id,
                priority,
                customer_email,
                ..
            } => {
                assert_eq!(id, receipt.conversation_id);
                assert_eq!(priority, Priority::Urgent);
                assert_eq!(customer_email, "maria@example.com");
                // unknown sender gets a name derived from the email
            }
            other => panic!("expected NewConversation, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            ServerEvent::NewMessage {
                is_from_customer,
                customer_email,
                ..
            } => {
                assert!(is_from_customer);
                assert_eq!(customer_email.as_deref(), Some("maria@example.com"));
            }
            other => panic!("expected NewMessage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_followup_attaches_to_open_conversation() {
        let (store, service, _hub) = service();

        let first = service
            .submit_customer_message(inbound("sam@example.com", "I have a question about my bill"))
            .await
            .unwrap();
        let second = service
            .submit_customer_message(inbound("sam@example.com", "Also, when is it due?"))
            .await
            .unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(first.customer_id, second.customer_id);
        assert_eq!(store.message_count(), 2);
    }

    #[tokio::test]
    async fn test_priority_escalates_but_never_drops() {
        let (store, service, _hub) = service();

        let first = service
            .submit_customer_message(inbound("kim@example.com", "I have a problem with my card"))
            .await
            .unwrap();
        assert_eq!(first.priority, Priority::Medium);

        let urgent = service
            .submit_customer_message(inbound("kim@example.com", "This is urgent, fix it now!"))
            .await
            .unwrap();
        assert_eq!(urgent.priority, Priority::Urgent);
        assert_eq!(
            store.conversation(first.conversation_id).priority,
            Priority::Urgent
        );

        // a calm follow-up does not lower it
        let calm = service
            .submit_customer_message(inbound("kim@example.com", "Thanks, talk soon."))
            .await
            .unwrap();
        assert_eq!(calm.priority, Priority::Urgent);
        assert_eq!(
            store.conversation(first.conversation_id).priority,
            Priority::Urgent
        );
    }

    #[tokio::test]
    async fn test_resolved_conversation_starts_fresh_thread() {
        let (store, service, _hub) = service();

        let first = service
            .submit_customer_message(inbound("lee@example.com", "My login is broken"))
            .await
            .unwrap();
        service
            .update_conversation(
                first.conversation_id,
                ConversationChanges {
                    status: Some(ConversationStatus::Resolved),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let second = service
            .submit_customer_message(inbound("lee@example.com", "It broke again"))
            .await
            .unwrap();
        assert_ne!(first.conversation_id, second.conversation_id);
        assert_eq!(
            store.conversation(first.conversation_id).status,
            ConversationStatus::Resolved
        );
    }

    #[tokio::test]
    async fn test_empty_content_is_rejected() {
        let (_store, service, _hub) = service();
        let err = service
            .submit_customer_message(inbound("x@example.com", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_customer_identity_is_rejected() {
        let (_store, service, _hub) = service();
        let err = service
            .submit_customer_message(InboundMessage {
                customer_id: None,
                customer_email: None,
                customer_name: None,
                content: "hello".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_first_reply_claims_and_moves_in_progress() {
        let (store, service, _hub) = service();
        let agent_a = store.add_agent("Alice");
        let agent_b = store.add_agent("Bob");

        let receipt = service
            .submit_customer_message(inbound("pat@example.com", "Need help with my loan"))
            .await
            .unwrap();

        service
            .submit_agent_message(receipt.conversation_id, agent_a, "On it!")
            .await
            .unwrap();

        let conversation = store.conversation(receipt.conversation_id);
        assert_eq!(conversation.agent_id, Some(agent_a));
        assert_eq!(conversation.status, ConversationStatus::InProgress);

        // second agent is locked out
        let err = service
            .submit_agent_message(receipt.conversation_id, agent_b, "Me too!")
            .await
            .unwrap_err();
        match err {
            ApiError::Forbidden(msg) => assert!(msg.contains("Alice")),
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_claim_conflict_names_owner_and_force_reassigns() {
        let (store, service, _hub) = service();
        let agent_a = store.add_agent("Alice");
        let agent_b = store.add_agent("Bob");

        let receipt = service
            .submit_customer_message(inbound("jo@example.com", "hello there"))
            .await
            .unwrap();
        let conversation_id = receipt.conversation_id;

        let outcome = service.claim(conversation_id, agent_a, false).await.unwrap();
        assert!(!outcome.reassigned);
        assert_eq!(outcome.agent_name, "Alice");

        // repeat claim by the owner is a quiet no-op
        let again = service.claim(conversation_id, agent_a, false).await.unwrap();
        assert!(!again.reassigned);

        let err = service.claim(conversation_id, agent_b, false).await.unwrap_err();
        match err {
            ApiError::Conflict(msg) => {
                assert!(msg.contains("Alice"));
                assert!(msg.contains("force=true"));
            }
            other => panic!("expected Conflict, got {other:?}"),
        }

        let taken = service.claim(conversation_id, agent_b, true).await.unwrap();
        assert!(taken.reassigned);
        assert_eq!(store.conversation(conversation_id).agent_id, Some(agent_b));
    }

    #[tokio::test]
    async fn test_force_claim_losing_to_release_reports_release() {
        let (store, service, _hub) = service();
        let agent_a = store.add_agent("Alice");
        let agent_b = store.add_agent("Bob");

        let receipt = service
            .submit_customer_message(inbound("gil@example.com", "hold this"))
            .await
            .unwrap();
        let conversation_id = receipt.conversation_id;
        service.claim(conversation_id, agent_a, false).await.unwrap();

        // Alice releases between Bob's read and his force CAS
        store.release_on_next_owner_cas();
        let err = service.claim(conversation_id, agent_b, true).await.unwrap_err();
        match err {
            ApiError::Conflict(msg) => {
                assert!(msg.contains("released"));
                assert!(!msg.contains("Alice"));
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert!(store.conversation(conversation_id).agent_id.is_none());
    }

    #[tokio::test]
    async fn test_release_is_owner_only_and_keeps_status() {
        let (store, service, _hub) = service();
        let agent_a = store.add_agent("Alice");
        let agent_b = store.add_agent("Bob");

        let receipt = service
            .submit_customer_message(inbound("dana@example.com", "help me out"))
            .await
            .unwrap();
        let conversation_id = receipt.conversation_id;

        service
            .submit_agent_message(conversation_id, agent_a, "Looking into it")
            .await
            .unwrap();

        let err = service.release(conversation_id, agent_b).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        service.release(conversation_id, agent_a).await.unwrap();
        let conversation = store.conversation(conversation_id);
        assert!(conversation.agent_id.is_none());
        // release does not reopen or resolve anything
        assert_eq!(conversation.status, ConversationStatus::InProgress);
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let (store, service, _hub) = service();
        let agent_a = store.add_agent("Alice");
        let agent_b = store.add_agent("Bob");

        let receipt = service
            .submit_customer_message(inbound("rae@example.com", "race me"))
            .await
            .unwrap();
        let conversation_id = receipt.conversation_id;

        let (a, b) = tokio::join!(
            service.claim(conversation_id, agent_a, false),
            service.claim(conversation_id, agent_b, false),
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let owner = store.conversation(conversation_id).agent_id.unwrap();
        assert!(owner == agent_a || owner == agent_b);
    }

    #[tokio::test]
    async fn test_mark_read_counts_only_unread_customer_messages() {
        let (store, service, _hub) = service();
        let agent = store.add_agent("Alice");

        let receipt = service
            .submit_customer_message(inbound("ed@example.com", "first"))
            .await
            .unwrap();
        service
            .submit_customer_message(inbound("ed@example.com", "second"))
            .await
            .unwrap();
        service
            .submit_agent_message(receipt.conversation_id, agent, "reply")
            .await
            .unwrap();

        assert_eq!(service.mark_read(receipt.conversation_id).await.unwrap(), 2);
        assert_eq!(service.mark_read(receipt.conversation_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_broadcasts_full_assignment_state() {
        let (store, service, hub) = service();
        let agent = store.add_agent("Alice");

        let receipt = service
            .submit_customer_message(inbound("vi@example.com", "hi"))
            .await
            .unwrap();
        service.claim(receipt.conversation_id, agent, false).await.unwrap();

        let mut rx = observer(&hub).await;
        service
            .update_conversation(
                receipt.conversation_id,
                ConversationChanges {
                    priority: Some(Priority::High),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            ServerEvent::ConversationUpdated {
                id,
                priority,
                agent_id,
                agent_name,
                ..
            } => {
                assert_eq!(id, receipt.conversation_id);
                assert_eq!(priority, Priority::High);
                assert_eq!(agent_id, Some(agent));
                assert_eq!(agent_name.as_deref(), Some("Alice"));
            }
            other => panic!("expected ConversationUpdated, got {other:?}"),
        }
    }
}
