//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client event types with
//! type-safe serde serialization. Every frame is a JSON object of the form
//! `{"type": "...", "data": {...}}`.

use deskline_shared::{ConversationStatus, Priority};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Control messages sent from an agent's client to the hub
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Heartbeat ping to keep the connection alive
    Ping {},

    /// Agent started or stopped typing in a conversation
    Typing {
        conversation_id: Uuid,
        #[serde(default)]
        is_typing: bool,
    },

    /// Agent opened a conversation in their UI
    Viewing { conversation_id: Uuid },

    /// Agent closed a conversation in their UI
    StopViewing { conversation_id: Uuid },
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events pushed from the hub to agent clients
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection acknowledged; always the first event a new channel observes
    Connected { agent_id: Uuid },

    /// Heartbeat response
    Pong {},

    /// Error message, delivered only to the offending sender
    Error { message: String },

    /// A brand-new conversation entered the queue
    NewConversation {
        id: Uuid,
        customer_id: Uuid,
        status: ConversationStatus,
        priority: Priority,
        subject: Option<String>,
        customer_name: String,
        customer_email: String,
    },

    /// New message added to an existing conversation
    NewMessage {
        id: Uuid,
        conversation_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        customer_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<Uuid>,
        content: String,
        is_from_customer: bool,
        priority: Priority,
        #[serde(with = "time::serde::rfc3339")]
        created_at: OffsetDateTime,
        #[serde(skip_serializing_if = "Option::is_none")]
        customer_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        customer_email: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
    },

    /// Conversation ownership/status/priority changed; carries the full
    /// current assignment state so consumers never have to merge deltas
    ConversationUpdated {
        id: Uuid,
        status: ConversationStatus,
        priority: Priority,
        agent_id: Option<Uuid>,
        agent_name: Option<String>,
    },

    /// Typing indicator relayed to the other current viewers of a conversation
    AgentTyping {
        conversation_id: Uuid,
        agent_id: Uuid,
        is_typing: bool,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_deserialization() {
        let json = r#"{"type":"viewing","data":{"conversation_id":"550e8400-e29b-41d4-a716-446655440000"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Viewing { conversation_id } => {
                assert_eq!(
                    conversation_id.to_string(),
                    "550e8400-e29b-41d4-a716-446655440000"
                );
            }
            _ => panic!("Expected Viewing event"),
        }
    }

    #[test]
    fn test_ping_with_empty_data() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"ping","data":{}}"#).unwrap();
        assert!(matches!(event, ClientEvent::Ping {}));
    }

    #[test]
    fn test_typing_defaults_to_false() {
        let json = r#"{"type":"typing","data":{"conversation_id":"550e8400-e29b-41d4-a716-446655440000"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Typing { is_typing, .. } => assert!(!is_typing),
            _ => panic!("Expected Typing event"),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected_by_parser() {
        // The handler treats this as "ignore", not as a protocol error
        let result = serde_json::from_str::<ClientEvent>(r#"{"type":"subscribe","data":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_pong_serialization() {
        let json = serde_json::to_string(&ServerEvent::Pong {}).unwrap();
        assert_eq!(json, r#"{"type":"pong","data":{}}"#);
    }

    #[test]
    fn test_error_event_serialization() {
        let event = ServerEvent::Error {
            message: "Invalid JSON format".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("Invalid JSON format"));
    }

    #[test]
    fn test_new_message_carries_customer_email() {
        let event = ServerEvent::NewMessage {
            id: Uuid::nil(),
            conversation_id: Uuid::nil(),
            customer_id: Some(Uuid::nil()),
            agent_id: None,
            content: "My card was declined".to_string(),
            is_from_customer: true,
            priority: Priority::High,
            created_at: OffsetDateTime::UNIX_EPOCH,
            customer_name: Some("Dana".to_string()),
            customer_email: Some("dana@example.com".to_string()),
            agent_name: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""customer_email":"dana@example.com""#));
        assert!(json.contains(r#""customer_name":"Dana""#));
    }

    #[test]
    fn test_agent_message_omits_customer_fields() {
        let event = ServerEvent::NewMessage {
            id: Uuid::nil(),
            conversation_id: Uuid::nil(),
            customer_id: None,
            agent_id: Some(Uuid::nil()),
            content: "Refund issued".to_string(),
            is_from_customer: false,
            priority: Priority::Medium,
            created_at: OffsetDateTime::UNIX_EPOCH,
            customer_name: None,
            customer_email: None,
            agent_name: Some("Sam".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("customer_email"));
        assert!(!json.contains("customer_name"));
        assert!(json.contains(r#""agent_name":"Sam""#));
    }

    #[test]
    fn test_conversation_updated_serialization() {
        let event = ServerEvent::ConversationUpdated {
            id: Uuid::nil(),
            status: ConversationStatus::InProgress,
            priority: Priority::Urgent,
            agent_id: None,
            agent_name: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"conversation_updated""#));
        assert!(json.contains(r#""status":"in_progress""#));
        assert!(json.contains(r#""agent_id":null"#));
    }
}
