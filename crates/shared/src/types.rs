//! Common types used across Deskline

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Error returned when parsing a stored enum value fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown enum value: {0}")]
pub struct ParseEnumError(pub String);

/// Conversation/message urgency.
///
/// The ordering is total and load-bearing: `Low < Medium < High < Urgent`.
/// Escalation on new customer messages takes `max(current, classified)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation lifecycle state.
///
/// `Open` is the initial state, `Closed` is terminal. A customer message on a
/// resolved or closed conversation starts a fresh conversation rather than
/// reopening the old thread.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Open => "open",
            ConversationStatus::InProgress => "in_progress",
            ConversationStatus::Resolved => "resolved",
            ConversationStatus::Closed => "closed",
        }
    }

    /// Whether new customer messages attach to this conversation.
    pub fn is_active(&self) -> bool {
        matches!(self, ConversationStatus::Open | ConversationStatus::InProgress)
    }
}

impl FromStr for ConversationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ConversationStatus::Open),
            "in_progress" => Ok(ConversationStatus::InProgress),
            "resolved" => Ok(ConversationStatus::Resolved),
            "closed" => Ok(ConversationStatus::Closed),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Persisted records
// =============================================================================

/// A customer account
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CustomerRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub account_status: String,
    pub loan_status: Option<String>,
    pub loan_amount: Option<f64>,
    pub profile_notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub account_created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

/// A support agent
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AgentRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub is_online: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A conversation thread between one customer and at most one owning agent.
///
/// `agent_id = None` means the conversation is unowned and any agent may
/// claim it. Ownership is single-owner at every instant.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub status: ConversationStatus,
    pub priority: Priority,
    pub subject: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A single message within a conversation
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub content: String,
    pub is_from_customer: bool,
    pub priority: Priority,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
}

/// A reusable canned reply agents can insert into conversations
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CannedReplyRecord {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub shortcut: Option<String>,
    pub usage_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering_is_total() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Urgent);
        assert_eq!(Priority::Urgent.max(Priority::Low), Priority::Urgent);
    }

    #[test]
    fn test_priority_round_trip() {
        for p in [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent] {
            assert_eq!(p.as_str().parse::<Priority>().unwrap(), p);
        }
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            ConversationStatus::Open,
            ConversationStatus::InProgress,
            ConversationStatus::Resolved,
            ConversationStatus::Closed,
        ] {
            assert_eq!(s.as_str().parse::<ConversationStatus>().unwrap(), s);
        }
    }

    #[test]
    fn test_active_statuses() {
        assert!(ConversationStatus::Open.is_active());
        assert!(ConversationStatus::InProgress.is_active());
        assert!(!ConversationStatus::Resolved.is_active());
        assert!(!ConversationStatus::Closed.is_active());
    }

    #[test]
    fn test_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&ConversationStatus::InProgress).unwrap(),
            r#""in_progress""#
        );
        assert_eq!(serde_json::to_string(&Priority::Urgent).unwrap(), r#""urgent""#);
    }
}
