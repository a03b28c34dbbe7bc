//! Presence and viewing registry
//!
//! Tracks which agents are connected, which conversations each has open in
//! their UI, and answers "who is viewing conversation C" for typing-indicator
//! relay. Holds only ids, never conversation content.
//!
//! An agent's entry lives exactly as long as that agent has at least one
//! connection: when the last connection closes the entry is dropped, which
//! also clears the viewing set. A reconnecting client re-sends `viewing`
//! signals, so stale typing indicators cannot leak across reconnects.

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct PresenceEntry {
    /// Open connection handles for this agent
    handles: HashSet<Uuid>,
    /// Conversations currently open in this agent's UI
    viewing: HashSet<Uuid>,
}

/// Per-agent connection and viewing state
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: RwLock<HashMap<Uuid, PresenceEntry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection handle for an agent.
    ///
    /// Unknown agent ids are accepted as-is; identity is caller-supplied and
    /// not validated against the record store at this layer.
    pub async fn register_connection(&self, agent_id: Uuid, handle: Uuid) {
        let mut entries = self.entries.write().await;
        entries.entry(agent_id).or_default().handles.insert(handle);
    }

    /// Remove a connection handle. Idempotent: removing an absent handle is a
    /// no-op. Returns true when this was the agent's last connection.
    pub async fn unregister_connection(&self, agent_id: Uuid, handle: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&agent_id) else {
            return false;
        };
        entry.handles.remove(&handle);
        if entry.handles.is_empty() {
            entries.remove(&agent_id);
            return true;
        }
        false
    }

    /// Add a conversation to the agent's viewing set. No-op for offline agents.
    pub async fn set_viewing(&self, agent_id: Uuid, conversation_id: Uuid) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&agent_id) {
            entry.viewing.insert(conversation_id);
        }
    }

    /// Remove a conversation from the agent's viewing set. No-op if absent.
    pub async fn clear_viewing(&self, agent_id: Uuid, conversation_id: Uuid) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&agent_id) {
            entry.viewing.remove(&conversation_id);
        }
    }

    /// Agents whose viewing set currently contains the conversation
    pub async fn viewers_of(&self, conversation_id: Uuid) -> Vec<Uuid> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(_, entry)| entry.viewing.contains(&conversation_id))
            .map(|(agent_id, _)| *agent_id)
            .collect()
    }

    /// Whether the agent has at least one live connection
    pub async fn is_online(&self, agent_id: Uuid) -> bool {
        let entries = self.entries.read().await;
        entries.contains_key(&agent_id)
    }

    /// Number of distinct agents currently online
    pub async fn online_count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }
}
