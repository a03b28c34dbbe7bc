//! WebSocket connection management
//!
//! Represents one live agent transport channel. An agent may hold several
//! connections at once (multiple tabs); each gets its own handle.

use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::ServerEvent;

/// An open agent transport channel
#[derive(Debug)]
pub struct AgentConnection {
    /// Unique handle for this connection
    pub handle: Uuid,

    /// Agent this channel belongs to (caller-supplied identity)
    pub agent_id: Uuid,

    /// Channel used to push events to this connection's socket task.
    /// Unbounded so producers never block; per-channel FIFO is what gives
    /// the per-recipient delivery-order guarantee.
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl AgentConnection {
    /// Create a new connection with a fresh handle
    pub fn new(agent_id: Uuid, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            handle: Uuid::new_v4(),
            agent_id,
            sender,
        }
    }

    /// Queue an event for delivery to this connection
    ///
    /// Returns Err only when the socket task has gone away; the caller treats
    /// that as a dead channel and prunes it.
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = AgentConnection::new(Uuid::new_v4(), tx);

        conn.send(ServerEvent::Pong {}).unwrap();
        assert!(matches!(rx.recv().await, Some(ServerEvent::Pong {})));
    }

    #[tokio::test]
    async fn test_send_to_closed_channel_errors() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = AgentConnection::new(Uuid::new_v4(), tx);
        drop(rx);

        assert!(conn.send(ServerEvent::Pong {}).is_err());
    }

    #[test]
    fn test_handles_are_unique_per_connection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let agent_id = Uuid::new_v4();
        let a = AgentConnection::new(agent_id, tx.clone());
        let b = AgentConnection::new(agent_id, tx);
        assert_ne!(a.handle, b.handle);
    }
}
