//! Connection hub for event fan-out
//!
//! Owns the set of live per-agent channels and exposes the broadcast and
//! targeted-send primitives the rest of the system uses to push events.
//! Constructed once at startup and handed to every component that emits
//! events; there is no ambient global instance.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::connection::AgentConnection;
use super::events::ServerEvent;
use super::presence::PresenceRegistry;

/// Live-channel registry plus the presence registry used to resolve recipients
#[derive(Clone, Default)]
pub struct ConnectionHub {
    /// All active connections indexed by connection handle
    connections: Arc<RwLock<HashMap<Uuid, Arc<AgentConnection>>>>,

    /// Presence and viewing state
    presence: Arc<PresenceRegistry>,
}

/// Snapshot of hub occupancy for health reporting
#[derive(Debug, Clone, serde::Serialize)]
pub struct HubStats {
    pub active_connections: usize,
    pub online_agents: usize,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Register a new channel for an agent.
    ///
    /// The `connected` ack is queued on the channel before the connection is
    /// inserted into the registry. Broadcasts only see registered
    /// connections, so per-channel FIFO guarantees the ack is the first event
    /// this channel ever observes.
    pub async fn connect(
        &self,
        agent_id: Uuid,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Arc<AgentConnection> {
        let conn = Arc::new(AgentConnection::new(agent_id, sender));
        let _ = conn.send(ServerEvent::Connected { agent_id });

        let total = {
            let mut connections = self.connections.write().await;
            connections.insert(conn.handle, Arc::clone(&conn));
            connections.len()
        };
        self.presence.register_connection(agent_id, conn.handle).await;

        tracing::info!(
            agent_id = %agent_id,
            handle = %conn.handle,
            total_connections = total,
            "Agent connection added"
        );

        conn
    }

    /// Tear down a channel and unregister presence.
    ///
    /// Always succeeds; disconnecting a handle that was never registered is a
    /// no-op. Returns true when this was the agent's last connection.
    pub async fn disconnect(&self, agent_id: Uuid, handle: Uuid) -> bool {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(&handle)
        };
        let went_offline = self.presence.unregister_connection(agent_id, handle).await;

        if removed.is_some() {
            tracing::info!(
                agent_id = %agent_id,
                handle = %handle,
                went_offline = went_offline,
                "Agent connection removed"
            );
        }

        went_offline
    }

    /// Deliver an event to every live channel of one agent.
    ///
    /// If the agent has no live channels the event is silently dropped; this
    /// is a best-effort live channel, not a durable mailbox.
    pub async fn send_to(&self, agent_id: Uuid, event: ServerEvent) {
        self.deliver(|conn| conn.agent_id == agent_id, event).await;
    }

    /// Deliver an event to every connected agent's every channel
    pub async fn broadcast_all(&self, event: ServerEvent) {
        self.deliver(|_| true, event).await;
    }

    /// Deliver an event to the listed agents only
    pub async fn broadcast_to(&self, agent_ids: &[Uuid], event: ServerEvent) {
        self.deliver(|conn| agent_ids.contains(&conn.agent_id), event)
            .await;
    }

    /// Fan out to every connection matching the filter.
    ///
    /// A failed send means the socket task is gone; the channel is pruned
    /// after the loop so one dead recipient never stalls or aborts delivery
    /// to the rest.
    async fn deliver<F>(&self, filter: F, event: ServerEvent)
    where
        F: Fn(&AgentConnection) -> bool,
    {
        let mut dead: Vec<(Uuid, Uuid)> = Vec::new();
        let mut delivered = 0usize;

        {
            let connections = self.connections.read().await;
            for conn in connections.values().filter(|c| filter(c)) {
                match conn.send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => dead.push((conn.agent_id, conn.handle)),
                }
            }
        }

        for (agent_id, handle) in dead {
            tracing::warn!(
                agent_id = %agent_id,
                handle = %handle,
                "Dropping dead connection during delivery"
            );
            self.disconnect(agent_id, handle).await;
        }

        tracing::debug!(recipients = delivered, event = ?event, "Delivered event");
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Snapshot of hub occupancy
    pub async fn stats(&self) -> HubStats {
        HubStats {
            active_connections: self.connection_count().await,
            online_agents: self.presence.online_count().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn connect_agent(
        hub: &ConnectionHub,
        agent_id: Uuid,
    ) -> (Arc<AgentConnection>, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = hub.connect(agent_id, tx).await;
        (conn, rx)
    }

    #[tokio::test]
    async fn test_connected_ack_is_first_event() {
        let hub = ConnectionHub::new();
        let agent = Uuid::new_v4();
        let (_conn, mut rx) = connect_agent(&hub, agent).await;

        hub.broadcast_all(ServerEvent::Pong {}).await;

        assert!(matches!(
            rx.recv().await,
            Some(ServerEvent::Connected { agent_id }) if agent_id == agent
        ));
        assert!(matches!(rx.recv().await, Some(ServerEvent::Pong {})));
    }

    #[tokio::test]
    async fn test_broadcast_all_reaches_every_channel() {
        let hub = ConnectionHub::new();
        let (_c1, mut rx1) = connect_agent(&hub, Uuid::new_v4()).await;
        let (_c2, mut rx2) = connect_agent(&hub, Uuid::new_v4()).await;

        hub.broadcast_all(ServerEvent::Pong {}).await;

        // skip the connected acks
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();
        assert!(matches!(rx1.recv().await, Some(ServerEvent::Pong {})));
        assert!(matches!(rx2.recv().await, Some(ServerEvent::Pong {})));
    }

    #[tokio::test]
    async fn test_send_to_hits_all_tabs_of_one_agent_only() {
        let hub = ConnectionHub::new();
        let agent = Uuid::new_v4();
        let (_t1, mut rx1) = connect_agent(&hub, agent).await;
        let (_t2, mut rx2) = connect_agent(&hub, agent).await;
        let (_other, mut rx3) = connect_agent(&hub, Uuid::new_v4()).await;
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();
        rx3.recv().await.unwrap();

        hub.send_to(agent, ServerEvent::Pong {}).await;

        assert!(matches!(rx1.try_recv(), Ok(ServerEvent::Pong {})));
        assert!(matches!(rx2.try_recv(), Ok(ServerEvent::Pong {})));
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_unconnected_agent_is_dropped() {
        let hub = ConnectionHub::new();
        hub.send_to(Uuid::new_v4(), ServerEvent::Pong {}).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_to_subset() {
        let hub = ConnectionHub::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (_ca, mut rxa) = connect_agent(&hub, a).await;
        let (_cb, mut rxb) = connect_agent(&hub, b).await;
        rxa.recv().await.unwrap();
        rxb.recv().await.unwrap();

        hub.broadcast_to(
            &[a],
            ServerEvent::AgentTyping {
                conversation_id: Uuid::new_v4(),
                agent_id: b,
                is_typing: true,
            },
        )
        .await;

        assert!(matches!(rxa.try_recv(), Ok(ServerEvent::AgentTyping { .. })));
        assert!(rxb.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_channel_is_pruned_without_stalling_others() {
        let hub = ConnectionHub::new();
        let dead_agent = Uuid::new_v4();
        let (_dead, rx_dead) = connect_agent(&hub, dead_agent).await;
        let (_live, mut rx_live) = connect_agent(&hub, Uuid::new_v4()).await;
        rx_live.recv().await.unwrap();
        drop(rx_dead);

        hub.broadcast_all(ServerEvent::Pong {}).await;

        assert!(matches!(rx_live.try_recv(), Ok(ServerEvent::Pong {})));
        assert_eq!(hub.connection_count().await, 1);
        assert!(!hub.presence().is_online(dead_agent).await);
    }

    #[tokio::test]
    async fn test_disconnect_never_registered_is_noop() {
        let hub = ConnectionHub::new();
        assert!(!hub.disconnect(Uuid::new_v4(), Uuid::new_v4()).await);
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_per_channel_order_preserved() {
        let hub = ConnectionHub::new();
        let (_c, mut rx) = connect_agent(&hub, Uuid::new_v4()).await;
        rx.recv().await.unwrap();

        for i in 0..10u32 {
            hub.broadcast_all(ServerEvent::Error {
                message: i.to_string(),
            })
            .await;
        }
        for i in 0..10u32 {
            match rx.recv().await {
                Some(ServerEvent::Error { message }) => assert_eq!(message, i.to_string()),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_stats() {
        let hub = ConnectionHub::new();
        let agent = Uuid::new_v4();
        let (_t1, _rx1) = connect_agent(&hub, agent).await;
        let (_t2, _rx2) = connect_agent(&hub, agent).await;

        let stats = hub.stats().await;
        assert_eq!(stats.active_connections, 2);
        assert_eq!(stats.online_agents, 1);
    }
}
