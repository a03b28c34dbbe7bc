//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::ownership::ConversationService;
use crate::store::PgStore;
use crate::websocket::ConnectionHub;

/// State handed to every handler. Cloning is cheap; everything inside is
/// either a pool handle or an Arc.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub hub: ConnectionHub,
    pub conversations: ConversationService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let hub = ConnectionHub::new();
        let conversations =
            ConversationService::new(Arc::new(PgStore::new(pool.clone())), hub.clone());
        Self {
            pool,
            hub,
            conversations,
        }
    }
}
