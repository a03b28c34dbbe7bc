//! API routes

pub mod agents;
pub mod canned;
pub mod conversations;
pub mod customers;
pub mod health;
pub mod inbound;
pub mod search;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let api_routes = Router::new()
        // Customers
        .route("/customers", get(customers::list_customers))
        .route("/customers", post(customers::create_customer))
        .route("/customers/:customer_id", get(customers::get_customer))
        .route("/customers/:customer_id", put(customers::update_customer))
        .route(
            "/customers/:customer_id/conversations",
            get(customers::get_customer_conversations),
        )
        .route(
            "/customers/:customer_id/messages",
            post(customers::send_customer_message),
        )
        // Agents
        .route("/agents", get(agents::list_agents))
        .route("/agents", post(agents::create_agent))
        .route("/agents/:agent_id", get(agents::get_agent))
        .route("/agents/:agent_id/online", post(agents::set_agent_online))
        .route("/agents/:agent_id/offline", post(agents::set_agent_offline))
        // Conversations (stats before :conversation_id so it isn't captured)
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/stats", get(conversations::conversation_stats))
        .route(
            "/conversations/:conversation_id",
            get(conversations::get_conversation),
        )
        .route(
            "/conversations/:conversation_id",
            put(conversations::update_conversation),
        )
        .route(
            "/conversations/:conversation_id/messages",
            post(conversations::send_agent_message),
        )
        .route(
            "/conversations/:conversation_id/read",
            post(conversations::mark_conversation_read),
        )
        .route(
            "/conversations/:conversation_id/assign",
            post(conversations::assign_conversation),
        )
        .route(
            "/conversations/:conversation_id/release",
            post(conversations::release_conversation),
        )
        // Canned replies
        .route("/canned-replies", get(canned::list_canned_replies))
        .route("/canned-replies", post(canned::create_canned_reply))
        .route("/canned-replies/categories", get(canned::list_categories))
        .route("/canned-replies/:reply_id", get(canned::get_canned_reply))
        .route("/canned-replies/:reply_id", put(canned::update_canned_reply))
        .route(
            "/canned-replies/:reply_id",
            delete(canned::delete_canned_reply),
        )
        .route("/canned-replies/:reply_id/use", post(canned::use_canned_reply))
        // Search
        .route("/search", get(search::search))
        .route("/search/suggestions", get(search::suggestions))
        // External channels
        .route(
            "/external/messages",
            post(inbound::receive_external_message),
        );

    // WebSocket route (identity via query parameter)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api", api_routes)
        .with_state(state)
}
