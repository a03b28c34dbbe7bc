//! WebSocket support for real-time agent dashboards
//!
//! Architecture:
//! - `hub`: connection registry and event fan-out, one instance per process
//! - `presence`: who is online and which conversations they are viewing
//! - `connection`: one live agent transport channel
//! - `events`: client/server frame types
//! - `handler`: Axum upgrade handler and per-socket loop

pub mod connection;
pub mod events;
pub mod handler;
pub mod hub;
pub mod presence;

pub use events::{ClientEvent, ServerEvent};
pub use handler::ws_handler;
pub use hub::{ConnectionHub, HubStats};
pub use presence::PresenceRegistry;
