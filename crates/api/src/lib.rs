//! Deskline API Library
//!
//! This crate contains the API server components for Deskline.

pub mod classifier;
pub mod config;
pub mod error;
pub mod ownership;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use ownership::ConversationService;
pub use state::AppState;
