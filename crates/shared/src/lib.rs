//! Deskline Shared Types and Utilities
//!
//! This crate contains domain types and database utilities shared across Deskline.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
