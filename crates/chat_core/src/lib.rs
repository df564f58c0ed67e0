//! chat_core - Core types and configuration for the streaming chat client
//!
//! This crate provides the foundational types shared by the other chat crates:
//! - `models` - Session, Message, Document and UserProfile wire types
//! - `search` - web-search payloads attached to assistant messages
//! - `config` - client configuration (file + environment)
//! - `paths` - on-disk locations for client state

pub mod config;
pub mod models;
pub mod paths;
pub mod search;

// Re-export commonly used types
pub use config::ClientConfig;
pub use models::{
    Document, Message, ProfileUpdate, Session, SessionDetail, SessionId, UserProfile,
};
pub use search::{SearchPayload, SearchResult};
