//! Credential handling
//!
//! 1. The identity provider owns the sign-in session and hands out its
//!    current credential.
//! 2. The token store keeps the last credential in one local slot.
//! 3. The token manager decides whether the stored credential is usable and
//!    collapses concurrent refreshes into a single provider call.

pub mod credential;
pub mod identity;
pub mod manager;
pub mod store;

pub use credential::{expiry_of, is_expired, is_expired_at};
pub use identity::{IdentityProvider, StaticIdentityProvider};
pub use manager::TokenManager;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
