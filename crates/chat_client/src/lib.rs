//! chat_client - client runtime for the streaming chat service
//!
//! - `auth` - credential store, identity provider seam and the single-flight
//!   token lifecycle manager
//! - `api` - request pipeline (bearer middleware with one-shot 401 retry) and
//!   the typed REST client
//! - `stream` - server-sent frame decoder for `POST /chat/stream`
//! - `chat` - session/message state and send orchestration

pub mod api;
pub mod auth;
pub mod chat;
pub mod error;
pub mod stream;

pub use api::{ApiClient, BearerAuthMiddleware, ChatStreamRequest};
pub use auth::{
    FileTokenStore, IdentityProvider, MemoryTokenStore, StaticIdentityProvider, TokenManager,
    TokenStore,
};
pub use chat::{ChatOrchestrator, ChatSignal, SendOutcome};
pub use error::{ApiError, ApiResult, ChatError, ChatResult};
pub use stream::{decode_stream, FrameDecoder, StreamEvent, StreamMetadata};

pub use chat_core::ClientConfig;
pub use chat_state::ChatPhase;
