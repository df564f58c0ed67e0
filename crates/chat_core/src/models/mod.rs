//! Wire types exchanged with the chat service.

mod document;
mod message;
mod session;
mod user;

pub(crate) mod serde_helpers;

pub use document::Document;
pub use message::Message;
pub use session::{Session, SessionDetail, SessionId};
pub use user::{ProfileUpdate, UserProfile};
