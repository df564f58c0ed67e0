pub mod client;
pub mod middleware;
pub mod upload;

pub use client::{ApiClient, ChatStreamRequest};
pub use middleware::BearerAuthMiddleware;
pub use upload::{validate_upload, MAX_UPLOAD_BYTES};
