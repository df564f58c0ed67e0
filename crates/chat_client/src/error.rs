use thiserror::Error;

/// Errors from the request pipeline.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::NotFound(_) => Some(404),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the chat orchestrator.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Message is empty")]
    EmptyMessage,
}

impl ChatError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ChatError::Api(e) if e.is_unauthorized())
    }
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;
