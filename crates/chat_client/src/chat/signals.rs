use chat_core::SessionId;
use chat_state::ChatPhase;

/// Notifications for the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatSignal {
    PhaseChanged(ChatPhase),
    /// The service stored the first message of a new conversation under this id.
    SessionStarted(SessionId),
    /// The requested session does not exist; show the root view.
    NavigateToRoot,
    /// The user has to sign in before continuing.
    SignInRequired,
}

/// How a `send_message` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream ended, with or without an explicit end frame.
    Completed,
    /// Superseded by a newer send or cancelled by the caller.
    Cancelled,
    /// The connection failed mid-stream; the partial answer is kept.
    Interrupted,
    /// The anonymous quota is used up; nothing was sent.
    Redirected,
}
