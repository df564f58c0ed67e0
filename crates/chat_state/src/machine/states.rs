//! Conversation phases

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of the active conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    /// Waiting for user input.
    #[default]
    Idle,

    /// A message was sent and the stream has not answered yet.
    Sending,

    /// The response stream is open and content is arriving.
    Streaming,

    /// The anonymous quota is used up; the shell should prompt for sign-in.
    Redirecting,
}

impl ChatPhase {
    /// Whether the UI should show a loading indicator.
    pub fn is_loading(&self) -> bool {
        matches!(self, ChatPhase::Sending | ChatPhase::Streaming)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ChatPhase::Idle)
    }
}

impl fmt::Display for ChatPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatPhase::Idle => "idle",
            ChatPhase::Sending => "sending",
            ChatPhase::Streaming => "streaming",
            ChatPhase::Redirecting => "redirecting",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_in_flight_phases_are_loading() {
        assert!(!ChatPhase::Idle.is_loading());
        assert!(ChatPhase::Sending.is_loading());
        assert!(ChatPhase::Streaming.is_loading());
        assert!(!ChatPhase::Redirecting.is_loading());
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&ChatPhase::Redirecting).expect("json");
        assert_eq!(json, "\"redirecting\"");
    }
}
