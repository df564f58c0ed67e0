//! Chat events - Defines events that trigger phase transitions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Events that move the conversation between phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatEvent {
    /// User sent a message. Also valid mid-stream: the previous send is
    /// cancelled and the new one starts.
    SendRequested,

    /// An anonymous user hit the free message limit.
    QuotaExceeded,

    /// The stream endpoint answered and frames are being read.
    StreamOpened,

    /// The stream finished (`end` frame or clean close).
    StreamEnded,

    /// Opening or reading the stream failed.
    StreamFailed { error: String },

    /// The user stopped the in-flight send.
    Cancelled,

    /// The shell handled the sign-in redirect.
    RedirectAcknowledged,
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatEvent::SendRequested => f.write_str("send_requested"),
            ChatEvent::QuotaExceeded => f.write_str("quota_exceeded"),
            ChatEvent::StreamOpened => f.write_str("stream_opened"),
            ChatEvent::StreamEnded => f.write_str("stream_ended"),
            ChatEvent::StreamFailed { error } => write!(f, "stream_failed({error})"),
            ChatEvent::Cancelled => f.write_str("cancelled"),
            ChatEvent::RedirectAcknowledged => f.write_str("redirect_acknowledged"),
        }
    }
}
