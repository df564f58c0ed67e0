//! chat_state - Conversation phase state machine
//!
//! Tracks the `Idle -> Sending -> Streaming -> Idle` cycle of one conversation,
//! plus the `Redirecting` short-circuit taken when an anonymous user runs out
//! of free messages.

pub mod machine;

// Re-export commonly used types
pub use machine::{ChatEvent, ChatPhase, StateMachine, StateTransition, TransitionError};
