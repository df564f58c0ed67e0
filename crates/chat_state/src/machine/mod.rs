//! State machine module
//!
//! Contains the FSM implementation for the conversation lifecycle.

mod events;
mod states;
mod transitions;

pub use events::ChatEvent;
pub use states::ChatPhase;
pub use transitions::{StateMachine, StateTransition, TransitionError};
