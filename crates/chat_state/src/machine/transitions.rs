//! State transitions - FSM transition logic
//!
//! Implements the state machine that handles event-driven phase transitions.

use thiserror::Error;

use super::events::ChatEvent;
use super::states::ChatPhase;

const MAX_HISTORY: usize = 50;

/// Error type for invalid state transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from} with event {event}")]
    InvalidTransition { from: ChatPhase, event: String },
}

/// Represents a state transition result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    /// The phase before the transition.
    pub from: ChatPhase,
    /// The phase after the transition.
    pub to: ChatPhase,
    /// The event that triggered the transition.
    pub event: ChatEvent,
    /// Whether the phase actually changed.
    pub changed: bool,
}

/// State machine for the conversation phase.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: ChatPhase,
    history: Vec<StateTransition>,
    max_history: usize,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine in the Idle phase.
    pub fn new() -> Self {
        Self::with_phase(ChatPhase::Idle)
    }

    /// Create a state machine with a specific initial phase.
    pub fn with_phase(phase: ChatPhase) -> Self {
        Self {
            current: phase,
            history: Vec::new(),
            max_history: MAX_HISTORY,
        }
    }

    pub fn phase(&self) -> ChatPhase {
        self.current
    }

    /// Get the transition history (oldest first, bounded).
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Apply `event`, rejecting events the current phase does not accept.
    pub fn try_handle_event(
        &mut self,
        event: ChatEvent,
    ) -> Result<StateTransition, TransitionError> {
        let from = self.current;
        let Some(to) = Self::next_phase(from, &event) else {
            return Err(TransitionError::InvalidTransition {
                from,
                event: event.to_string(),
            });
        };

        self.current = to;
        let transition = StateTransition {
            from,
            to,
            event,
            changed: from != to,
        };

        self.history.push(transition.clone());
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        Ok(transition)
    }

    /// Apply `event`; an event the current phase does not accept leaves the
    /// phase unchanged.
    pub fn handle_event(&mut self, event: ChatEvent) -> StateTransition {
        match self.try_handle_event(event.clone()) {
            Ok(transition) => transition,
            Err(e) => {
                log::debug!("{e}");
                StateTransition {
                    from: self.current,
                    to: self.current,
                    event,
                    changed: false,
                }
            }
        }
    }

    fn next_phase(phase: ChatPhase, event: &ChatEvent) -> Option<ChatPhase> {
        use ChatEvent::*;
        use ChatPhase::*;

        match (phase, event) {
            // A new send always wins; an in-flight one is cancelled by the caller.
            (_, SendRequested) => Some(Sending),

            (Idle | Redirecting, QuotaExceeded) => Some(Redirecting),
            (Redirecting, RedirectAcknowledged) => Some(Idle),

            (Sending, StreamOpened) => Some(Streaming),

            (Sending | Streaming, StreamEnded) => Some(Idle),
            (Sending | Streaming, StreamFailed { .. }) => Some(Idle),
            (Sending | Streaming, Cancelled) => Some(Idle),

            _ => None,
        }
    }
}
