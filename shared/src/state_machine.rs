//! Publisher State Machine
//!
//! Defines valid lifecycle transitions of the publishing loop:
//!
//! ```text
//! Starting -> Bursting -> Steady <-> Paused
//!     any state -> Stopping (interrupt or fatal transport loss)
//! ```

use std::fmt;

/// Lifecycle states of the publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublisherState {
    /// Probing the delivery target before publishing anything
    Starting,
    /// Rapid initial publishes to fill the consumer's window
    Bursting,
    /// Regular tick-driven publishing
    Steady,
    /// Publishing disabled by remote control
    Paused,
    /// Terminal state
    Stopping,
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublisherState::Starting => write!(f, "STARTING"),
            PublisherState::Bursting => write!(f, "BURSTING"),
            PublisherState::Steady => write!(f, "STEADY"),
            PublisherState::Paused => write!(f, "PAUSED"),
            PublisherState::Stopping => write!(f, "STOPPING"),
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum PublisherEvent {
    /// Pre-flight availability probe succeeded
    ServerAvailable,
    /// Pre-flight availability probe exhausted its budget
    ServerUnavailable,
    /// All burst iterations published
    BurstComplete,
    /// Remote control disabled publishing
    Disabled,
    /// Remote control enabled publishing
    Enabled,
    /// Interrupt signal received
    Interrupted,
    /// Delivery target became unreachable mid-run
    TransportLost,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and state changed (or stayed)
    Success(PublisherState),
    /// Transition was invalid from current state
    Invalid {
        from: PublisherState,
        event: PublisherEvent,
    },
    /// Transition stopped the publisher because of an unrecoverable failure
    Fatal { reason: String },
}

/// The publisher lifecycle state machine
#[derive(Debug)]
pub struct PublisherStateMachine {
    current_state: PublisherState,
}

impl Default for PublisherStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PublisherStateMachine {
    /// Create a new state machine in Starting state
    pub fn new() -> Self {
        Self {
            current_state: PublisherState::Starting,
        }
    }

    /// Get current state
    pub fn state(&self) -> PublisherState {
        self.current_state
    }

    /// Whether the publisher has reached its terminal state
    pub fn is_stopped(&self) -> bool {
        self.current_state == PublisherState::Stopping
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: PublisherEvent) -> TransitionResult {
        match &event {
            PublisherEvent::Interrupted => {
                self.current_state = PublisherState::Stopping;
                return TransitionResult::Success(PublisherState::Stopping);
            }
            PublisherEvent::ServerUnavailable if self.current_state == PublisherState::Starting => {
                self.current_state = PublisherState::Stopping;
                return TransitionResult::Fatal {
                    reason: "Delivery target unavailable at startup".into(),
                };
            }
            PublisherEvent::TransportLost if self.current_state != PublisherState::Stopping => {
                let prev = self.current_state;
                self.current_state = PublisherState::Stopping;
                return TransitionResult::Fatal {
                    reason: format!("Delivery target lost while {}", prev),
                };
            }
            _ => {}
        }

        match self.get_next_state(&event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &PublisherEvent) -> Option<PublisherState> {
        use PublisherEvent::*;
        use PublisherState::*;

        match (self.current_state, event) {
            (Starting, ServerAvailable) => Some(Bursting),
            (Bursting, BurstComplete) => Some(Steady),

            (Steady, Disabled) => Some(Paused),
            (Steady, Enabled) => Some(Steady),
            (Paused, Enabled) => Some(Steady),
            (Paused, Disabled) => Some(Paused),

            _ => None,
        }
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: PublisherState, to: PublisherState) -> bool {
    use PublisherState::*;

    match (from, to) {
        (a, b) if a == b => true,
        (_, Stopping) => true,
        (Starting, Bursting) => true,
        (Bursting, Steady) => true,
        (Steady, Paused) | (Paused, Steady) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let fsm = PublisherStateMachine::new();
        assert_eq!(fsm.state(), PublisherState::Starting);
        assert!(!fsm.is_stopped());
    }

    #[test]
    fn test_normal_lifecycle() {
        let mut fsm = PublisherStateMachine::new();

        let result = fsm.process_event(PublisherEvent::ServerAvailable);
        assert_eq!(result, TransitionResult::Success(PublisherState::Bursting));

        let result = fsm.process_event(PublisherEvent::BurstComplete);
        assert_eq!(result, TransitionResult::Success(PublisherState::Steady));

        let result = fsm.process_event(PublisherEvent::Disabled);
        assert_eq!(result, TransitionResult::Success(PublisherState::Paused));

        let result = fsm.process_event(PublisherEvent::Enabled);
        assert_eq!(result, TransitionResult::Success(PublisherState::Steady));

        let result = fsm.process_event(PublisherEvent::Interrupted);
        assert_eq!(result, TransitionResult::Success(PublisherState::Stopping));
        assert!(fsm.is_stopped());
    }

    #[test]
    fn test_startup_failure_is_fatal() {
        let mut fsm = PublisherStateMachine::new();
        let result = fsm.process_event(PublisherEvent::ServerUnavailable);
        assert!(matches!(result, TransitionResult::Fatal { .. }));
        assert_eq!(fsm.state(), PublisherState::Stopping);
    }

    #[test]
    fn test_transport_lost_mid_run() {
        let mut fsm = PublisherStateMachine::new();
        fsm.process_event(PublisherEvent::ServerAvailable);
        fsm.process_event(PublisherEvent::BurstComplete);

        let result = fsm.process_event(PublisherEvent::TransportLost);
        assert!(matches!(result, TransitionResult::Fatal { reason } if reason.contains("STEADY")));
        assert!(fsm.is_stopped());
    }

    #[test]
    fn test_interrupt_from_any_state() {
        let mut fsm = PublisherStateMachine::new();
        fsm.process_event(PublisherEvent::ServerAvailable);
        assert_eq!(fsm.state(), PublisherState::Bursting);

        fsm.process_event(PublisherEvent::Interrupted);
        assert_eq!(fsm.state(), PublisherState::Stopping);
    }

    #[test]
    fn test_invalid_transition() {
        let mut fsm = PublisherStateMachine::new();

        // Control changes have no effect before the burst finishes
        let result = fsm.process_event(PublisherEvent::Disabled);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert_eq!(fsm.state(), PublisherState::Starting);

        // Stopping is terminal
        fsm.process_event(PublisherEvent::Interrupted);
        let result = fsm.process_event(PublisherEvent::ServerAvailable);
        assert!(matches!(result, TransitionResult::Invalid { .. }));
        assert!(fsm.is_stopped());
    }

    #[test]
    fn test_valid_transition_table() {
        use PublisherState::*;
        assert!(is_valid_transition(Starting, Bursting));
        assert!(is_valid_transition(Paused, Steady));
        assert!(is_valid_transition(Bursting, Stopping));
        assert!(!is_valid_transition(Starting, Steady));
        assert!(!is_valid_transition(Stopping, Steady));
    }
}
