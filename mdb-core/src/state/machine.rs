//! State machine definition
//!
//! Every bus exchange and host action is checked against the current state
//! before anything is sent.

use super::events::Event;
use crate::error::ErrorKind;

/// Reader states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Power-on or just reset; SETUP still required
    Inactive,
    /// Configured but not accepting payments
    Disabled,
    /// Accepting payments, no session open
    Enabled,
    /// Session open, waiting for a selection
    SessionIdle,
    /// Vend approved, product being dispensed
    Vend,
    /// Funds being added to the session
    Revalue,
    /// Refund of a returned product in progress
    NegativeVend,
}

/// Broad phases, ordered from least to most engaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Inactive,
    Disabled,
    Enabled,
    Session,
}

impl State {
    pub fn phase(&self) -> Phase {
        match self {
            State::Inactive => Phase::Inactive,
            State::Disabled => Phase::Disabled,
            State::Enabled => Phase::Enabled,
            State::SessionIdle | State::Vend | State::Revalue | State::NegativeVend => {
                Phase::Session
            }
        }
    }

    /// Check if a session is open
    pub fn in_session(&self) -> bool {
        self.phase() == Phase::Session
    }

    /// Check if the reader is enabled (with or without a session)
    pub fn is_enabled(&self) -> bool {
        self.phase() >= Phase::Enabled
    }

    pub fn name(&self) -> &'static str {
        match self {
            State::Inactive => "inactive",
            State::Disabled => "disabled",
            State::Enabled => "enabled",
            State::SessionIdle => "session_idle",
            State::Vend => "vend",
            State::Revalue => "revalue",
            State::NegativeVend => "negative_vend",
        }
    }

    /// Process an event and return the next state
    ///
    /// An event that is not valid from this state yields `State` when the
    /// reader has not reached the event's phase yet, or `Sequence` when the
    /// phase is right but the event is mistimed or repeated.
    pub fn transition(self, event: Event) -> Result<Self, ErrorKind> {
        use State::*;

        let next = match (self, event) {
            // Reset is valid everywhere
            (_, Event::JustReset) => Inactive,

            // Configuration
            (Inactive, Event::SetupComplete) => Disabled,
            (Disabled, Event::EnableReader) => Enabled,
            (Enabled | SessionIdle | Vend | Revalue | NegativeVend, Event::DisableReader) => {
                Disabled
            }

            // Session lifecycle
            (Enabled, Event::BeginSession) => SessionIdle,
            (SessionIdle | Vend | Revalue | NegativeVend, Event::EndSession) => Inactive,
            (SessionIdle | Vend | Revalue | NegativeVend, Event::SessionComplete) => Inactive,

            // Vend
            (SessionIdle, Event::VendRequest) => SessionIdle,
            (SessionIdle, Event::VendApproved) => Vend,
            (SessionIdle | Vend | NegativeVend, Event::VendDenied) => SessionIdle,
            (Vend, Event::VendSuccess) => SessionIdle,
            (Vend, Event::VendFailure) => SessionIdle,
            (SessionIdle | Vend, Event::VendCancel) => SessionIdle,

            // Negative vend
            (SessionIdle, Event::NegativeVend) => NegativeVend,
            (NegativeVend, Event::VendApproved) => SessionIdle,

            // Revalue
            (Enabled | SessionIdle, Event::Revalue) => Revalue,
            (Revalue, Event::RevalueApproved { resume }) => resume,
            (Revalue, Event::RevalueDenied { resume }) => resume,

            _ => return Err(self.reject(event)),
        };

        Ok(next)
    }

    /// Classify an event that is not valid from this state
    pub fn reject(&self, event: Event) -> ErrorKind {
        if self.phase() < event.min_phase() {
            ErrorKind::State
        } else {
            ErrorKind::Sequence
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bring_up_flow() {
        let state = State::Inactive;
        let disabled = state.transition(Event::SetupComplete).unwrap();
        assert_eq!(disabled, State::Disabled);
        let enabled = disabled.transition(Event::EnableReader).unwrap();
        assert_eq!(enabled, State::Enabled);
    }

    #[test]
    fn test_just_reset_from_any_state() {
        let states = [
            State::Inactive,
            State::Disabled,
            State::Enabled,
            State::SessionIdle,
            State::Vend,
            State::Revalue,
            State::NegativeVend,
        ];

        for state in states {
            assert_eq!(state.transition(Event::JustReset), Ok(State::Inactive));
        }
    }

    #[test]
    fn test_vend_approved_requires_session() {
        assert_eq!(
            State::Inactive.transition(Event::VendApproved),
            Err(ErrorKind::State)
        );
        assert_eq!(
            State::SessionIdle.transition(Event::VendApproved),
            Ok(State::Vend)
        );
    }

    #[test]
    fn test_duplicate_is_sequence_error() {
        assert_eq!(
            State::Vend.transition(Event::VendRequest),
            Err(ErrorKind::Sequence)
        );
        assert_eq!(
            State::Enabled.transition(Event::EnableReader),
            Err(ErrorKind::Sequence)
        );
        assert_eq!(
            State::SessionIdle.transition(Event::BeginSession),
            Err(ErrorKind::Sequence)
        );
    }

    #[test]
    fn test_early_action_is_state_error() {
        assert_eq!(
            State::Disabled.transition(Event::BeginSession),
            Err(ErrorKind::State)
        );
        assert_eq!(
            State::Inactive.transition(Event::EnableReader),
            Err(ErrorKind::State)
        );
        assert_eq!(
            State::Enabled.transition(Event::VendSuccess),
            Err(ErrorKind::State)
        );
    }

    #[test]
    fn test_vend_flow() {
        let idle = State::Enabled.transition(Event::BeginSession).unwrap();
        let idle = idle.transition(Event::VendRequest).unwrap();
        assert_eq!(idle, State::SessionIdle);
        let vend = idle.transition(Event::VendApproved).unwrap();
        assert_eq!(vend, State::Vend);
        let idle = vend.transition(Event::VendSuccess).unwrap();
        assert_eq!(idle, State::SessionIdle);
        assert_eq!(idle.transition(Event::SessionComplete), Ok(State::Inactive));
    }

    #[test]
    fn test_end_session_from_session_states() {
        for state in [State::SessionIdle, State::Vend, State::Revalue] {
            assert_eq!(state.transition(Event::EndSession), Ok(State::Inactive));
        }
        assert_eq!(
            State::Enabled.transition(Event::EndSession),
            Err(ErrorKind::State)
        );
    }

    #[test]
    fn test_revalue_returns_to_prior_state() {
        let revalue = State::Enabled.transition(Event::Revalue).unwrap();
        assert_eq!(revalue, State::Revalue);
        assert_eq!(
            revalue.transition(Event::RevalueDenied {
                resume: State::Enabled
            }),
            Ok(State::Enabled)
        );

        let revalue = State::SessionIdle.transition(Event::Revalue).unwrap();
        assert_eq!(
            revalue.transition(Event::RevalueApproved {
                resume: State::SessionIdle
            }),
            Ok(State::SessionIdle)
        );
    }

    #[test]
    fn test_negative_vend_flow() {
        let neg = State::SessionIdle.transition(Event::NegativeVend).unwrap();
        assert_eq!(neg, State::NegativeVend);
        assert_eq!(neg.transition(Event::VendApproved), Ok(State::SessionIdle));
    }

    #[test]
    fn test_disable_from_active_states() {
        for state in [State::Enabled, State::SessionIdle, State::Vend] {
            assert_eq!(state.transition(Event::DisableReader), Ok(State::Disabled));
        }
        assert_eq!(
            State::Inactive.transition(Event::DisableReader),
            Err(ErrorKind::State)
        );
    }

    #[test]
    fn test_phase_helpers() {
        assert!(State::Vend.in_session());
        assert!(!State::Enabled.in_session());
        assert!(State::Enabled.is_enabled());
        assert!(!State::Disabled.is_enabled());
        assert!(State::SessionIdle.phase() > State::Enabled.phase());
    }
}
