//! Events that trigger state transitions

use super::machine::{Phase, State};

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    // Reader-originated events
    /// Reader reinitialised itself
    JustReset,
    /// SETUP exchange finished and the reader config is known
    SetupComplete,
    /// A session was opened with funds available
    BeginSession,
    /// Reader approved the pending vend
    VendApproved,
    /// Reader denied the pending vend
    VendDenied,
    /// Reader closed the session
    EndSession,
    /// Reader accepted the revalue; return to `resume`
    RevalueApproved { resume: State },
    /// Reader refused the revalue; return to `resume`
    RevalueDenied { resume: State },

    // Host-originated events
    EnableReader,
    DisableReader,
    VendRequest,
    VendSuccess,
    VendFailure,
    VendCancel,
    SessionComplete,
    Revalue,
    NegativeVend,
}

impl Event {
    /// Lowest phase in which the event can make sense
    ///
    /// Events arriving below this phase are structural violations; events
    /// arriving at or above it but from the wrong state are out of sequence.
    pub fn min_phase(&self) -> Phase {
        match self {
            Event::JustReset | Event::SetupComplete => Phase::Inactive,
            Event::EnableReader => Phase::Disabled,
            Event::DisableReader | Event::BeginSession | Event::Revalue => Phase::Enabled,
            Event::VendApproved
            | Event::VendDenied
            | Event::EndSession
            | Event::RevalueApproved { .. }
            | Event::RevalueDenied { .. }
            | Event::VendRequest
            | Event::VendSuccess
            | Event::VendFailure
            | Event::VendCancel
            | Event::SessionComplete
            | Event::NegativeVend => Phase::Session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_phases() {
        assert_eq!(Event::JustReset.min_phase(), Phase::Inactive);
        assert_eq!(Event::EnableReader.min_phase(), Phase::Disabled);
        assert_eq!(Event::BeginSession.min_phase(), Phase::Enabled);
        assert_eq!(Event::VendApproved.min_phase(), Phase::Session);
    }
}
