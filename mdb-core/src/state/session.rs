//! Vend session data

use super::machine::State;
use crate::audit::TransactionType;

/// A vend the host asked for that the reader has not answered yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingVend {
    pub item: u16,
    pub amount: u32,
    pub kind: TransactionType,
}

/// Current session and reader state
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Session {
    pub state: State,
    /// Funds the reader reported for this session (scaled)
    pub available_funds: u32,
    /// Amount of the current or last vend (scaled)
    pub vend_amount: u32,
    pub item_number: u16,
    pub multivend: bool,
    pub refundable: bool,
    /// When the session last entered `SessionIdle`
    pub idle_since: u32,
    pub trans_type: TransactionType,
    pub pending: Option<PendingVend>,
    /// Amount of the revalue in progress
    pub revalue_amount: u32,
    /// State to return to once the revalue resolves
    pub revalue_resume: State,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub const fn new() -> Self {
        Self {
            state: State::Inactive,
            available_funds: 0,
            vend_amount: 0,
            item_number: 0,
            multivend: false,
            refundable: false,
            idle_since: 0,
            trans_type: TransactionType::PaidVend,
            pending: None,
            revalue_amount: 0,
            revalue_resume: State::Enabled,
        }
    }

    /// Drop all session data and move to `state`
    pub fn clear(&mut self, state: State) {
        *self = Self::new();
        self.state = state;
    }

    /// Open a session with `funds` available
    pub fn open(&mut self, funds: u32, now: u32, multivend: bool, refundable: bool) {
        self.available_funds = funds;
        self.vend_amount = 0;
        self.item_number = 0;
        self.multivend = multivend;
        self.refundable = refundable;
        self.pending = None;
        self.idle_since = now;
    }

    /// Restart the idle clock
    pub fn touch(&mut self, now: u32) {
        self.idle_since = now;
    }

    /// Milliseconds spent in `SessionIdle` with nothing pending, or `None`
    pub fn idle_for(&self, now: u32) -> Option<u32> {
        (self.state == State::SessionIdle && self.pending.is_none())
            .then(|| now.wrapping_sub(self.idle_since))
    }

    /// Whether `amount` can be paid from the session funds
    pub fn can_afford(&self, amount: u32) -> bool {
        amount <= self.available_funds
    }
}
