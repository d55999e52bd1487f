//! Fixed-capacity audit logs
//!
//! Transaction and error entries are kept in rings of 50; once full, each
//! new entry overwrites the oldest. Nothing survives a power cycle.

use heapless::HistoryBuffer;

use crate::error::ErrorKind;
use crate::state::State;

/// Capacity of the transaction log
pub const TRANSACTION_LOG_CAPACITY: usize = 50;

/// Capacity of the error log
pub const ERROR_LOG_CAPACITY: usize = 50;

/// What kind of money movement a transaction was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransactionType {
    PaidVend,
    FreeVend,
    TestVend,
    Revalue,
    NegativeVend,
}

impl TransactionType {
    pub fn name(self) -> &'static str {
        match self {
            TransactionType::PaidVend => "paid_vend",
            TransactionType::FreeVend => "free_vend",
            TransactionType::TestVend => "test_vend",
            TransactionType::Revalue => "revalue",
            TransactionType::NegativeVend => "negative_vend",
        }
    }
}

/// Outcome of one vend or revalue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransactionLogEntry {
    pub timestamp: u32,
    pub kind: TransactionType,
    pub amount: u32,
    pub item_number: u16,
    pub success: bool,
    pub error: Option<ErrorKind>,
}

/// Snapshot taken whenever an error is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorLogEntry {
    pub timestamp: u32,
    pub error: ErrorKind,
    /// Session state when the error was reported
    pub state: State,
    /// First byte of the last command sent
    pub last_command: u8,
    /// First byte of the last reply received
    pub last_response: u8,
}

/// Ring of the most recent `N` entries
#[derive(Debug)]
pub struct AuditLog<T, const N: usize> {
    entries: HistoryBuffer<T, N>,
    total: u32,
}

impl<T: Copy, const N: usize> Default for AuditLog<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> AuditLog<T, N> {
    pub fn new() -> Self {
        Self {
            entries: HistoryBuffer::new(),
            total: 0,
        }
    }

    /// Append, overwriting the oldest entry when full
    pub fn push(&mut self, entry: T) {
        self.entries.write(entry);
        self.total = self.total.wrapping_add(1);
    }

    /// Entries currently held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    /// Entries ever pushed, including overwritten ones
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&T> {
        self.entries.recent()
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.oldest_ordered()
    }
}

/// Transaction ring
pub type TransactionLog = AuditLog<TransactionLogEntry, TRANSACTION_LOG_CAPACITY>;

/// Error ring
pub type ErrorLog = AuditLog<ErrorLogEntry, ERROR_LOG_CAPACITY>;

impl ErrorLog {
    /// Count held entries per kind, indexed by [`ErrorKind::index`]
    pub fn stats(&self) -> [u32; ErrorKind::COUNT] {
        let mut counts = [0u32; ErrorKind::COUNT];
        for entry in self.iter() {
            counts[entry.error.index()] += 1;
        }
        counts
    }
}
