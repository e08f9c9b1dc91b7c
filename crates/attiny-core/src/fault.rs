use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::error::ChipError;

/// Oldest entries are dropped past this many unread faults.
pub const FAULT_LOG_CAPACITY: usize = 64;

/// Bounded record of the configuration faults the chip recovered from.
///
/// Separate from the chip lock so timer engines can report while the chip is mid-write.
#[derive(Debug, Default)]
pub struct FaultLog {
    entries: Mutex<VecDeque<ChipError>>,
}

impl FaultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, fault: ChipError) {
        tracing::warn!(%fault, "recovered from chip configuration fault");
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() == FAULT_LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(fault);
    }

    /// Removes and returns every recorded fault, oldest first.
    pub fn take(&self) -> Vec<ChipError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
