// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, PoisonError, RwLock};

use super::pdu::SubmitSm;

/// Append-only collection of captured PDUs.
///
/// One writer appends while any number of readers take snapshots. Records
/// are never mutated once stored, so snapshots share them by `Arc`.
#[derive(Debug, Clone, Default)]
pub struct PduStore {
    records: Arc<RwLock<Vec<Arc<SubmitSm>>>>,
}

impl PduStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, pdu: SubmitSm) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(pdu));
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<SubmitSm>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The first stored record with the given sequence number.
    pub fn find_by_sequence(&self, sequence_number: u32) -> Option<Arc<SubmitSm>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|pdu| pdu.sequence_number == sequence_number)
            .cloned()
    }

    pub fn clear(&self) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
