//! Change classification for discovered items.
//!
//! Compares each discovery record against the stored state to decide
//! whether it needs a detail fetch and delivery. Classification is a pure
//! function of its inputs: no wall clock, no I/O, reproducible given the
//! same record and stored entry.
//!
//! Items present in state but absent from the current discovery batch are
//! left untouched; there is no implicit expiry.

use crate::models::RawDiscoveryRecord;
use crate::storage::StateRecord;

/// Classification of one discovered item against stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Never delivered before
    New,
    /// Stored, but the effective timestamp moved forward
    Modified,
    /// Stored and unchanged; no detail fetch is issued
    Unchanged,
}

impl ItemStatus {
    /// Whether this status requires a detail fetch.
    pub fn needs_fetch(&self) -> bool {
        matches!(self, ItemStatus::New | ItemStatus::Modified)
    }
}

/// Classify a discovery record against its stored counterpart.
pub fn classify(record: &RawDiscoveryRecord, stored: Option<&StateRecord>) -> ItemStatus {
    match stored {
        None => ItemStatus::New,
        Some(prev) if record.effective() > prev.last_modified => ItemStatus::Modified,
        Some(_) => ItemStatus::Unchanged,
    }
}
