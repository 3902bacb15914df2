//! Multiversion variable store.
//!
//! Each variable keeps its full committed history keyed by commit tick, a
//! single uncommitted-write slot, and the flags the available-copies
//! protocol needs: whether the variable is replicated, and whether this
//! copy may currently serve reads.

use repdb_common::error::DataError;
use repdb_common::types::{Tick, VariableId};
use std::collections::BTreeMap;

/// One copy of a variable at one site.
#[derive(Debug, Clone)]
pub struct Variable {
    id: VariableId,
    /// Committed values by commit tick. Append-only; never empty.
    history: BTreeMap<Tick, i64>,
    /// Value written under a write lock, not yet committed.
    pending_write: Option<i64>,
    replicated: bool,
    /// A replicated copy at a recovered site stays unreadable until it
    /// receives a committed write.
    readable: bool,
}

impl Variable {
    pub fn new(id: VariableId, created: Tick, initial: i64) -> Self {
        let mut history = BTreeMap::new();
        history.insert(created, initial);
        Self {
            id,
            history,
            pending_write: None,
            replicated: id.is_replicated(),
            readable: true,
        }
    }

    pub fn id(&self) -> VariableId {
        self.id
    }

    pub fn is_replicated(&self) -> bool {
        self.replicated
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn mark_unreadable(&mut self) {
        self.readable = false;
    }

    /// The most recently committed value.
    pub fn latest_value(&self) -> i64 {
        // History is seeded at construction and append-only.
        *self
            .history
            .values()
            .next_back()
            .expect("variable history is never empty")
    }

    /// The value committed at the largest tick at or before `tick`.
    /// This is the snapshot read used by read-only transactions.
    pub fn value_at(&self, tick: Tick) -> Result<i64, DataError> {
        self.history
            .range(..=tick)
            .next_back()
            .map(|(_, v)| *v)
            .ok_or(DataError::NoVersion {
                variable: self.id,
                tick: tick.0,
            })
    }

    /// Stages a value in the uncommitted-write slot. The caller holds the
    /// write lock.
    pub fn record_write(&mut self, value: i64) {
        self.pending_write = Some(value);
    }

    pub fn pending_write(&self) -> Option<i64> {
        self.pending_write
    }

    /// Appends the pending write to the committed history at `tick` and
    /// makes the copy readable again.
    pub fn commit(&mut self, tick: Tick) -> Result<(), DataError> {
        let value = self
            .pending_write
            .take()
            .ok_or(DataError::NoPendingWrite { variable: self.id })?;
        self.history.insert(tick, value);
        self.readable = true;
        Ok(())
    }
}
