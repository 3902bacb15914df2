//! A site: one copy of part of the database plus its lock table.

use crate::lock_manager::LockManager;
use crate::transaction::Transaction;
use crate::variable::Variable;
use repdb_common::error::DataError;
use repdb_common::types::{SiteId, SiteState, Tick, VariableId};
use std::collections::BTreeMap;
use tracing::debug;

/// One of the ten in-process sites. Sole owner of its variables and lock
/// manager; everything outside refers to it by id through the directory.
#[derive(Debug)]
pub struct Site {
    id: SiteId,
    state: SiteState,
    /// Tick of the most recent recovery (0 if never failed).
    up_since: Tick,
    data: BTreeMap<VariableId, Variable>,
    lock_manager: LockManager,
}

impl Site {
    pub fn new(id: SiteId, variables: Vec<Variable>) -> Self {
        Self {
            id,
            state: SiteState::Stable,
            up_since: Tick(0),
            data: variables.into_iter().map(|v| (v.id(), v)).collect(),
            lock_manager: LockManager::new(),
        }
    }

    pub fn id(&self) -> SiteId {
        self.id
    }

    pub fn state(&self) -> SiteState {
        self.state
    }

    pub fn up_since(&self) -> Tick {
        self.up_since
    }

    pub fn hosts(&self, variable: VariableId) -> bool {
        self.data.contains_key(&variable)
    }

    fn variable(&self, variable: VariableId) -> Result<&Variable, DataError> {
        self.data.get(&variable).ok_or(DataError::NotHosted {
            site: self.id,
            variable,
        })
    }

    /// Attempts a read lock for `txn`. False means denied (unreadable copy
    /// or a foreign write lock), not an error.
    pub fn try_read_lock(
        &mut self,
        txn: &Transaction,
        variable: VariableId,
    ) -> Result<bool, DataError> {
        let var = self.data.get(&variable).ok_or(DataError::NotHosted {
            site: self.id,
            variable,
        })?;
        Ok(self.lock_manager.acquire_read(txn, var))
    }

    /// Attempts a write lock for `txn`.
    pub fn try_write_lock(&mut self, txn: &str, variable: VariableId) -> Result<bool, DataError> {
        if !self.hosts(variable) {
            return Err(DataError::NotHosted {
                site: self.id,
                variable,
            });
        }
        Ok(self.lock_manager.acquire_write(txn, variable))
    }

    /// Reads `variable` for `txn`. The caller already holds the read lock.
    ///
    /// Read-only transactions get the snapshot at their start tick; a
    /// transaction that write-locked the variable sees its own pending
    /// write; everyone else sees the latest committed value.
    pub fn read(&self, txn: &Transaction, variable: VariableId) -> Result<i64, DataError> {
        let var = self.variable(variable)?;

        if txn.is_read_only() {
            return var.value_at(txn.start_time());
        }

        if self.lock_manager.has_write(txn.name(), variable) {
            return var
                .pending_write()
                .ok_or(DataError::NoPendingWrite { variable });
        }

        Ok(var.latest_value())
    }

    /// Stages a write into the variable's pending slot. The caller already
    /// holds the write lock at this site.
    pub fn write(&mut self, variable: VariableId, value: i64) -> Result<(), DataError> {
        self.data
            .get_mut(&variable)
            .ok_or(DataError::NotHosted {
                site: self.id,
                variable,
            })?
            .record_write(value);
        Ok(())
    }

    /// Commits every variable `txn` write-locked here. A previously failed
    /// replica becomes readable again through this path: a copy is trusted
    /// only once it has received a committed write after recovery.
    pub fn commit_writes(&mut self, txn: &str, tick: Tick) -> Result<(), DataError> {
        for variable in self.lock_manager.write_locked_variables(txn) {
            self.data
                .get_mut(&variable)
                .ok_or(DataError::NotHosted {
                    site: self.id,
                    variable,
                })?
                .commit(tick)?;
        }
        Ok(())
    }

    pub fn release_locks(&mut self, txn: &str) {
        self.lock_manager.release_all(txn);
    }

    /// Transactions holding a lock here that blocks `txn` on `variable`.
    pub fn blocking_transactions(&self, txn: &str, variable: VariableId) -> Vec<String> {
        self.lock_manager.blocking_transactions(txn, variable)
    }

    /// Takes the site down. Discarding the lock manager wholesale releases
    /// every lock here with no further bookkeeping. Replicated copies stop
    /// being readable; unique variables have no other copy to diverge from
    /// and stay readable.
    pub fn fail(&mut self) {
        debug!(site = self.id.0, "site failing, discarding lock table");
        self.state = SiteState::Failed;
        self.lock_manager = LockManager::new();
        for var in self.data.values_mut() {
            if var.is_replicated() {
                var.mark_unreadable();
            }
        }
    }

    pub fn recover(&mut self, now: Tick) {
        debug!(site = self.id.0, tick = now.0, "site recovering");
        self.state = SiteState::Stable;
        self.up_since = now;
    }

    /// Latest committed values, optionally narrowed to one variable.
    /// Report-only; no state change.
    pub fn dump(&self, filter: Option<VariableId>) -> Vec<(VariableId, i64)> {
        self.data
            .values()
            .filter(|v| filter.map_or(true, |f| v.id() == f))
            .map(|v| (v.id(), v.latest_value()))
            .collect()
    }
}
