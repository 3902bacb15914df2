//! Transaction coordinator: drives operation execution, lock acquisition,
//! buffering and rerun of suspended operations, and the commit/abort
//! protocol under partial site failure.

use crate::deadlock;
use crate::directory::SiteDirectory;
use crate::transaction::{Transaction, TransactionState};
use repdb_common::error::{ProtocolError, Result};
use repdb_common::event::{AbortReason, Event, EventSink, SuspendKind};
use repdb_common::types::{Operation, SiteState, Tick, VariableId};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Owns the transaction table and executes every transaction-class
/// operation against the site directory.
#[derive(Debug, Default)]
pub struct TransactionCoordinator {
    txns: BTreeMap<String, Transaction>,
}

impl TransactionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction(&self, name: &str) -> Option<&Transaction> {
        self.txns.get(name)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.txns.values()
    }

    /// Executes one tick's batch: suspended operations are rerun first
    /// (oldest waiter first), then the new operations in script order.
    pub fn execute(
        &mut self,
        operations: &[Operation],
        now: Tick,
        directory: &mut SiteDirectory,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        self.rerun_suspended(now, directory, events)?;
        for operation in operations {
            self.run_new(operation, now, directory, events)?;
        }
        Ok(())
    }

    /// Reruns every suspended transaction's buffered operation, ordered by
    /// ascending wait start. FIFO fairness among waiters, not a guarantee:
    /// a rerun can immediately suspend again.
    fn rerun_suspended(
        &mut self,
        now: Tick,
        directory: &mut SiteDirectory,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let mut queue: Vec<(Tick, String)> = self
            .txns
            .values()
            .filter(|t| t.is_suspended())
            .map(|t| (t.wait_since().unwrap_or_default(), t.name().to_string()))
            .collect();
        queue.sort();

        for (_, name) in queue {
            // An earlier rerun in this pass may have unblocked or killed
            // this transaction already.
            let Some(txn) = self.txns.get(&name) else {
                continue;
            };
            if !txn.is_suspended() {
                continue;
            }
            let Some(operation) = txn.buffered().cloned() else {
                continue;
            };
            debug!(txn = %name, op = %operation, "rerunning buffered operation");
            self.dispatch(&operation, now, directory, events)?;
        }
        Ok(())
    }

    /// Runs a newly arrived operation, validating the referenced
    /// transaction first.
    fn run_new(
        &mut self,
        operation: &Operation,
        now: Tick,
        directory: &mut SiteDirectory,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        match operation {
            Operation::Begin { txn } => return self.begin(txn, false, now),
            Operation::BeginRo { txn } => return self.begin(txn, true, now),
            Operation::Read { txn, .. }
            | Operation::Write { txn, .. }
            | Operation::End { txn } => {
                self.validate(txn, operation, now, directory, events)?;
            }
            other => {
                warn!(%other, "site-administrative operation routed to coordinator");
                return Ok(());
            }
        }
        self.dispatch(operation, now, directory, events)
    }

    /// Dispatches an operation to its handler. Used for both validated new
    /// operations and reruns of buffered ones.
    fn dispatch(
        &mut self,
        operation: &Operation,
        now: Tick,
        directory: &mut SiteDirectory,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        match operation {
            Operation::Read { txn, variable } => {
                self.read_variable(txn, *variable, operation, now, directory, events)
            }
            Operation::Write {
                txn,
                variable,
                value,
            } => self.write_variable(txn, *variable, *value, operation, now, directory, events),
            Operation::End { txn } => self.end_transaction(txn, operation, now, directory, events),
            other => {
                warn!(%other, "operation cannot be dispatched to a transaction handler");
                Ok(())
            }
        }
    }

    /// Confirms the referenced transaction exists and is able to accept a
    /// new operation. A suspended transaction triggers deadlock detection
    /// and a rerun pass first; if it is still not running afterwards the
    /// script is malformed.
    fn validate(
        &mut self,
        name: &str,
        operation: &Operation,
        now: Tick,
        directory: &mut SiteDirectory,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let txn = self
            .txns
            .get(name)
            .ok_or_else(|| ProtocolError::UnknownTransaction(name.to_string()))?;

        if txn.is_suspended() {
            deadlock::detect_and_resolve(&mut self.txns, directory, now, events)?;
            self.rerun_suspended(now, directory, events)?;
        }

        let txn = self
            .txns
            .get(name)
            .ok_or_else(|| ProtocolError::UnknownTransaction(name.to_string()))?;
        if txn.state() != TransactionState::Running {
            return Err(ProtocolError::UnexpectedOperation {
                txn: name.to_string(),
                operation: operation.to_string(),
                state: txn.state().to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn begin(&mut self, name: &str, read_only: bool, now: Tick) -> Result<()> {
        if self.txns.get(name).is_some_and(|t| !t.is_terminal()) {
            return Err(ProtocolError::TransactionExists(name.to_string()).into());
        }
        debug!(txn = name, read_only, tick = now.0, "transaction begins");
        self.txns
            .insert(name.to_string(), Transaction::new(name.to_string(), read_only, now));
        Ok(())
    }

    /// Read protocol: the first stable site that grants a read lock serves
    /// the value. No stable copy suspends as Waiting; lock denial at every
    /// stable copy suspends as Blocked.
    fn read_variable(
        &mut self,
        name: &str,
        variable: VariableId,
        operation: &Operation,
        now: Tick,
        directory: &mut SiteDirectory,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let stable = directory.sites_with_variable(variable, Some(SiteState::Stable));
        if stable.is_empty() {
            return self.suspend(name, operation, SuspendKind::Waiting, now, events);
        }

        for site_id in stable {
            let txn = self
                .txns
                .get(name)
                .ok_or_else(|| ProtocolError::UnknownTransaction(name.to_string()))?;
            if directory.site_mut(site_id)?.try_read_lock(txn, variable)? {
                let value = directory.site(site_id)?.read(txn, variable)?;
                let txn = self
                    .txns
                    .get_mut(name)
                    .ok_or_else(|| ProtocolError::UnknownTransaction(name.to_string()))?;
                txn.record_visit(site_id, now);
                txn.resume();
                events.record(
                    now,
                    Event::Read {
                        txn: name.to_string(),
                        variable,
                        value,
                        site: site_id,
                    },
                );
                return Ok(());
            }
        }

        self.suspend(name, operation, SuspendKind::Blocked, now, events)
    }

    /// Write protocol: a write lock is required at every stable copy. A
    /// partial grant suspends the transaction but keeps the locks already
    /// granted; they are reused when the buffered write reruns.
    fn write_variable(
        &mut self,
        name: &str,
        variable: VariableId,
        value: i64,
        operation: &Operation,
        now: Tick,
        directory: &mut SiteDirectory,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let stable = directory.sites_with_variable(variable, Some(SiteState::Stable));
        if stable.is_empty() {
            return self.suspend(name, operation, SuspendKind::Waiting, now, events);
        }

        let mut locked_all = true;
        for &site_id in &stable {
            if directory.site_mut(site_id)?.try_write_lock(name, variable)? {
                if let Some(txn) = self.txns.get_mut(name) {
                    txn.record_visit(site_id, now);
                }
            } else {
                locked_all = false;
            }
        }

        if !locked_all {
            return self.suspend(name, operation, SuspendKind::Blocked, now, events);
        }

        if let Some(txn) = self.txns.get_mut(name) {
            txn.resume();
        }
        for &site_id in &stable {
            directory.site_mut(site_id)?.write(variable, value)?;
        }
        events.record(
            now,
            Event::Write {
                txn: name.to_string(),
                variable,
                value,
                sites: stable,
            },
        );
        Ok(())
    }

    /// End protocol: a read-only transaction defers while a visited site is
    /// down; otherwise the transaction commits iff it is read-only or every
    /// visited site has been stable continuously since its first touch.
    fn end_transaction(
        &mut self,
        name: &str,
        operation: &Operation,
        now: Tick,
        directory: &mut SiteDirectory,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let txn = self
            .txns
            .get(name)
            .ok_or_else(|| ProtocolError::UnknownTransaction(name.to_string()))?;

        if txn.is_read_only() {
            let down_visited = txn
                .sites_visited()
                .keys()
                .any(|&s| directory.site(s).map_or(true, |site| site.state() != SiteState::Stable));
            if down_visited {
                return self.suspend(name, operation, SuspendKind::Waiting, now, events);
            }
        }

        if self.can_commit(txn, directory) {
            self.commit(name, now, directory, events)?;
        } else {
            self.abort(name, now, directory, events)?;
        }

        // Released locks may unblock other transactions immediately.
        self.rerun_suspended(now, directory, events)
    }

    /// Commit rule: read-only always; read-write iff every visited site is
    /// stable and has been up since before the transaction's first touch.
    fn can_commit(&self, txn: &Transaction, directory: &SiteDirectory) -> bool {
        if txn.is_read_only() {
            return true;
        }
        txn.sites_visited().iter().all(|(&site_id, &first_touch)| {
            directory.site(site_id).is_ok_and(|site| {
                site.state() == SiteState::Stable && site.up_since() <= first_touch
            })
        })
    }

    fn commit(
        &mut self,
        name: &str,
        now: Tick,
        directory: &mut SiteDirectory,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let txn = self
            .txns
            .get_mut(name)
            .ok_or_else(|| ProtocolError::UnknownTransaction(name.to_string()))?;
        txn.commit(now);
        debug!(txn = name, tick = now.0, "transaction committed");

        let visited: Vec<_> = txn.sites_visited().keys().copied().collect();
        for site_id in visited {
            let site = directory.site_mut(site_id)?;
            if site.state() == SiteState::Stable {
                site.commit_writes(name, now)?;
                site.release_locks(name);
            }
        }
        events.record(now, Event::Committed { txn: name.to_string() });
        Ok(())
    }

    fn abort(
        &mut self,
        name: &str,
        now: Tick,
        directory: &mut SiteDirectory,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let txn = self
            .txns
            .get_mut(name)
            .ok_or_else(|| ProtocolError::UnknownTransaction(name.to_string()))?;
        txn.abort(now);
        debug!(txn = name, tick = now.0, "transaction aborted at end");

        let visited: Vec<_> = txn.sites_visited().keys().copied().collect();
        for site_id in visited {
            let site = directory.site_mut(site_id)?;
            if site.state() == SiteState::Stable {
                site.release_locks(name);
            }
        }
        events.record(
            now,
            Event::Aborted {
                txn: name.to_string(),
                reason: AbortReason::SiteFailure,
            },
        );
        Ok(())
    }

    /// Buffers the operation and suspends its transaction. Only the first
    /// suspension of an operation is announced; reruns that stay stuck are
    /// silent.
    fn suspend(
        &mut self,
        name: &str,
        operation: &Operation,
        kind: SuspendKind,
        now: Tick,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let txn = self
            .txns
            .get_mut(name)
            .ok_or_else(|| ProtocolError::UnknownTransaction(name.to_string()))?;
        let first = txn.buffered().is_none();
        txn.suspend(operation.clone(), kind, now);
        if first {
            debug!(txn = name, op = %operation, ?kind, "operation buffered");
            events.record(
                now,
                Event::Suspended {
                    txn: name.to_string(),
                    kind,
                },
            );
        }
        Ok(())
    }
}
