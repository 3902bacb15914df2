//! Per-site lock table.
//!
//! Strict two-phase locking with two modes and no wait queue: a denied
//! request is conveyed by return value and the coordinator buffers the
//! operation. Locks are held until the owning transaction commits or
//! aborts, or until the site fails (which discards the whole table).

use crate::transaction::Transaction;
use crate::variable::Variable;
use repdb_common::types::VariableId;

/// Lock modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Shared; any number of transactions may hold one on a variable
    Read,
    /// Exclusive; no other lock of either kind may coexist
    Write,
}

/// A lock held at this site by one transaction on one variable.
#[derive(Debug, Clone)]
pub struct Lock {
    pub kind: LockKind,
    pub txn: String,
    pub variable: VariableId,
}

/// Lock table for a single site.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Vec<Lock>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to take a read lock for `txn` on `var`.
    ///
    /// Denied while the copy is unreadable. Read-only transactions read
    /// their snapshot without locking, so a readable copy is an automatic
    /// grant for them. A transaction already holding any lock on the
    /// variable keeps it (idempotent); a foreign write lock denies.
    pub fn acquire_read(&mut self, txn: &Transaction, var: &Variable) -> bool {
        if !var.is_readable() {
            return false;
        }

        if txn.is_read_only() {
            return true;
        }

        let held = self.locks.iter().filter(|l| l.variable == var.id());
        let mut foreign_write = false;
        for lock in held {
            if lock.txn == txn.name() {
                return true;
            }
            if lock.kind == LockKind::Write {
                foreign_write = true;
            }
        }
        if foreign_write {
            return false;
        }

        self.locks.push(Lock {
            kind: LockKind::Read,
            txn: txn.name().to_string(),
            variable: var.id(),
        });
        true
    }

    /// Tries to take a write lock for `txn` on `variable`.
    ///
    /// Any lock held by another transaction denies. A lock the transaction
    /// already holds is upgraded in place.
    pub fn acquire_write(&mut self, txn: &str, variable: VariableId) -> bool {
        if self
            .locks
            .iter()
            .any(|l| l.variable == variable && l.txn != txn)
        {
            return false;
        }

        if let Some(own) = self
            .locks
            .iter_mut()
            .find(|l| l.variable == variable && l.txn == txn)
        {
            own.kind = LockKind::Write;
            return true;
        }

        self.locks.push(Lock {
            kind: LockKind::Write,
            txn: txn.to_string(),
            variable,
        });
        true
    }

    /// Whether `txn` holds a write lock on `variable` here.
    pub fn has_write(&self, txn: &str, variable: VariableId) -> bool {
        self.locks
            .iter()
            .any(|l| l.kind == LockKind::Write && l.variable == variable && l.txn == txn)
    }

    /// Variables `txn` holds write locks on, in acquisition order. This is
    /// the commit set at this site.
    pub fn write_locked_variables(&self, txn: &str) -> Vec<VariableId> {
        self.locks
            .iter()
            .filter(|l| l.kind == LockKind::Write && l.txn == txn)
            .map(|l| l.variable)
            .collect()
    }

    /// Transactions other than `txn` holding any lock on `variable`.
    /// Feeds the waits-for graph.
    pub fn blocking_transactions(&self, txn: &str, variable: VariableId) -> Vec<String> {
        self.locks
            .iter()
            .filter(|l| l.variable == variable && l.txn != txn)
            .map(|l| l.txn.clone())
            .collect()
    }

    /// Drops every lock owned by `txn`.
    pub fn release_all(&mut self, txn: &str) {
        self.locks.retain(|l| l.txn != txn);
    }

    #[cfg(test)]
    fn locks_on(&self, variable: VariableId) -> Vec<&Lock> {
        self.locks.iter().filter(|l| l.variable == variable).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repdb_common::types::Tick;

    fn rw(name: &str) -> Transaction {
        Transaction::new(name.to_string(), false, Tick(1))
    }

    fn ro(name: &str) -> Transaction {
        Transaction::new(name.to_string(), true, Tick(1))
    }

    fn var(id: u8) -> Variable {
        Variable::new(VariableId(id), Tick(0), 10 * id as i64)
    }

    #[test]
    fn test_read_locks_are_shared() {
        let mut lm = LockManager::new();
        let (t1, t2) = (rw("T1"), rw("T2"));
        let x = var(2);

        assert!(lm.acquire_read(&t1, &x));
        assert!(lm.acquire_read(&t2, &x));
        assert_eq!(lm.locks_on(VariableId(2)).len(), 2);
    }

    #[test]
    fn test_write_lock_excludes_everything() {
        let mut lm = LockManager::new();
        let (t1, t2) = (rw("T1"), rw("T2"));
        let x = var(2);

        assert!(lm.acquire_write("T1", VariableId(2)));
        assert!(!lm.acquire_write("T2", VariableId(2)));
        assert!(!lm.acquire_read(&t2, &x));
        // The holder's own requests stay granted.
        assert!(lm.acquire_read(&t1, &x));
        assert!(lm.acquire_write("T1", VariableId(2)));
    }

    #[test]
    fn test_read_lock_upgrades_in_place() {
        let mut lm = LockManager::new();
        let t1 = rw("T1");
        let x = var(4);

        assert!(lm.acquire_read(&t1, &x));
        assert!(lm.acquire_write("T1", VariableId(4)));
        assert_eq!(lm.locks_on(VariableId(4)).len(), 1);
        assert!(lm.has_write("T1", VariableId(4)));
    }

    #[test]
    fn test_foreign_read_lock_denies_upgrade() {
        let mut lm = LockManager::new();
        let (t1, t2) = (rw("T1"), rw("T2"));
        let x = var(4);

        assert!(lm.acquire_read(&t1, &x));
        assert!(lm.acquire_read(&t2, &x));
        assert!(!lm.acquire_write("T1", VariableId(4)));
    }

    #[test]
    fn test_unreadable_copy_denies_reads() {
        let mut lm = LockManager::new();
        let t1 = rw("T1");
        let mut x = var(2);
        x.mark_unreadable();

        assert!(!lm.acquire_read(&t1, &x));
        // Read-only transactions are gated by readability too.
        assert!(!lm.acquire_read(&ro("T2"), &x));
        // Writes are not; a fresh write is how the copy recovers.
        assert!(lm.acquire_write("T1", VariableId(2)));
    }

    #[test]
    fn test_read_only_transactions_take_no_lock() {
        let mut lm = LockManager::new();
        let x = var(2);

        assert!(lm.acquire_read(&ro("T1"), &x));
        assert!(lm.locks_on(VariableId(2)).is_empty());
        // So they never block a writer.
        assert!(lm.acquire_write("T2", VariableId(2)));
    }

    #[test]
    fn test_release_all_and_blocking_transactions() {
        let mut lm = LockManager::new();
        let (t1, t2) = (rw("T1"), rw("T2"));
        let x = var(2);

        assert!(lm.acquire_write("T1", VariableId(2)));
        assert!(lm.acquire_read(&t1, &var(3)));
        assert_eq!(
            lm.blocking_transactions("T2", VariableId(2)),
            vec!["T1".to_string()]
        );

        lm.release_all("T1");
        assert!(lm.blocking_transactions("T2", VariableId(2)).is_empty());
        assert!(lm.acquire_read(&t2, &x));
    }

    #[test]
    fn test_write_locked_variables_lists_commit_set() {
        let mut lm = LockManager::new();
        let t1 = rw("T1");

        assert!(lm.acquire_write("T1", VariableId(2)));
        assert!(lm.acquire_read(&t1, &var(3)));
        assert!(lm.acquire_write("T1", VariableId(6)));
        assert_eq!(
            lm.write_locked_variables("T1"),
            vec![VariableId(2), VariableId(6)]
        );
    }
}
