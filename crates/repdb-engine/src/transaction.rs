//! Transaction entity and lifecycle state machine.

use repdb_common::event::SuspendKind;
use repdb_common::types::{Operation, SiteId, Tick};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle states. `Waiting` and `Blocked` are resolved the same way
/// (rerun the buffered operation); they are tagged separately only for
/// observability. `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Running,
    /// No stable site currently holds the needed variable
    Waiting,
    /// Stable sites exist but none granted the needed lock
    Blocked,
    Committed,
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Running => "running",
            TransactionState::Waiting => "waiting",
            TransactionState::Blocked => "blocked",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// One transaction known to the coordinator.
///
/// Sites are tracked by id and transactions by name throughout the engine,
/// so there are no object cycles between the transaction table and the
/// site directory.
#[derive(Debug)]
pub struct Transaction {
    name: String,
    read_only: bool,
    state: TransactionState,
    start_time: Tick,
    end_time: Option<Tick>,
    /// When the currently buffered operation first suspended.
    wait_since: Option<Tick>,
    /// The single outstanding operation, present iff suspended.
    buffered: Option<Operation>,
    /// Sites touched, with the tick of the first touch.
    sites_visited: BTreeMap<SiteId, Tick>,
}

impl Transaction {
    pub fn new(name: String, read_only: bool, start_time: Tick) -> Self {
        Self {
            name,
            read_only,
            state: TransactionState::Running,
            start_time,
            end_time: None,
            wait_since: None,
            buffered: None,
            sites_visited: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn start_time(&self) -> Tick {
        self.start_time
    }

    pub fn end_time(&self) -> Option<Tick> {
        self.end_time
    }

    pub fn wait_since(&self) -> Option<Tick> {
        self.wait_since
    }

    pub fn buffered(&self) -> Option<&Operation> {
        self.buffered.as_ref()
    }

    /// Running, Waiting, or Blocked: participates in deadlock detection.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            TransactionState::Running | TransactionState::Waiting | TransactionState::Blocked
        )
    }

    /// Waiting or Blocked: has a buffered operation to rerun.
    pub fn is_suspended(&self) -> bool {
        matches!(
            self.state,
            TransactionState::Waiting | TransactionState::Blocked
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            TransactionState::Committed | TransactionState::Aborted
        )
    }

    /// Buffers `operation` and suspends. A rerun of an already-buffered
    /// operation that suspends again keeps the original wait start (so
    /// waiters keep their place in the rerun order) and the original
    /// state tag.
    pub fn suspend(&mut self, operation: Operation, kind: SuspendKind, now: Tick) {
        if self.buffered.is_none() {
            self.buffered = Some(operation);
            self.wait_since = Some(now);
            self.state = match kind {
                SuspendKind::Waiting => TransactionState::Waiting,
                SuspendKind::Blocked => TransactionState::Blocked,
            };
        }
    }

    /// Clears the buffer after the suspended operation finally succeeded.
    pub fn resume(&mut self) {
        self.buffered = None;
        self.wait_since = None;
        self.state = TransactionState::Running;
    }

    pub fn commit(&mut self, now: Tick) {
        self.buffered = None;
        self.wait_since = None;
        self.end_time = Some(now);
        self.state = TransactionState::Committed;
    }

    pub fn abort(&mut self, now: Tick) {
        self.buffered = None;
        self.wait_since = None;
        self.end_time = Some(now);
        self.state = TransactionState::Aborted;
    }

    /// Records the first touch of a site; later touches keep the original
    /// tick, which is what the commit check compares against `up_since`.
    pub fn record_visit(&mut self, site: SiteId, now: Tick) {
        self.sites_visited.entry(site).or_insert(now);
    }

    pub fn sites_visited(&self) -> &BTreeMap<SiteId, Tick> {
        &self.sites_visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn() -> Transaction {
        Transaction::new("T1".into(), false, Tick(1))
    }

    #[test]
    fn test_suspend_keeps_original_wait_start_and_tag() {
        let mut t = txn();
        let op = Operation::End { txn: "T1".into() };

        t.suspend(op.clone(), SuspendKind::Blocked, Tick(2));
        assert_eq!(t.state(), TransactionState::Blocked);
        assert_eq!(t.wait_since(), Some(Tick(2)));

        // Rerun at tick 5 suspends again: buffer, wait start, and the
        // state tag all stay as first recorded.
        t.suspend(op.clone(), SuspendKind::Waiting, Tick(5));
        assert_eq!(t.state(), TransactionState::Blocked);
        assert_eq!(t.wait_since(), Some(Tick(2)));
        assert_eq!(t.buffered(), Some(&op));
    }

    #[test]
    fn test_buffer_iff_suspended() {
        let mut t = txn();
        assert!(t.buffered().is_none());

        t.suspend(
            Operation::End { txn: "T1".into() },
            SuspendKind::Waiting,
            Tick(2),
        );
        assert!(t.buffered().is_some() && t.is_suspended());

        t.resume();
        assert!(t.buffered().is_none());
        assert_eq!(t.state(), TransactionState::Running);

        t.suspend(
            Operation::End { txn: "T1".into() },
            SuspendKind::Blocked,
            Tick(3),
        );
        t.abort(Tick(4));
        assert!(t.buffered().is_none());
        assert!(t.is_terminal());
        assert_eq!(t.end_time(), Some(Tick(4)));
    }

    #[test]
    fn test_record_visit_is_first_touch_only() {
        let mut t = txn();
        t.record_visit(SiteId(3), Tick(2));
        t.record_visit(SiteId(3), Tick(9));
        assert_eq!(t.sites_visited().get(&SiteId(3)), Some(&Tick(2)));
    }
}
