//! Core types for RepDB

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Logical time. Advanced only by the clock, one tick per input batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

impl Tick {
    pub fn next(&self) -> Tick {
        Tick(self.0 + 1)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "time {}", self.0)
    }
}

/// Unique identifier for a site (1..=10)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SiteId(pub u8);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site {}", self.0)
    }
}

/// Unique identifier for a variable (1..=20)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VariableId(pub u8);

impl VariableId {
    /// Even-id variables are stored at every site.
    pub fn is_replicated(&self) -> bool {
        self.0 % 2 == 0
    }

    /// The one site hosting an odd-id variable.
    pub fn home_site(&self) -> SiteId {
        SiteId(1 + self.0 % 10)
    }

    /// Whether this variable is hosted at the given site.
    pub fn hosted_at(&self, site: SiteId) -> bool {
        self.is_replicated() || self.home_site() == site
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Parses the textual form `x<id>`. Range checking against the configured
/// variable count is the caller's job; only the shape is validated here.
impl FromStr for VariableId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('x').or_else(|| s.strip_prefix('X')).ok_or(())?;
        let id: u8 = digits.parse().map_err(|_| ())?;
        if id == 0 {
            return Err(());
        }
        Ok(VariableId(id))
    }
}

// ============================================================================
// Site state
// ============================================================================

/// Operational state of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteState {
    /// Up and participating in the available-copies protocol
    Stable,
    /// Down; no locking, reading, or writing until recovery
    Failed,
}

impl fmt::Display for SiteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteState::Stable => write!(f, "stable"),
            SiteState::Failed => write!(f, "failed"),
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

/// What a `dump` operation reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpScope {
    /// Every variable at every site
    All,
    /// Every variable at one site
    Site(SiteId),
    /// One variable at every site hosting it
    Variable(VariableId),
}

/// One pre-validated operation from the simulation script.
///
/// Produced by the parser, consumed (never mutated) by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Start a read-write transaction
    Begin { txn: String },
    /// Start a read-only (snapshot) transaction
    BeginRo { txn: String },
    /// Read a variable under a transaction
    Read { txn: String, variable: VariableId },
    /// Write a value to a variable under a transaction
    Write {
        txn: String,
        variable: VariableId,
        value: i64,
    },
    /// Commit or abort a transaction
    End { txn: String },
    /// Report committed state
    Dump(DumpScope),
    /// Take a site down
    Fail(SiteId),
    /// Bring a site back up
    Recover(SiteId),
}

impl Operation {
    /// Site-administrative operations are routed to the site directory,
    /// everything else to the transaction coordinator.
    pub fn is_site_op(&self) -> bool {
        matches!(
            self,
            Operation::Dump(_) | Operation::Fail(_) | Operation::Recover(_)
        )
    }

    /// The transaction this operation belongs to, if any.
    pub fn txn(&self) -> Option<&str> {
        match self {
            Operation::Begin { txn }
            | Operation::BeginRo { txn }
            | Operation::Read { txn, .. }
            | Operation::Write { txn, .. }
            | Operation::End { txn } => Some(txn),
            _ => None,
        }
    }

    /// The variable this operation touches, if any.
    pub fn variable(&self) -> Option<VariableId> {
        match self {
            Operation::Read { variable, .. } | Operation::Write { variable, .. } => {
                Some(*variable)
            }
            Operation::Dump(DumpScope::Variable(v)) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Begin { txn } => write!(f, "begin({txn})"),
            Operation::BeginRo { txn } => write!(f, "beginRO({txn})"),
            Operation::Read { txn, variable } => write!(f, "R({txn},{variable})"),
            Operation::Write {
                txn,
                variable,
                value,
            } => write!(f, "W({txn},{variable},{value})"),
            Operation::End { txn } => write!(f, "end({txn})"),
            Operation::Dump(DumpScope::All) => write!(f, "dump()"),
            Operation::Dump(DumpScope::Site(s)) => write!(f, "dump({})", s.0),
            Operation::Dump(DumpScope::Variable(v)) => write!(f, "dump({v})"),
            Operation::Fail(s) => write!(f, "fail({})", s.0),
            Operation::Recover(s) => write!(f, "recover({})", s.0),
        }
    }
}
