//! # RepDB Engine
//!
//! The concurrency-control and recovery engine for a simulated replicated,
//! partitioned database:
//!
//! - Strict two-phase locking per site, multiversion snapshot reads for
//!   read-only transactions
//! - The available-copies protocol: only stable sites are consulted for
//!   locking, reading, writing, and commit
//! - Site failure and recovery, with replicated copies untrusted until
//!   they receive a fresh committed write
//! - Waits-for-graph deadlock detection, aborting the youngest cycle
//!   member
//!
//! Execution is single-threaded and deterministic: "blocking" is modeled
//! by buffering the operation on its transaction, never by suspending a
//! thread.

pub mod clock;
pub mod coordinator;
pub mod deadlock;
pub mod directory;
pub mod lock_manager;
pub mod sim;
pub mod site;
pub mod transaction;
pub mod variable;

pub use clock::Clock;
pub use coordinator::TransactionCoordinator;
pub use deadlock::{detect_and_resolve, WaitsForGraph};
pub use directory::SiteDirectory;
pub use lock_manager::{Lock, LockKind, LockManager};
pub use sim::Simulation;
pub use site::Site;
pub use transaction::{Transaction, TransactionState};
pub use variable::Variable;
