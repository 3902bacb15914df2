//! Simulation facade: owns the clock, site directory, and transaction
//! coordinator, and routes one batch of operations per logical tick.

use crate::clock::Clock;
use crate::coordinator::TransactionCoordinator;
use crate::directory::SiteDirectory;
use repdb_common::error::Result;
use repdb_common::event::EventSink;
use repdb_common::types::{Operation, Tick};
use repdb_common::SimConfig;

/// One deterministic simulation run. The driver feeds `step` one batch per
/// input line; the clock advances exactly once per batch and every
/// operation in the batch observes the same tick.
pub struct Simulation<S: EventSink> {
    clock: Clock,
    directory: SiteDirectory,
    coordinator: TransactionCoordinator,
    events: S,
}

impl<S: EventSink> Simulation<S> {
    pub fn new(config: &SimConfig, events: S) -> Self {
        let clock = Clock::new();
        let directory = SiteDirectory::new(config, clock.now());
        Self {
            clock,
            directory,
            coordinator: TransactionCoordinator::new(),
            events,
        }
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn directory(&self) -> &SiteDirectory {
        &self.directory
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn events(&self) -> &S {
        &self.events
    }

    /// Advances the clock and executes one batch: site-administrative
    /// operations go to the directory, everything else to the coordinator
    /// (which reruns suspended operations before the new ones).
    pub fn step(&mut self, batch: &[Operation]) -> Result<()> {
        self.clock.tick();
        let now = self.clock.now();

        for operation in batch.iter().filter(|op| op.is_site_op()) {
            self.directory.execute(operation, now, &mut self.events)?;
        }

        let txn_ops: Vec<Operation> = batch
            .iter()
            .filter(|op| !op.is_site_op())
            .cloned()
            .collect();
        self.coordinator
            .execute(&txn_ops, now, &mut self.directory, &mut self.events)
    }
}
