//! Simulation event stream.
//!
//! The engine never writes to the console. Everything a script observer
//! would care about (reads, commits, aborts, deadlock kills, dump output,
//! site transitions) is recorded as an `Event` against an injected
//! `EventSink`; the driver decides how to render it.

use crate::types::{SiteId, SiteState, Tick, VariableId};

/// Why a transaction was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A visited site failed between first touch and end
    SiteFailure,
    /// Killed as the youngest member of a deadlock cycle
    Deadlock,
}

/// How a transaction is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendKind {
    /// No stable site currently holds the needed variable
    Waiting,
    /// Stable sites exist but none would grant the needed lock
    Blocked,
}

/// One observable simulation event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Read {
        txn: String,
        variable: VariableId,
        value: i64,
        site: SiteId,
    },
    Write {
        txn: String,
        variable: VariableId,
        value: i64,
        sites: Vec<SiteId>,
    },
    Suspended {
        txn: String,
        kind: SuspendKind,
    },
    Committed {
        txn: String,
    },
    Aborted {
        txn: String,
        reason: AbortReason,
    },
    SiteFailed(SiteId),
    SiteRecovered(SiteId),
    /// One site's line of a dump report
    DumpSite {
        site: SiteId,
        state: SiteState,
        values: Vec<(VariableId, i64)>,
    },
}

/// Capability to record simulation events. Injected into the engine at
/// construction.
pub trait EventSink {
    fn record(&mut self, tick: Tick, event: Event);
}

/// Sink that drops every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _tick: Tick, _event: Event) {}
}

/// Sink that keeps every event in memory, for test assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Vec<(Tick, Event)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[(Tick, Event)] {
        &self.events
    }

    /// Events without their ticks, for order-only assertions.
    pub fn kinds(&self) -> Vec<&Event> {
        self.events.iter().map(|(_, e)| e).collect()
    }

    pub fn contains(&self, event: &Event) -> bool {
        self.events.iter().any(|(_, e)| e == event)
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, tick: Tick, event: Event) {
        self.events.push((tick, event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let mut sink = MemorySink::new();
        sink.record(Tick(1), Event::Committed { txn: "T1".into() });
        sink.record(
            Tick(2),
            Event::Aborted {
                txn: "T2".into(),
                reason: AbortReason::Deadlock,
            },
        );

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.events()[0].0, Tick(1));
        assert!(sink.contains(&Event::Committed { txn: "T1".into() }));
        assert!(!sink.contains(&Event::Committed { txn: "T2".into() }));
    }
}
