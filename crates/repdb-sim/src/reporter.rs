//! Console reporter: renders the engine's event stream as the
//! human-readable simulation transcript.

use repdb_common::event::{AbortReason, Event, EventSink, SuspendKind};
use repdb_common::types::Tick;
use std::io::Write;

/// Writes one line per event, prefixed with the logical tick.
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleReporter {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn render(event: &Event) -> String {
        match event {
            Event::Read {
                txn,
                variable,
                value,
                site,
            } => format!("{txn} reads {variable}={value} from {site}"),
            Event::Write {
                txn,
                variable,
                value,
                sites,
            } => {
                let ids: Vec<String> = sites.iter().map(|s| s.0.to_string()).collect();
                format!(
                    "{txn} writes {variable}={value} to sites [{}]",
                    ids.join(", ")
                )
            }
            Event::Suspended { txn, kind } => match kind {
                SuspendKind::Waiting => format!("{txn} waits (no available site)"),
                SuspendKind::Blocked => format!("{txn} is blocked"),
            },
            Event::Committed { txn } => format!("{txn} committed"),
            Event::Aborted { txn, reason } => match reason {
                AbortReason::SiteFailure => format!("{txn} aborted"),
                AbortReason::Deadlock => format!("{txn} aborted (deadlock)"),
            },
            Event::SiteFailed(site) => format!("{site} failed"),
            Event::SiteRecovered(site) => format!("{site} recovered"),
            Event::DumpSite {
                site,
                state,
                values,
            } => {
                let vals: Vec<String> = values
                    .iter()
                    .map(|(v, val)| format!("{v}={val}"))
                    .collect();
                format!("{site} ({state}): {}", vals.join(" "))
            }
        }
    }
}

impl<W: Write> EventSink for ConsoleReporter<W> {
    fn record(&mut self, tick: Tick, event: Event) {
        // A transcript write failure (closed pipe) is not a simulation
        // error; drop the line.
        let _ = writeln!(self.out, "{}: {}", tick, Self::render(&event));
    }
}
