//! Waits-for-graph deadlock detection.
//!
//! The graph is rebuilt on every invocation from the transaction table and
//! the stable sites' lock tables. While a cycle exists, the youngest
//! member (latest start tick) is aborted and the search repeats; the graph
//! strictly shrinks, so detection always terminates.

use crate::directory::SiteDirectory;
use crate::transaction::Transaction;
use repdb_common::error::Result;
use repdb_common::event::{AbortReason, Event, EventSink};
use repdb_common::types::{SiteState, Tick};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Directed waits-for graph keyed by transaction name. BTree storage keeps
/// traversal order deterministic.
#[derive(Debug, Default)]
pub struct WaitsForGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl WaitsForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `txn` is a vertex (a running transaction is an isolated
    /// node).
    pub fn add_vertex(&mut self, txn: &str) {
        self.edges.entry(txn.to_string()).or_default();
    }

    /// Adds waits-for edges from `txn` to each holder blocking it.
    pub fn add_edges(&mut self, txn: &str, holders: impl IntoIterator<Item = String>) {
        let neighbors = self.edges.entry(txn.to_string()).or_default();
        neighbors.extend(holders.into_iter().filter(|h| h != txn));
    }

    /// Removes a vertex and every edge pointing at it.
    pub fn remove(&mut self, txn: &str) {
        self.edges.remove(txn);
        for neighbors in self.edges.values_mut() {
            neighbors.remove(txn);
        }
    }

    /// Depth-first search from each vertex. The visited set is shared
    /// across the walk from one start vertex; the first walk that reaches
    /// an already-visited vertex reports its visited set as the cycle.
    pub fn find_cycle(&self) -> Option<BTreeSet<String>> {
        for start in self.edges.keys() {
            let mut visited = BTreeSet::new();
            visited.insert(start.clone());
            if self.walk(start, &mut visited) {
                return Some(visited);
            }
        }
        None
    }

    fn walk(&self, vertex: &str, visited: &mut BTreeSet<String>) -> bool {
        let Some(neighbors) = self.edges.get(vertex) else {
            return false;
        };
        for neighbor in neighbors {
            if visited.contains(neighbor) {
                return true;
            }
            visited.insert(neighbor.clone());
            if self.walk(neighbor, visited) {
                return true;
            }
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Builds the waits-for graph over all active transactions.
///
/// A suspended transaction waits for every holder of a blocking lock on
/// its buffered operation's variable, collected across every stable site
/// hosting that variable. A suspended `end` has no variable and stays an
/// isolated vertex.
fn build_graph(txns: &BTreeMap<String, Transaction>, directory: &SiteDirectory) -> WaitsForGraph {
    let mut graph = WaitsForGraph::new();
    for txn in txns.values().filter(|t| t.is_active()) {
        graph.add_vertex(txn.name());

        if !txn.is_suspended() {
            continue;
        }
        let Some(variable) = txn.buffered().and_then(|op| op.variable()) else {
            continue;
        };
        for site in directory.sites_with_variable(variable, Some(SiteState::Stable)) {
            if let Ok(s) = directory.site(site) {
                graph.add_edges(txn.name(), s.blocking_transactions(txn.name(), variable));
            }
        }
    }
    graph
}

/// Detects deadlocks and resolves each cycle by aborting its youngest
/// member until the graph is acyclic. Returns the victims in kill order.
pub fn detect_and_resolve(
    txns: &mut BTreeMap<String, Transaction>,
    directory: &mut SiteDirectory,
    now: Tick,
    events: &mut dyn EventSink,
) -> Result<Vec<String>> {
    let mut graph = build_graph(txns, directory);
    let mut victims = Vec::new();

    while let Some(cycle) = graph.find_cycle() {
        debug!(?cycle, "deadlock cycle found");
        // Youngest by start tick; on a tie (unreachable with well-formed
        // scripts) the lexicographically largest name wins.
        let Some(victim) = cycle
            .iter()
            .max_by_key(|name| txns.get(*name).map(|t| t.start_time()))
            .cloned()
        else {
            break;
        };

        kill(&victim, txns, directory, now, events)?;
        graph.remove(&victim);
        victims.push(victim);
    }

    Ok(victims)
}

/// Aborts a deadlock victim: terminal state, end tick, locks released at
/// every stable site it visited.
fn kill(
    victim: &str,
    txns: &mut BTreeMap<String, Transaction>,
    directory: &mut SiteDirectory,
    now: Tick,
    events: &mut dyn EventSink,
) -> Result<()> {
    let Some(txn) = txns.get_mut(victim) else {
        return Ok(());
    };
    info!(txn = victim, tick = now.0, "aborting deadlock victim");
    txn.abort(now);

    let visited: Vec<_> = txn.sites_visited().keys().copied().collect();
    for site_id in visited {
        let site = directory.site_mut(site_id)?;
        if site.state() == SiteState::Stable {
            site.release_locks(victim);
        }
    }

    events.record(
        now,
        Event::Aborted {
            txn: victim.to_string(),
            reason: AbortReason::Deadlock,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> WaitsForGraph {
        let mut g = WaitsForGraph::new();
        for (from, to) in edges {
            g.add_vertex(from);
            g.add_edges(from, to.iter().map(|s| s.to_string()));
        }
        g
    }

    #[test]
    fn test_no_cycle_in_a_chain() {
        let g = graph(&[("T1", &["T2"]), ("T2", &["T3"]), ("T3", &[])]);
        assert!(g.find_cycle().is_none());
    }

    #[test]
    fn test_two_cycle_is_found() {
        let g = graph(&[("T1", &["T2"]), ("T2", &["T1"])]);
        let cycle = g.find_cycle().unwrap();
        assert!(cycle.contains("T1") && cycle.contains("T2"));
    }

    #[test]
    fn test_self_edges_are_never_added() {
        let mut g = WaitsForGraph::new();
        g.add_edges("T1", vec!["T1".to_string()]);
        assert!(g.find_cycle().is_none());
    }

    #[test]
    fn test_remove_breaks_the_cycle() {
        let mut g = graph(&[("T1", &["T2"]), ("T2", &["T3"]), ("T3", &["T1"])]);
        assert!(g.find_cycle().is_some());
        g.remove("T2");
        assert!(g.find_cycle().is_none());
    }

    #[test]
    fn test_isolated_vertices_are_harmless() {
        let g = graph(&[("T1", &[]), ("T2", &[])]);
        assert!(g.find_cycle().is_none());
    }
}
