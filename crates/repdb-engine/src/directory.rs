//! Site directory: owns every site and executes site-administrative
//! operations (fail/recover/dump).

use crate::site::Site;
use crate::variable::Variable;
use repdb_common::error::{ProtocolError, Result};
use repdb_common::event::{Event, EventSink};
use repdb_common::types::{DumpScope, Operation, SiteId, SiteState, Tick, VariableId};
use repdb_common::SimConfig;
use tracing::warn;

/// All sites, indexed by ascending id. The "available copies" primitive
/// the whole protocol is built on is `sites_with_variable` filtered to
/// stable sites.
#[derive(Debug)]
pub struct SiteDirectory {
    sites: Vec<Site>,
}

impl SiteDirectory {
    /// Instantiates every site with its copies of the variables: even-id
    /// variables everywhere, odd-id variables at their home site only.
    pub fn new(config: &SimConfig, created: Tick) -> Self {
        let sites = (1..=config.sites)
            .map(|sid| {
                let site = SiteId(sid);
                let data = (1..=config.variables)
                    .map(VariableId)
                    .filter(|v| v.hosted_at(site))
                    .map(|v| Variable::new(v, created, config.initial_value(v)))
                    .collect();
                Site::new(site, data)
            })
            .collect();
        Self { sites }
    }

    pub fn site(&self, id: SiteId) -> Result<&Site> {
        self.sites
            .iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| ProtocolError::UnknownSite(id).into())
    }

    pub fn site_mut(&mut self, id: SiteId) -> Result<&mut Site> {
        self.sites
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or_else(|| ProtocolError::UnknownSite(id).into())
    }

    /// Sites hosting `variable`, in ascending id order, optionally limited
    /// to one operational state.
    pub fn sites_with_variable(
        &self,
        variable: VariableId,
        state: Option<SiteState>,
    ) -> Vec<SiteId> {
        self.sites
            .iter()
            .filter(|s| s.hosts(variable))
            .filter(|s| state.map_or(true, |st| s.state() == st))
            .map(|s| s.id())
            .collect()
    }

    /// Executes one site-administrative operation.
    pub fn execute(
        &mut self,
        operation: &Operation,
        now: Tick,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        match operation {
            Operation::Fail(site) => self.fail(*site, now, events),
            Operation::Recover(site) => self.recover(*site, now, events),
            Operation::Dump(scope) => self.dump(*scope, now, events),
            other => {
                warn!(%other, "non-administrative operation routed to site directory");
                Ok(())
            }
        }
    }

    fn fail(&mut self, id: SiteId, now: Tick, events: &mut dyn EventSink) -> Result<()> {
        let site = self.site_mut(id)?;
        if site.state() != SiteState::Stable {
            return Err(ProtocolError::SiteAlreadyFailed(id).into());
        }
        site.fail();
        events.record(now, Event::SiteFailed(id));
        Ok(())
    }

    fn recover(&mut self, id: SiteId, now: Tick, events: &mut dyn EventSink) -> Result<()> {
        let site = self.site_mut(id)?;
        if site.state() != SiteState::Failed {
            return Err(ProtocolError::SiteNotFailed(id).into());
        }
        site.recover(now);
        events.record(now, Event::SiteRecovered(id));
        Ok(())
    }

    /// Reports committed values: every site, one site, or one variable at
    /// every site hosting it.
    fn dump(&self, scope: DumpScope, now: Tick, events: &mut dyn EventSink) -> Result<()> {
        let (sites, filter): (Vec<&Site>, Option<VariableId>) = match scope {
            DumpScope::All => (self.sites.iter().collect(), None),
            DumpScope::Site(id) => (vec![self.site(id)?], None),
            DumpScope::Variable(v) => (
                self.sites.iter().filter(|s| s.hosts(v)).collect(),
                Some(v),
            ),
        };

        for site in sites {
            events.record(
                now,
                Event::DumpSite {
                    site: site.id(),
                    state: site.state(),
                    values: site.dump(filter),
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repdb_common::event::MemorySink;

    fn directory() -> SiteDirectory {
        SiteDirectory::new(&SimConfig::default(), Tick(0))
    }

    #[test]
    fn test_variable_placement() {
        let dir = directory();

        // Replicated x2 is everywhere.
        assert_eq!(dir.sites_with_variable(VariableId(2), None).len(), 10);

        // Unique x3 lives only at site 4.
        assert_eq!(
            dir.sites_with_variable(VariableId(3), None),
            vec![SiteId(4)]
        );
    }

    #[test]
    fn test_stable_filter_excludes_failed_sites() {
        let mut dir = directory();
        let mut sink = MemorySink::new();
        dir.execute(&Operation::Fail(SiteId(4)), Tick(1), &mut sink)
            .unwrap();

        assert!(dir
            .sites_with_variable(VariableId(3), Some(SiteState::Stable))
            .is_empty());
        assert_eq!(
            dir.sites_with_variable(VariableId(2), Some(SiteState::Stable))
                .len(),
            9
        );
        assert!(sink.contains(&Event::SiteFailed(SiteId(4))));
    }

    #[test]
    fn test_fail_and_recover_validate_current_state() {
        let mut dir = directory();
        let mut sink = MemorySink::new();

        assert!(dir
            .execute(&Operation::Recover(SiteId(1)), Tick(1), &mut sink)
            .is_err());
        dir.execute(&Operation::Fail(SiteId(1)), Tick(1), &mut sink)
            .unwrap();
        assert!(dir
            .execute(&Operation::Fail(SiteId(1)), Tick(2), &mut sink)
            .is_err());
        dir.execute(&Operation::Recover(SiteId(1)), Tick(3), &mut sink)
            .unwrap();
        assert_eq!(dir.site(SiteId(1)).unwrap().up_since(), Tick(3));
    }

    #[test]
    fn test_dump_modes() {
        let mut dir = directory();
        let mut sink = MemorySink::new();

        dir.execute(
            &Operation::Dump(DumpScope::Variable(VariableId(3))),
            Tick(1),
            &mut sink,
        )
        .unwrap();
        assert_eq!(
            sink.events(),
            &[(
                Tick(1),
                Event::DumpSite {
                    site: SiteId(4),
                    state: SiteState::Stable,
                    values: vec![(VariableId(3), 30)],
                }
            )]
        );

        let mut sink = MemorySink::new();
        dir.execute(&Operation::Dump(DumpScope::All), Tick(2), &mut sink)
            .unwrap();
        assert_eq!(sink.events().len(), 10);

        let mut sink = MemorySink::new();
        dir.execute(
            &Operation::Dump(DumpScope::Site(SiteId(1))),
            Tick(3),
            &mut sink,
        )
        .unwrap();
        // Site 1: ten even variables plus x1 and x11.
        match &sink.events()[0].1 {
            Event::DumpSite { site, values, .. } => {
                assert_eq!(*site, SiteId(1));
                assert_eq!(values.len(), 12);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
