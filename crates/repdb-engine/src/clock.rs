//! Process-wide logical clock.

use repdb_common::types::Tick;

/// Monotonic tick counter. Timestamps transaction starts and ends, site
/// recoveries, and variable commits. Nothing else mutates it.
#[derive(Debug, Default)]
pub struct Clock {
    now: Tick,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    /// Advances time by one tick. Called once per input batch.
    pub fn tick(&mut self) {
        self.now = self.now.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_starts_at_zero_and_increments() {
        let mut clock = Clock::new();
        assert_eq!(clock.now(), Tick(0));
        clock.tick();
        clock.tick();
        assert_eq!(clock.now(), Tick(2));
    }
}
