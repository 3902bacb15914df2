//! Configuration types for RepDB

use crate::types::VariableId;
use serde::{Deserialize, Serialize};

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of sites (ids 1..=sites)
    #[serde(default = "default_sites")]
    pub sites: u8,

    /// Number of variables (ids 1..=variables)
    #[serde(default = "default_variables")]
    pub variables: u8,
}

fn default_sites() -> u8 {
    10
}

fn default_variables() -> u8 {
    20
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sites: default_sites(),
            variables: default_variables(),
        }
    }
}

impl SimConfig {
    /// Value every variable is seeded with at construction.
    pub fn initial_value(&self, variable: VariableId) -> i64 {
        10 * variable.0 as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.sites, 10);
        assert_eq!(config.variables, 20);
        assert_eq!(config.initial_value(VariableId(7)), 70);
    }
}
