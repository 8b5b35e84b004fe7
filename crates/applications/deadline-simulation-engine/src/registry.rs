//! Name → policy lookup for the run driver
//!
//! The registry is a plain value built once at startup and handed to
//! whoever needs to resolve strategy names (the CLI, batch drivers, tests).

use std::collections::BTreeMap;

use crate::config::SimulationConfig;
use crate::error::{Result, SimError};
use crate::strategy::PolicyKind;

/// Builds a policy from the run configuration
pub type PolicyConstructor = fn(&SimulationConfig) -> PolicyKind;

/// Known strategies by name
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    entries: BTreeMap<&'static str, PolicyConstructor>,
}

fn on_demand(_: &SimulationConfig) -> PolicyKind {
    PolicyKind::OnDemand
}

fn strawman(_: &SimulationConfig) -> PolicyKind {
    PolicyKind::Strawman
}

fn ideal_no_overhead(_: &SimulationConfig) -> PolicyKind {
    PolicyKind::IdealNoOverhead
}

fn pair_amortize(config: &SimulationConfig) -> PolicyKind {
    PolicyKind::PairAmortize {
        pair_interval_hours: config.pair_interval_hours,
        use_average_gain: config.use_average_gain,
    }
}

impl PolicyRegistry {
    /// Registry of the built-in strategies
    pub fn builtin() -> Self {
        let entries: BTreeMap<&'static str, PolicyConstructor> = BTreeMap::from([
            ("on_demand", on_demand as PolicyConstructor),
            ("strawman", strawman as PolicyConstructor),
            ("ideal_no_overhead", ideal_no_overhead as PolicyConstructor),
            ("pair_amortize", pair_amortize as PolicyConstructor),
        ]);
        PolicyRegistry { entries }
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Build the policy registered under `name`
    pub fn resolve(&self, name: &str, config: &SimulationConfig) -> Result<PolicyKind> {
        let constructor = self.entries.get(name).ok_or_else(|| {
            SimError::config(format!(
                "unknown strategy '{}' (known: {})",
                name,
                self.names().join(", ")
            ))
        })?;
        Ok(constructor(config))
    }

    /// Resolve a comma-separated list of names, e.g. `"strawman,on_demand"`
    pub fn resolve_list(&self, names: &str, config: &SimulationConfig) -> Result<Vec<PolicyKind>> {
        let kinds = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| self.resolve(name, config))
            .collect::<Result<Vec<_>>>()?;

        if kinds.is_empty() {
            return Err(SimError::config("no strategies selected"));
        }
        Ok(kinds)
    }
}
