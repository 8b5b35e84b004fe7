//! Core types for the simulation engine

use std::fmt;

use serde::{Deserialize, Serialize};

/// Seconds per hour, used for all hourly-rate conversions
pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// Resource allocation granted (or requested) for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    /// No allocation
    #[default]
    None,
    /// Preemptible allocation
    Spot,
    /// Guaranteed allocation
    OnDemand,
}

impl ClusterType {
    /// Whether this allocation performs work
    pub fn is_running(self) -> bool {
        self != ClusterType::None
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClusterType::None => "none",
            ClusterType::Spot => "spot",
            ClusterType::OnDemand => "on_demand",
        };
        f.write_str(name)
    }
}

/// Hourly prices per allocation type
///
/// Defaults are for a single-V100 instance (p3.2xlarge, us-west-2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTable {
    /// Spot price ($/hr)
    pub spot_per_hour: f64,
    /// On-demand price ($/hr)
    pub on_demand_per_hour: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        PriceTable {
            spot_per_hour: 0.9731,
            on_demand_per_hour: 3.06,
        }
    }
}

impl PriceTable {
    /// Hourly rate for a cluster type (`None` is free)
    pub fn rate(&self, cluster_type: ClusterType) -> f64 {
        match cluster_type {
            ClusterType::None => 0.0,
            ClusterType::Spot => self.spot_per_hour,
            ClusterType::OnDemand => self.on_demand_per_hour,
        }
    }

    /// Cost of holding `cluster_type` for one tick of `gap_seconds`
    pub fn tick_cost(&self, cluster_type: ClusterType, gap_seconds: u64) -> f64 {
        self.rate(cluster_type) * gap_seconds as f64 / SECONDS_PER_HOUR
    }
}
