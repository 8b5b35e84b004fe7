//! Simulation configuration
//!
//! All durations are expressed in hours, the way operators think about
//! deadlines and job sizes. The engine works in seconds; use the `*_seconds`
//! accessors instead of converting by hand.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::types::{PriceTable, SECONDS_PER_HOUR};

/// Parameters shared by every strategy in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Hard wall-clock deadline
    pub deadline_hours: f64,
    /// Total work required
    pub task_duration_hours: f64,
    /// Cold-start cost of a newly (re)started allocation
    pub restart_overhead_hours: f64,
    /// Skip this much of the trace before tick 0
    pub start_offset_hours: f64,
    /// Pair width for the pair-amortizing strategy
    pub pair_interval_hours: f64,
    /// Carry the average per-pair gain instead of the cumulative gain
    pub use_average_gain: bool,
    /// Hourly prices
    pub prices: PriceTable,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            deadline_hours: 10.0,
            task_duration_hours: 5.0,
            restart_overhead_hours: 0.0,
            start_offset_hours: 0.0,
            pair_interval_hours: 1.0,
            use_average_gain: false,
            prices: PriceTable::default(),
        }
    }
}

impl SimulationConfig {
    /// Load a configuration from a JSON file (missing fields take defaults)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("deadline_hours", self.deadline_hours),
            ("task_duration_hours", self.task_duration_hours),
            ("restart_overhead_hours", self.restart_overhead_hours),
            ("start_offset_hours", self.start_offset_hours),
            ("pair_interval_hours", self.pair_interval_hours),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SimError::config(format!("{} must be finite, got {}", name, value)));
        }

        if self.deadline_hours <= 0.0 {
            return Err(SimError::config("deadline_hours must be > 0"));
        }
        if self.task_duration_hours <= 0.0 {
            return Err(SimError::config("task_duration_hours must be > 0"));
        }
        if self.restart_overhead_hours < 0.0 {
            return Err(SimError::config("restart_overhead_hours must be >= 0"));
        }
        if self.start_offset_hours < 0.0 {
            return Err(SimError::config("start_offset_hours must be >= 0"));
        }
        if self.pair_interval_hours <= 0.0 {
            return Err(SimError::config("pair_interval_hours must be > 0"));
        }
        if self.task_duration_hours > self.deadline_hours {
            return Err(SimError::config(format!(
                "task_duration_hours ({}) exceeds deadline_hours ({})",
                self.task_duration_hours, self.deadline_hours
            )));
        }

        let prices = &self.prices;
        if !(prices.spot_per_hour >= 0.0 && prices.spot_per_hour <= prices.on_demand_per_hour) {
            return Err(SimError::config(format!(
                "prices must satisfy 0 <= spot ({}) <= on-demand ({})",
                prices.spot_per_hour, prices.on_demand_per_hour
            )));
        }

        Ok(())
    }

    pub fn deadline_seconds(&self) -> f64 {
        self.deadline_hours * SECONDS_PER_HOUR
    }

    pub fn task_duration_seconds(&self) -> f64 {
        self.task_duration_hours * SECONDS_PER_HOUR
    }

    pub fn restart_overhead_seconds(&self) -> f64 {
        self.restart_overhead_hours * SECONDS_PER_HOUR
    }

    pub fn pair_interval_seconds(&self) -> f64 {
        self.pair_interval_hours * SECONDS_PER_HOUR
    }

    /// Start offset in whole ticks (rounded down)
    pub fn start_offset_ticks(&self, gap_seconds: u64) -> usize {
        (self.start_offset_hours * SECONDS_PER_HOUR / gap_seconds as f64).floor() as usize
    }
}
