//! Trace-replaying environment
//!
//! The environment owns the tick counter, the currently granted cluster type
//! and the per-tick billing history. Strategies drive it with an
//! observe/step protocol:
//!
//! ```text
//!   AWAITING_OBSERVE ── observe() ──▶ OBSERVED ── step(request) ──▶ AWAITING_OBSERVE
//!        (observed_tick == tick - 1)     (observed_tick == tick)        (tick += 1)
//! ```
//!
//! `observe()` settles the tick that just elapsed: it appends the type that
//! was held to the history, bills it, and applies an involuntary preemption
//! if spot capacity disappeared at the boundary.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, SimError};
use crate::trace::Trace;
use crate::types::{ClusterType, PriceTable};

/// Discrete-time environment bound to one trace
#[derive(Debug, Clone)]
pub struct Environment {
    trace: Arc<Trace>,
    start_offset: usize,
    prices: PriceTable,
    gap_seconds: u64,

    tick: u64,
    observed_tick: i64,
    cluster_type: ClusterType,
    history: Vec<ClusterType>,

    accumulated_cost: f64,
    preemptions: usize,
}

impl Environment {
    /// Create an environment replaying `trace` from tick `start_offset`
    pub fn new(trace: Arc<Trace>, start_offset: usize, prices: PriceTable) -> Self {
        let gap_seconds = trace.gap_seconds();
        Environment {
            trace,
            start_offset,
            prices,
            gap_seconds,
            tick: 0,
            observed_tick: -1,
            cluster_type: ClusterType::None,
            history: Vec::new(),
            accumulated_cost: 0.0,
            preemptions: 0,
        }
    }

    /// Rebind to another trace with the same gap width and start over
    pub fn reset(&mut self, trace: Arc<Trace>) -> Result<()> {
        if trace.gap_seconds() != self.gap_seconds {
            return Err(SimError::invariant(format!(
                "cannot reset environment with gap {}s onto a trace with gap {}s",
                self.gap_seconds,
                trace.gap_seconds()
            )));
        }
        self.trace = trace;
        self.tick = 0;
        self.observed_tick = -1;
        self.cluster_type = ClusterType::None;
        self.history.clear();
        self.accumulated_cost = 0.0;
        self.preemptions = 0;
        Ok(())
    }

    /// Tick about to be decided
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Whether `observe()` has already run for the current tick
    pub fn is_observed(&self) -> bool {
        self.observed_tick == self.tick as i64
    }

    pub fn gap_seconds(&self) -> u64 {
        self.gap_seconds
    }

    /// Currently granted type (after any preemption downgrade)
    pub fn cluster_type(&self) -> ClusterType {
        self.cluster_type
    }

    /// Type held during each completed (observed) tick
    pub fn history(&self) -> &[ClusterType] {
        &self.history
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    /// Number of involuntary spot preemptions so far
    pub fn preemptions(&self) -> usize {
        self.preemptions
    }

    /// Wall-clock time elapsed since tick 0
    pub fn elapsed_seconds(&self) -> f64 {
        (self.tick * self.gap_seconds) as f64
    }

    /// Cost billed for all observed ticks
    pub fn accumulated_cost(&self) -> f64 {
        self.accumulated_cost
    }

    /// Cost recomputed from scratch over the history
    pub fn recompute_cost(&self) -> f64 {
        self.history
            .iter()
            .map(|&cluster_type| self.prices.tick_cost(cluster_type, self.gap_seconds))
            .sum()
    }

    /// Whether spot capacity is available for the current tick
    pub fn spot_available(&self) -> Result<bool> {
        self.trace
            .is_available(self.start_offset + self.tick as usize)
    }

    /// Number of spot-available ticks that end no later than `seconds`
    pub fn spot_ticks_before(&self, seconds: f64) -> Result<usize> {
        let ticks = (seconds / self.gap_seconds as f64).floor() as usize;
        self.trace
            .spot_ticks(self.start_offset..self.start_offset + ticks)
    }

    /// Reveal the tick that just elapsed
    ///
    /// # Returns
    /// `(cluster type held during the elapsed tick, spot available for the next tick)`
    ///
    /// # Errors
    /// - `Invariant` if the current tick was already observed
    /// - `Range` if the trace has no tick left to reveal; the elapsed tick
    ///   is still appended to the history and billed
    pub fn observe(&mut self) -> Result<(ClusterType, bool)> {
        if self.observed_tick != self.tick as i64 - 1 {
            return Err(SimError::invariant(format!(
                "observe() called twice for tick {}",
                self.tick
            )));
        }

        let last_cluster_type = self.cluster_type;
        if self.tick > 0 {
            self.history.push(last_cluster_type);
            self.accumulated_cost += self.prices.tick_cost(last_cluster_type, self.gap_seconds);
        }
        self.observed_tick = self.tick as i64;

        // The elapsed tick stays billed even when the trace ends here
        let has_spot = self.spot_available()?;

        if last_cluster_type == ClusterType::Spot && !has_spot {
            debug!(tick = self.tick, "Spot preempted");
            self.cluster_type = ClusterType::None;
            self.preemptions += 1;
        }

        Ok((last_cluster_type, has_spot))
    }

    /// Commit the type requested for the current tick and advance
    ///
    /// Observes the current tick first if the caller has not.
    ///
    /// # Errors
    /// `InvalidRequest` if spot is requested while unavailable
    pub fn step(&mut self, requested: ClusterType) -> Result<ClusterType> {
        if !self.is_observed() {
            self.observe()?;
        }

        if requested == ClusterType::Spot && !self.spot_available()? {
            return Err(SimError::InvalidRequest { tick: self.tick });
        }

        self.cluster_type = requested;
        self.tick += 1;
        Ok(self.cluster_type)
    }
}
