//! Oracle baseline with foreknowledge of the whole trace
//!
//! Every spot tick before the deadline is free capacity the oracle will use.
//! Whatever work those ticks cannot cover is the on-demand budget, spent on
//! the first ticks where spot is unavailable. Restart overhead is ignored, so
//! no real policy can beat this cost on the same trace.

use tracing::debug;

use super::{Budget, Decision, DecisionContext};
use crate::env::Environment;
use crate::error::Result;
use crate::types::ClusterType;

/// Oracle state: on-demand time still to be bought
#[derive(Debug, Clone, PartialEq)]
pub struct IdealNoOverhead {
    total_spot_gaps: usize,
    remaining_on_demand_time: f64,
}

impl IdealNoOverhead {
    /// Precompute the on-demand budget from the trace window before the deadline
    pub fn plan(env: &Environment, budget: &Budget) -> Result<Self> {
        let total_spot_gaps = env.spot_ticks_before(budget.deadline)?;
        let spot_seconds = total_spot_gaps as f64 * env.gap_seconds() as f64;
        let remaining_on_demand_time = (budget.task_duration - spot_seconds).max(0.0);

        debug!(
            total_spot_gaps,
            remaining_on_demand_time, "Planned oracle on-demand budget"
        );

        Ok(IdealNoOverhead {
            total_spot_gaps,
            remaining_on_demand_time,
        })
    }

    pub fn total_spot_gaps(&self) -> usize {
        self.total_spot_gaps
    }

    pub fn remaining_on_demand_time(&self) -> f64 {
        self.remaining_on_demand_time
    }

    pub(super) fn decide(&mut self, ctx: &DecisionContext) -> Decision {
        if ctx.task_done() {
            return Decision::relaxed(ClusterType::None);
        }
        if ctx.has_spot {
            return Decision::relaxed(ClusterType::Spot);
        }
        if self.remaining_on_demand_time > 0.0 {
            self.remaining_on_demand_time -= ctx.gap_seconds;
            return Decision::relaxed(ClusterType::OnDemand);
        }
        Decision::relaxed(ClusterType::None)
    }
}
