//! Pair-amortized deadline checks
//!
//! The deadline horizon is split into `num_pairs = ceil(deadline / interval)`
//! equal pairs, each owing a pro-rata share of the task
//! (`task_duration / num_pairs`). Within the current pair the policy runs the
//! Strawman feasibility test against the pair's end instead of the global
//! deadline:
//!
//! ```text
//! remaining_in_pair + restart_overhead  >=  remaining_wall_in_pair + carried_gain
//! ```
//!
//! where `carried_gain` is the work done ahead of (or behind) schedule in the
//! finished pairs, either cumulative or averaged per pair. Only the final
//! pair rounds the left side up to whole ticks. The global deadline test is
//! always applied on top, so local amortization can never cost the deadline.

use tracing::debug;

use super::{Budget, Decision, DecisionContext, TIME_EPSILON, ceil_to_gap, choose_request};
use crate::error::{Result, SimError};
use crate::types::ClusterType;

/// Per-run pair bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct PairAmortize {
    use_average_gain: bool,
    num_pairs: usize,
    pair_length: f64,
    pair_task_duration: f64,

    current_pair: usize,
    work_at_pair_start: f64,
}

impl PairAmortize {
    pub fn new(budget: &Budget, pair_interval: f64, use_average_gain: bool) -> Result<Self> {
        if !(pair_interval > 0.0) {
            return Err(SimError::config(format!(
                "pair interval must be > 0, got {}s",
                pair_interval
            )));
        }

        let num_pairs = ((budget.deadline / pair_interval) - TIME_EPSILON).ceil().max(1.0) as usize;

        Ok(PairAmortize {
            use_average_gain,
            num_pairs,
            pair_length: budget.deadline / num_pairs as f64,
            pair_task_duration: budget.task_duration / num_pairs as f64,
            current_pair: 0,
            work_at_pair_start: 0.0,
        })
    }

    pub fn num_pairs(&self) -> usize {
        self.num_pairs
    }

    pub fn pair_task_duration(&self) -> f64 {
        self.pair_task_duration
    }

    pub fn current_pair(&self) -> usize {
        self.current_pair
    }

    /// Work done beyond the pro-rata share of the finished pairs
    pub fn cumulative_gain(&self) -> f64 {
        self.work_at_pair_start - self.current_pair as f64 * self.pair_task_duration
    }

    /// Gain carried into the current pair's feasibility test
    pub fn carried_gain(&self) -> f64 {
        if !self.use_average_gain {
            return self.cumulative_gain();
        }
        if self.current_pair == 0 {
            0.0
        } else {
            self.cumulative_gain() / self.current_pair as f64
        }
    }

    fn pair_index(&self, elapsed_seconds: f64) -> Result<usize> {
        let index = (elapsed_seconds / self.pair_length + TIME_EPSILON).floor() as usize;
        if index >= self.num_pairs {
            return Err(SimError::invariant(format!(
                "pair index {} outside [0, {}) at {}s",
                index, self.num_pairs, elapsed_seconds
            )));
        }
        Ok(index)
    }

    /// Whether the current pair can no longer meet its share at the current pace
    fn pair_critical(&self, ctx: &DecisionContext) -> bool {
        let work_in_pair = ctx.work_done - self.work_at_pair_start;
        let remaining_in_pair = self.pair_task_duration - work_in_pair;
        if remaining_in_pair <= TIME_EPSILON {
            return false;
        }

        let is_last = self.current_pair + 1 == self.num_pairs;
        let mut switch_task_remaining = remaining_in_pair + ctx.budget.restart_overhead;
        if is_last {
            switch_task_remaining = ceil_to_gap(switch_task_remaining, ctx.gap_seconds);
        }

        let pair_end = if is_last {
            ctx.budget.deadline
        } else {
            (self.current_pair + 1) as f64 * self.pair_length
        };
        let remaining_wall_in_pair = pair_end - ctx.elapsed_seconds;

        switch_task_remaining >= remaining_wall_in_pair + self.carried_gain() - TIME_EPSILON
    }

    pub(super) fn decide(&mut self, ctx: &DecisionContext) -> Result<Decision> {
        if ctx.task_done() {
            return Ok(Decision::relaxed(ClusterType::None));
        }

        let index = self.pair_index(ctx.elapsed_seconds)?;
        if index != self.current_pair {
            self.current_pair = index;
            self.work_at_pair_start = ctx.work_done;
            debug!(
                pair = index,
                num_pairs = self.num_pairs,
                carried_gain = self.carried_gain(),
                "Entered new pair"
            );
        }

        let critical = self.pair_critical(ctx) || ctx.deadline_critical();
        Ok(choose_request(ctx, critical))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::budget;
    use super::*;

    fn ctx(b: Budget, last: ClusterType, has_spot: bool, work_done: f64, elapsed: f64) -> DecisionContext {
        DecisionContext {
            last_cluster_type: last,
            has_spot,
            tick: (elapsed / 600.0) as u64,
            elapsed_seconds: elapsed,
            gap_seconds: 600.0,
            budget: b,
            work_done,
        }
    }

    #[test]
    fn test_pair_layout() {
        let pair = PairAmortize::new(&budget(10.0, 5.0, 0.0), 3.0 * 3600.0, false).unwrap();
        assert_eq!(pair.num_pairs(), 4);
        assert_eq!(pair.pair_task_duration(), 5.0 * 3600.0 / 4.0);

        let single = PairAmortize::new(&budget(2.0, 1.0, 0.0), 8.0 * 3600.0, false).unwrap();
        assert_eq!(single.num_pairs(), 1);

        assert!(PairAmortize::new(&budget(2.0, 1.0, 0.0), 0.0, false).is_err());
    }

    #[test]
    fn test_pair_critical_forces_on_demand_early() {
        // 4h deadline, 2h task, 1h pairs: each pair owes 30 minutes of work
        let b = budget(4.0, 2.0, 0.0);
        let mut pair = PairAmortize::new(&b, 3600.0, false).unwrap();

        // 30 minutes into the first pair without progress: 1800s owed, 1800s left
        let decision = pair.decide(&ctx(b, ClusterType::None, false, 0.0, 1800.0)).unwrap();
        assert!(decision.critical);
        assert_eq!(decision.request, ClusterType::OnDemand);

        // Globally there is plenty of slack
        assert!(!ctx(b, ClusterType::None, false, 0.0, 1800.0).deadline_critical());
    }

    #[test]
    fn test_gain_carries_into_next_pair() {
        let b = budget(4.0, 2.0, 0.0);
        let mut pair = PairAmortize::new(&b, 3600.0, false).unwrap();

        pair.decide(&ctx(b, ClusterType::None, true, 0.0, 0.0)).unwrap();
        // First pair fully on spot: 3600s done, 1800s owed
        let decision = pair.decide(&ctx(b, ClusterType::Spot, false, 3600.0, 3600.0)).unwrap();
        assert_eq!(pair.current_pair(), 1);
        assert_eq!(pair.cumulative_gain(), 1800.0);
        assert!(!decision.critical);
        assert_eq!(decision.request, ClusterType::None);

        // Without the carried gain this point would be critical
        let decision = pair.decide(&ctx(b, ClusterType::None, false, 3600.0, 5400.0)).unwrap();
        assert!(!decision.critical);
    }

    #[test]
    fn test_average_gain() {
        let b = budget(4.0, 2.0, 0.0);
        let mut pair = PairAmortize::new(&b, 3600.0, true).unwrap();
        assert_eq!(pair.carried_gain(), 0.0);

        // Two pairs finished with 5400s done against 3600s owed
        pair.decide(&ctx(b, ClusterType::Spot, true, 5400.0, 7200.0)).unwrap();
        assert_eq!(pair.current_pair(), 2);
        assert_eq!(pair.cumulative_gain(), 1800.0);
        assert_eq!(pair.carried_gain(), 900.0);
    }

    #[test]
    fn test_keeps_running_spot_under_pair_pressure() {
        let b = budget(4.0, 2.0, 0.1);
        let mut pair = PairAmortize::new(&b, 3600.0, false).unwrap();
        let decision = pair.decide(&ctx(b, ClusterType::Spot, true, 600.0, 2400.0)).unwrap();
        assert!(decision.critical);
        assert_eq!(decision.request, ClusterType::Spot);
    }

    #[test]
    fn test_pair_index_out_of_range_is_invariant_error() {
        let b = budget(2.0, 0.5, 0.0);
        let mut pair = PairAmortize::new(&b, 3600.0, false).unwrap();
        let err = pair.decide(&ctx(b, ClusterType::None, true, 0.0, 7200.0)).unwrap_err();
        assert!(matches!(err, SimError::Invariant(_)));
    }
}
