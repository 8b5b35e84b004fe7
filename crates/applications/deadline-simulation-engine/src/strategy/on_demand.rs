//! On-demand only baseline: the cost upper bound

use super::{Decision, DecisionContext};
use crate::types::ClusterType;

pub(super) fn decide(ctx: &DecisionContext) -> Decision {
    if ctx.task_done() {
        return Decision::relaxed(ClusterType::None);
    }
    Decision::relaxed(ClusterType::OnDemand)
}

#[cfg(test)]
mod tests {
    use super::super::tests::budget;
    use super::*;

    #[test]
    fn test_always_on_demand_until_done() {
        let mut ctx = DecisionContext {
            last_cluster_type: ClusterType::None,
            has_spot: true,
            tick: 0,
            elapsed_seconds: 0.0,
            gap_seconds: 600.0,
            budget: budget(2.0, 1.0, 0.0),
            work_done: 0.0,
        };
        assert_eq!(decide(&ctx).request, ClusterType::OnDemand);

        ctx.has_spot = false;
        assert_eq!(decide(&ctx).request, ClusterType::OnDemand);

        ctx.work_done = 3600.0;
        assert_eq!(decide(&ctx).request, ClusterType::None);
    }
}
