//! Strawman: ride spot, idle through outages, fail over when the deadline is tight
//!
//! Outside the deadline-critical regime the policy never pays for on-demand:
//! it takes spot when the trace grants it and idles otherwise. Once the
//! remaining work plus one restart (rounded up to whole ticks) no longer fits
//! before the deadline, it requests on-demand, keeping a still-running spot
//! allocation rather than restarting onto on-demand.

use super::{Decision, DecisionContext, choose_request};

pub(super) fn decide(ctx: &DecisionContext) -> Decision {
    choose_request(ctx, ctx.deadline_critical())
}
