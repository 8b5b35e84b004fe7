//! Deadline-aware provisioning strategies
//!
//! A [`Strategy`] owns the job's budgets (deadline, task duration, restart
//! overhead) and its progress bookkeeping. Each tick it:
//!
//! 1. observes the environment (what ran during the elapsed tick, and whether
//!    spot is available next),
//! 2. credits the work done during the elapsed tick, net of restart overhead,
//! 3. asks its policy for the next request,
//! 4. arms the restart overhead if the request cold-starts a new allocation,
//! 5. commits the request to the environment.
//!
//! Policies are a closed set ([`PolicyKind`]), each with its own decision
//! function:
//!
//! - **OnDemand**: always on-demand (cost upper bound)
//! - **Strawman**: spot when available, idle otherwise, on-demand once the deadline is tight
//! - **IdealNoOverhead**: oracle with full knowledge of the trace (cost lower bound)
//! - **PairAmortize**: Strawman with the deadline check amortized over shorter pairs

mod ideal_no_overhead;
mod on_demand;
mod pair_amortize;
mod strawman;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use ideal_no_overhead::IdealNoOverhead;
pub use pair_amortize::PairAmortize;

use crate::config::SimulationConfig;
use crate::env::Environment;
use crate::error::{Result, SimError};
use crate::types::{ClusterType, SECONDS_PER_HOUR};

/// Tolerance for comparing accumulated seconds
pub(crate) const TIME_EPSILON: f64 = 1e-6;

/// Policy variant and its parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PolicyKind {
    OnDemand,
    Strawman,
    IdealNoOverhead,
    PairAmortize {
        pair_interval_hours: f64,
        use_average_gain: bool,
    },
}

impl PolicyKind {
    /// Registry name of the policy
    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::OnDemand => "on_demand",
            PolicyKind::Strawman => "strawman",
            PolicyKind::IdealNoOverhead => "ideal_no_overhead",
            PolicyKind::PairAmortize { .. } => "pair_amortize",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::PairAmortize {
                pair_interval_hours,
                use_average_gain,
            } => write!(
                f,
                "pair_amortize(interval={}h, gain={})",
                pair_interval_hours,
                if *use_average_gain { "average" } else { "cumulative" }
            ),
            other => f.write_str(other.name()),
        }
    }
}

/// Job budgets, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub deadline: f64,
    pub task_duration: f64,
    pub restart_overhead: f64,
}

impl Budget {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Budget {
            deadline: config.deadline_seconds(),
            task_duration: config.task_duration_seconds(),
            restart_overhead: config.restart_overhead_seconds(),
        }
    }
}

/// Everything a policy may look at when deciding the next request
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext {
    /// Type held during the tick that just elapsed
    pub last_cluster_type: ClusterType,
    /// Spot available for the upcoming tick
    pub has_spot: bool,
    pub tick: u64,
    pub elapsed_seconds: f64,
    pub gap_seconds: f64,
    pub budget: Budget,
    /// Work completed so far
    pub work_done: f64,
}

impl DecisionContext {
    pub fn remaining_task_seconds(&self) -> f64 {
        (self.budget.task_duration - self.work_done).max(0.0)
    }

    pub fn remaining_wall_seconds(&self) -> f64 {
        self.budget.deadline - self.elapsed_seconds
    }

    pub fn task_done(&self) -> bool {
        self.work_done >= self.budget.task_duration - TIME_EPSILON
    }

    /// Whether spot is still running into the next tick
    pub fn running_spot(&self) -> bool {
        self.last_cluster_type == ClusterType::Spot && self.has_spot
    }

    /// Round `seconds` up to a whole number of ticks
    pub fn ceil_to_gap(&self, seconds: f64) -> f64 {
        ceil_to_gap(seconds, self.gap_seconds)
    }

    /// Whether the remaining work plus one restart no longer fits before the deadline
    pub fn deadline_critical(&self) -> bool {
        let needed = self.ceil_to_gap(self.remaining_task_seconds() + self.budget.restart_overhead);
        needed >= self.remaining_wall_seconds() - TIME_EPSILON
    }
}

pub(crate) fn ceil_to_gap(seconds: f64, gap_seconds: f64) -> f64 {
    ((seconds / gap_seconds) - TIME_EPSILON).ceil().max(0.0) * gap_seconds
}

/// A policy's answer for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub request: ClusterType,
    /// Whether the decision was made in the deadline-critical regime
    pub critical: bool,
}

impl Decision {
    pub fn relaxed(request: ClusterType) -> Self {
        Decision { request, critical: false }
    }
}

/// Shared request rule for spot-seeking policies
///
/// Spot is taken whenever available unless the deadline is critical. In the
/// critical regime spot is still kept if it is already running (no restart
/// needed) or if restarts are free; otherwise the request is on-demand.
pub fn choose_request(ctx: &DecisionContext, critical: bool) -> Decision {
    if ctx.task_done() {
        return Decision::relaxed(ClusterType::None);
    }

    let keep_spot = !critical || ctx.running_spot() || ctx.budget.restart_overhead <= 0.0;
    let request = if ctx.has_spot && keep_spot {
        ClusterType::Spot
    } else if critical {
        ClusterType::OnDemand
    } else {
        ClusterType::None
    };

    Decision { request, critical }
}

/// Per-run policy state
#[derive(Debug, Clone)]
enum Policy {
    OnDemand,
    Strawman,
    IdealNoOverhead(IdealNoOverhead),
    PairAmortize(PairAmortize),
    /// Requests one fixed type every tick
    #[cfg(test)]
    Scripted(ClusterType),
}

impl Policy {
    fn build(kind: PolicyKind, budget: &Budget, env: &Environment) -> Result<Self> {
        Ok(match kind {
            PolicyKind::OnDemand => Policy::OnDemand,
            PolicyKind::Strawman => Policy::Strawman,
            PolicyKind::IdealNoOverhead => {
                Policy::IdealNoOverhead(IdealNoOverhead::plan(env, budget)?)
            }
            PolicyKind::PairAmortize {
                pair_interval_hours,
                use_average_gain,
            } => Policy::PairAmortize(PairAmortize::new(
                budget,
                pair_interval_hours * SECONDS_PER_HOUR,
                use_average_gain,
            )?),
        })
    }

    fn decide(&mut self, ctx: &DecisionContext) -> Result<Decision> {
        match self {
            Policy::OnDemand => Ok(on_demand::decide(ctx)),
            Policy::Strawman => Ok(strawman::decide(ctx)),
            Policy::IdealNoOverhead(ideal) => Ok(ideal.decide(ctx)),
            Policy::PairAmortize(pair) => pair.decide(ctx),
            #[cfg(test)]
            Policy::Scripted(request) => Ok(Decision::relaxed(*request)),
        }
    }
}

/// Result of one strategy step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A request was committed for the tick
    Requested(ClusterType),
    /// The task is complete or the deadline has passed
    Finished,
}

/// A policy plus the job bookkeeping shared by all policies
#[derive(Debug, Clone)]
pub struct Strategy {
    kind: PolicyKind,
    budget: Budget,
    policy: Option<Policy>,

    remaining_restart_overhead: f64,
    task_done_time: Vec<f64>,
    work_done: f64,
    critical: bool,

    #[cfg(test)]
    scripted: Option<ClusterType>,
}

impl Strategy {
    /// Create a strategy; call [`Strategy::register_env`] before stepping
    pub fn new(kind: PolicyKind, budget: Budget) -> Result<Self> {
        if !(budget.deadline > 0.0 && budget.task_duration > 0.0 && budget.restart_overhead >= 0.0) {
            return Err(SimError::config(format!("invalid budget: {:?}", budget)));
        }

        // The oracle ignores restart overhead by construction
        let budget = match kind {
            PolicyKind::IdealNoOverhead => Budget {
                restart_overhead: 0.0,
                ..budget
            },
            _ => budget,
        };

        Ok(Strategy {
            kind,
            budget,
            policy: None,
            remaining_restart_overhead: 0.0,
            task_done_time: Vec::new(),
            work_done: 0.0,
            critical: false,
            #[cfg(test)]
            scripted: None,
        })
    }

    /// Strategy that ignores its policy and always requests `request`
    #[cfg(test)]
    pub(crate) fn scripted(request: ClusterType, budget: Budget) -> Result<Self> {
        let mut strategy = Self::new(PolicyKind::OnDemand, budget)?;
        strategy.scripted = Some(request);
        Ok(strategy)
    }

    /// Bind to a fresh environment, clearing all progress
    pub fn register_env(&mut self, env: &Environment) -> Result<()> {
        if env.tick() != 0 {
            return Err(SimError::invariant(format!(
                "strategy registered on an environment already at tick {}",
                env.tick()
            )));
        }
        let policy = Policy::build(self.kind, &self.budget, env)?;
        #[cfg(test)]
        let policy = self.scripted.map_or(policy, Policy::Scripted);
        self.policy = Some(policy);
        self.remaining_restart_overhead = 0.0;
        self.task_done_time.clear();
        self.work_done = 0.0;
        self.critical = false;
        Ok(())
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    pub fn name(&self) -> String {
        self.kind.to_string()
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Work credited per observed tick
    pub fn task_done_time(&self) -> &[f64] {
        &self.task_done_time
    }

    pub fn work_done(&self) -> f64 {
        self.work_done
    }

    pub fn remaining_restart_overhead(&self) -> f64 {
        self.remaining_restart_overhead
    }

    /// Whether the last decision was made in the deadline-critical regime
    pub fn is_deadline_critical(&self) -> bool {
        self.critical
    }

    /// All required work has been done
    pub fn task_completed(&self) -> bool {
        self.work_done >= self.budget.task_duration - TIME_EPSILON
    }

    /// Terminal predicate: work complete or deadline reached
    pub fn task_done(&self, env: &Environment) -> bool {
        self.task_completed() || env.elapsed_seconds() >= self.budget.deadline - TIME_EPSILON
    }

    /// Run one observe → decide → step cycle
    pub fn step(&mut self, env: &mut Environment) -> Result<StepOutcome> {
        if env.is_observed() && self.task_done(env) {
            return Ok(StepOutcome::Finished);
        }

        let (last_cluster_type, has_spot) = match env.observe() {
            Ok(observation) => observation,
            Err(e) if e.is_trace_exhausted() => {
                // The environment billed the elapsed tick before running out
                if let Some(&last) = env.history().last() {
                    self.record_progress(last, env.gap_seconds() as f64);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        if env.tick() > 0 {
            self.record_progress(last_cluster_type, env.gap_seconds() as f64);
        }
        if self.task_done(env) {
            return Ok(StepOutcome::Finished);
        }

        let ctx = DecisionContext {
            last_cluster_type,
            has_spot,
            tick: env.tick(),
            elapsed_seconds: env.elapsed_seconds(),
            gap_seconds: env.gap_seconds() as f64,
            budget: self.budget,
            work_done: self.work_done,
        };

        let policy = self
            .policy
            .as_mut()
            .ok_or_else(|| SimError::invariant("strategy stepped before register_env"))?;
        let decision = policy.decide(&ctx)?;

        if decision.critical && !self.critical {
            debug!(
                tick = ctx.tick,
                remaining_task = ctx.remaining_task_seconds(),
                remaining_wall = ctx.remaining_wall_seconds(),
                "Entered deadline-critical regime"
            );
        }
        self.critical = decision.critical;

        let restarts = decision.request != env.cluster_type() && decision.request.is_running();
        env.step(decision.request)?;
        if restarts {
            self.remaining_restart_overhead = self.budget.restart_overhead;
        }
        Ok(StepOutcome::Requested(decision.request))
    }

    /// Credit the work done during the elapsed tick
    fn record_progress(&mut self, last_cluster_type: ClusterType, gap_seconds: f64) {
        if !last_cluster_type.is_running() {
            self.task_done_time.push(0.0);
            return;
        }

        let productive = (gap_seconds - self.remaining_restart_overhead).max(0.0);
        self.remaining_restart_overhead -= gap_seconds - productive;

        let remaining_task = (self.budget.task_duration - self.work_done).max(0.0);
        let done = productive.min(remaining_task);
        self.task_done_time.push(done);
        self.work_done += done;
    }
}
