//! Trace replay driver
//!
//! Runs strategies over availability traces tick by tick and summarizes the
//! outcome. Every run gets its own environment/strategy pair; traces are
//! shared read-only through `Arc`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::env::Environment;
use crate::error::Result;
use crate::registry::PolicyRegistry;
use crate::report::{TickRecord, TickReporter, TracingReporter};
use crate::strategy::{Budget, PolicyKind, StepOutcome, Strategy};
use crate::trace::{NamedTrace, Trace, TraceDataset};
use crate::types::{ClusterType, SECONDS_PER_HOUR};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All work finished no later than the deadline
    OnTime,
    /// The deadline passed before the work finished
    DeadlineExceeded,
    /// The trace ended before the run could finish
    TraceExhausted,
}

/// Result of one strategy over one trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub strategy: String,
    pub trace: String,
    pub status: RunStatus,
    pub total_cost: f64,
    pub ticks: u64,
    pub elapsed_hours: f64,
    pub work_done_hours: f64,
    pub spot_ticks: usize,
    pub on_demand_ticks: usize,
    pub preemptions: usize,
}

/// Cost distribution of one strategy across a dataset
///
/// Cost statistics cover settled runs only (on time or past the deadline);
/// runs cut short by their trace are counted in `trace_exhausted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummary {
    pub strategy: String,
    pub runs: usize,
    pub mean_cost: f64,
    pub p50_cost: f64,
    pub p90_cost: f64,
    pub p99_cost: f64,
    pub min_cost: f64,
    pub max_cost: f64,
    pub on_time: usize,
    pub deadline_exceeded: usize,
    pub trace_exhausted: usize,
}

impl CostSummary {
    /// Summarize the runs of one strategy
    pub fn from_results(strategy: impl Into<String>, results: &[SimulationResult]) -> Self {
        let mut costs: Vec<f64> = results
            .iter()
            .filter(|r| r.status != RunStatus::TraceExhausted)
            .map(|r| r.total_cost)
            .collect();
        costs.sort_by(f64::total_cmp);

        let mean_cost = if !costs.is_empty() {
            costs.iter().sum::<f64>() / costs.len() as f64
        } else {
            0.0
        };

        let count = |status: RunStatus| results.iter().filter(|r| r.status == status).count();

        CostSummary {
            strategy: strategy.into(),
            runs: results.len(),
            mean_cost,
            p50_cost: percentile(&costs, 0.50),
            p90_cost: percentile(&costs, 0.90),
            p99_cost: percentile(&costs, 0.99),
            min_cost: costs.first().copied().unwrap_or(0.0),
            max_cost: costs.last().copied().unwrap_or(0.0),
            on_time: count(RunStatus::OnTime),
            deadline_exceeded: count(RunStatus::DeadlineExceeded),
            trace_exhausted: count(RunStatus::TraceExhausted),
        }
    }
}

/// Nearest-rank percentile of sorted values (0.0 when empty)
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Results of every strategy over every trace in a dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub summaries: Vec<CostSummary>,
    pub results: Vec<SimulationResult>,
}

impl BatchReport {
    pub fn summary(&self, strategy: &str) -> Option<&CostSummary> {
        self.summaries.iter().find(|s| s.strategy == strategy)
    }
}

/// Drive `strategy` over `env` until the task is done, the deadline passes
/// or the trace runs out
pub fn run_strategy(
    strategy: &mut Strategy,
    env: &mut Environment,
    trace_name: &str,
    reporter: &mut dyn TickReporter,
) -> Result<SimulationResult> {
    let mut exhausted = false;

    match strategy.register_env(env) {
        Ok(()) => {}
        Err(e) if e.is_trace_exhausted() => exhausted = true,
        Err(e) => return Err(e),
    }

    while !exhausted {
        match strategy.step(env) {
            Ok(StepOutcome::Requested(requested)) => {
                let tick = env.tick() - 1;
                reporter.record(&TickRecord {
                    tick,
                    requested,
                    cluster_type: env.cluster_type(),
                    elapsed_seconds: (tick * env.gap_seconds()) as f64,
                    accumulated_cost: env.accumulated_cost(),
                    work_done_seconds: strategy.work_done(),
                    deadline_critical: strategy.is_deadline_critical(),
                });
            }
            Ok(StepOutcome::Finished) => break,
            Err(e) if e.is_trace_exhausted() => exhausted = true,
            Err(e) => return Err(e),
        }
    }

    // A trace that runs out after the run is settled does not count against it
    let status = if exhausted && !strategy.task_done(env) {
        RunStatus::TraceExhausted
    } else if strategy.task_completed()
        && env.elapsed_seconds() <= strategy.budget().deadline + 1e-6
    {
        RunStatus::OnTime
    } else {
        RunStatus::DeadlineExceeded
    };

    let history = env.history();
    let result = SimulationResult {
        strategy: strategy.name(),
        trace: trace_name.to_string(),
        status,
        total_cost: env.accumulated_cost(),
        ticks: env.tick(),
        elapsed_hours: env.elapsed_seconds() / SECONDS_PER_HOUR,
        work_done_hours: strategy.work_done() / SECONDS_PER_HOUR,
        spot_ticks: history.iter().filter(|&&t| t == ClusterType::Spot).count(),
        on_demand_ticks: history.iter().filter(|&&t| t == ClusterType::OnDemand).count(),
        preemptions: env.preemptions(),
    };

    match result.status {
        RunStatus::OnTime => info!(
            strategy = %result.strategy,
            trace = %result.trace,
            cost = result.total_cost,
            elapsed_hours = result.elapsed_hours,
            "Run finished on time"
        ),
        RunStatus::DeadlineExceeded => warn!(
            strategy = %result.strategy,
            trace = %result.trace,
            work_done_hours = result.work_done_hours,
            "Run exceeded its deadline"
        ),
        RunStatus::TraceExhausted => warn!(
            strategy = %result.strategy,
            trace = %result.trace,
            ticks = result.ticks,
            "Trace exhausted before the run finished"
        ),
    }

    Ok(result)
}

/// Replays a set of strategies under one configuration
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulationConfig,
    policies: Vec<PolicyKind>,
}

impl Simulator {
    /// Create a simulator for the given policies
    pub fn new(config: SimulationConfig, policies: Vec<PolicyKind>) -> Result<Self> {
        config.validate()?;
        Ok(Simulator { config, policies })
    }

    /// Create a simulator from comma-separated strategy names
    pub fn from_registry(
        config: SimulationConfig,
        registry: &PolicyRegistry,
        names: &str,
    ) -> Result<Self> {
        let policies = registry.resolve_list(names, &config)?;
        Self::new(config, policies)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn policies(&self) -> &[PolicyKind] {
        &self.policies
    }

    fn environment(&self, trace: Arc<Trace>) -> Environment {
        let start_offset = self.config.start_offset_ticks(trace.gap_seconds());
        Environment::new(trace, start_offset, self.config.prices)
    }

    /// Run one policy over one trace
    pub fn run_policy(
        &self,
        kind: PolicyKind,
        trace: &NamedTrace,
        reporter: &mut dyn TickReporter,
    ) -> Result<SimulationResult> {
        let mut strategy = Strategy::new(kind, Budget::from_config(&self.config))?;
        let mut env = self.environment(Arc::clone(&trace.trace));
        run_strategy(&mut strategy, &mut env, &trace.name, reporter)
    }

    /// Run every policy over one trace, logging ticks through `tracing`
    pub fn run(&self, trace: &NamedTrace) -> Result<Vec<SimulationResult>> {
        self.policies
            .iter()
            .map(|&kind| self.run_policy(kind, trace, &mut TracingReporter))
            .collect()
    }

    /// Run every policy over every trace in the dataset
    ///
    /// Each policy reuses one environment and one strategy, reset and
    /// re-registered per trace.
    pub fn run_batch(&self, dataset: &TraceDataset) -> Result<BatchReport> {
        let mut summaries = Vec::with_capacity(self.policies.len());
        let mut results = Vec::with_capacity(self.policies.len() * dataset.len());

        let Some(first) = dataset.traces().first() else {
            return Ok(BatchReport { summaries, results });
        };

        for &kind in &self.policies {
            info!(strategy = %kind, traces = dataset.len(), "Running batch");

            let mut strategy = Strategy::new(kind, Budget::from_config(&self.config))?;
            let mut env = self.environment(Arc::clone(&first.trace));
            let mut policy_results = Vec::with_capacity(dataset.len());

            for trace in dataset.iter() {
                env.reset(Arc::clone(&trace.trace))?;
                let result = run_strategy(&mut strategy, &mut env, &trace.name, &mut TracingReporter)?;
                policy_results.push(result);
            }

            summaries.push(CostSummary::from_results(strategy.name(), &policy_results));
            results.extend(policy_results);
        }

        Ok(BatchReport { summaries, results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use crate::report::TickLog;
    use crate::types::PriceTable;

    fn named(name: &str, gap: u64, data: Vec<u8>) -> NamedTrace {
        NamedTrace {
            name: name.to_string(),
            trace: Arc::new(Trace::new(gap, data).unwrap()),
        }
    }

    fn config(deadline_h: f64, task_h: f64, overhead_h: f64) -> SimulationConfig {
        SimulationConfig {
            deadline_hours: deadline_h,
            task_duration_hours: task_h,
            restart_overhead_hours: overhead_h,
            prices: PriceTable {
                spot_per_hour: 1.0,
                on_demand_per_hour: 3.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_on_demand_run() {
        let simulator = Simulator::new(config(2.0, 1.0, 0.0), vec![PolicyKind::OnDemand]).unwrap();
        let trace = named("flat", 600, vec![0; 20]);

        let results = simulator.run(&trace).unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.status, RunStatus::OnTime);
        assert_eq!(result.on_demand_ticks, 6);
        assert_eq!(result.spot_ticks, 0);
        assert!((result.total_cost - 3.0).abs() < 1e-9);
        assert_eq!(result.work_done_hours, 1.0);
    }

    #[test]
    fn test_tick_log_records_requests() {
        let simulator = Simulator::new(config(2.0, 0.5, 0.0), vec![PolicyKind::Strawman]).unwrap();
        let trace = named("t", 600, vec![0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        let mut log = TickLog::new();
        let result = simulator.run_policy(PolicyKind::Strawman, &trace, &mut log).unwrap();
        let requested: Vec<ClusterType> = log.records().iter().map(|r| r.requested).collect();
        // Preempted at tick 2, back on spot at tick 3, done after tick 3
        assert_eq!(
            requested,
            vec![
                ClusterType::Spot,
                ClusterType::Spot,
                ClusterType::None,
                ClusterType::Spot,
            ]
        );
        assert_eq!(result.status, RunStatus::OnTime);
        assert_eq!(result.preemptions, 1);
        assert_eq!(log.records()[3].elapsed_seconds, 1800.0);
        assert!((log.records()[3].accumulated_cost - 2.0 / 6.0).abs() < 1e-9);
        assert!((result.total_cost - 3.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_exhausted_trace_is_reported() {
        let simulator = Simulator::new(config(2.0, 1.0, 0.0), vec![PolicyKind::Strawman]).unwrap();
        let trace = named("short", 600, vec![1, 1, 1]);

        let result = simulator.run(&trace).unwrap().remove(0);
        assert_eq!(result.status, RunStatus::TraceExhausted);
        assert_eq!(result.ticks, 3);
    }

    #[test]
    fn test_trace_ending_with_the_run_is_on_time() {
        let simulator = Simulator::new(config(2.0, 1.0, 0.0), vec![PolicyKind::OnDemand]).unwrap();
        let result = simulator.run(&named("exact", 600, vec![0; 6])).unwrap().remove(0);

        assert_eq!(result.status, RunStatus::OnTime);
        assert_eq!(result.ticks, 6);
        assert_eq!(result.on_demand_ticks, 6);
        assert_eq!(result.work_done_hours, 1.0);
        assert!((result.total_cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_trace_ending_at_deadline_is_deadline_exceeded() {
        // The 15 minute cold start leaves work unfinished when deadline and trace end together
        let simulator =
            Simulator::new(config(1.0, 1.0, 0.25), vec![PolicyKind::OnDemand]).unwrap();
        let result = simulator.run(&named("exact", 600, vec![1; 6])).unwrap().remove(0);

        assert_eq!(result.status, RunStatus::DeadlineExceeded);
        assert_eq!(result.ticks, 6);
        assert!((result.total_cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_request_is_an_error() {
        let mut strategy =
            Strategy::scripted(ClusterType::Spot, Budget::from_config(&config(2.0, 1.0, 0.0)))
                .unwrap();
        let trace = Arc::new(Trace::new(600, vec![0, 1, 0, 0, 0, 0, 0, 0]).unwrap());
        let mut env = Environment::new(trace, 0, PriceTable::default());

        let err = run_strategy(&mut strategy, &mut env, "t", &mut TickLog::new()).unwrap_err();
        assert!(matches!(err, SimError::InvalidRequest { tick: 1 }));
    }

    #[test]
    fn test_oracle_on_short_trace_is_exhausted() {
        let simulator =
            Simulator::new(config(2.0, 1.0, 0.0), vec![PolicyKind::IdealNoOverhead]).unwrap();
        let result = simulator.run(&named("short", 600, vec![0; 4])).unwrap().remove(0);
        assert_eq!(result.status, RunStatus::TraceExhausted);
        assert_eq!(result.total_cost, 0.0);
    }

    #[test]
    fn test_deadline_exceeded_with_restart_overhead() {
        // 1h of work, 1h15m deadline, 30 min restarts and spot flapping every tick
        let config = config(1.25, 1.0, 0.5);
        let simulator = Simulator::new(config, vec![PolicyKind::Strawman]).unwrap();
        let trace = named("flappy", 900, vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);

        let result = simulator.run(&trace).unwrap().remove(0);
        assert_eq!(result.status, RunStatus::DeadlineExceeded);
        assert!(result.work_done_hours < 1.0);
    }

    #[test]
    fn test_batch_summaries() {
        let dataset = TraceDataset::from_traces(
            "mem",
            vec![
                named("0", 600, vec![0; 20]),
                named("1", 600, vec![1; 20]),
                named("2", 600, vec![0, 1].repeat(10)),
            ],
        )
        .unwrap();

        let simulator = Simulator::new(
            config(2.0, 1.0, 0.0),
            vec![PolicyKind::OnDemand, PolicyKind::Strawman],
        )
        .unwrap();
        let report = simulator.run_batch(&dataset).unwrap();

        assert_eq!(report.results.len(), 6);
        let on_demand = report.summary("on_demand").unwrap();
        assert_eq!(on_demand.runs, 3);
        assert_eq!(on_demand.on_time, 3);
        assert!((on_demand.mean_cost - 3.0).abs() < 1e-9);

        let strawman = report.summary("strawman").unwrap();
        assert_eq!(strawman.on_time, 3);
        assert!(strawman.min_cost <= strawman.p50_cost);
        assert!(strawman.p50_cost <= strawman.max_cost);
        // All-spot trace costs one sixth of on-demand per tick
        assert!((strawman.min_cost - 1.0).abs() < 1e-9);
        assert!((strawman.max_cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_exhausted_runs_stay_out_of_cost_statistics() {
        let dataset = TraceDataset::from_traces(
            "mem",
            vec![named("full", 600, vec![1; 20]), named("short", 600, vec![1; 5])],
        )
        .unwrap();
        let simulator =
            Simulator::new(config(2.0, 1.0, 0.0), vec![PolicyKind::IdealNoOverhead]).unwrap();
        let report = simulator.run_batch(&dataset).unwrap();

        let summary = report.summary("ideal_no_overhead").unwrap();
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.on_time, 1);
        assert_eq!(summary.trace_exhausted, 1);
        assert!((summary.min_cost - 3.0).abs() < 1e-9);
        assert!((summary.mean_cost - 3.0).abs() < 1e-9);
        assert!((summary.p99_cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile() {
        assert_eq!(percentile(&[], 0.5), 0.0);
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.5), 3.0);
        assert_eq!(percentile(&values, 0.99), 4.0);
        assert_eq!(percentile(&values, 0.0), 1.0);
    }
}
