//! Deadline Simulation Engine CLI
//!
//! Replays spot availability traces against deadline-aware provisioning
//! policies and compares their cost.
//!
//! Binary: deadline-sim

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deadline_simulation_engine::{
    BatchReport, CostSummary, NamedTrace, PolicyRegistry, SimulationConfig, SimulationResult,
    Simulator, Trace, TraceDataset, report::TickLog, spot_data::PoissonTraceGenerator,
};

#[derive(Parser)]
#[command(name = "deadline-sim")]
#[command(about = "Simulate deadline-aware spot/on-demand provisioning policies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay one trace or a folder of traces
    Run(RunArgs),

    /// Generate a Poisson preemption dataset
    Generate {
        /// Output folder; traces land in a per-parameter subfolder
        #[arg(long, default_value = "data/poisson")]
        trace_folder: PathBuf,

        /// Tick width in seconds
        #[arg(long, default_value_t = 1200)]
        gap_seconds: u64,

        /// Per-hour preemption probability
        #[arg(long, default_value_t = 0.1)]
        hourly_rate: f64,

        /// Ticks per trace (default: one week of 20 minute ticks)
        #[arg(long, default_value_t = 10080)]
        length: usize,

        /// Number of traces
        #[arg(short, long, default_value_t = 100)]
        num_traces: usize,
    },

    /// List the built-in strategies
    Strategies,
}

#[derive(Args)]
struct RunArgs {
    /// Single trace file
    #[arg(long, conflicts_with = "trace_folder", required_unless_present = "trace_folder")]
    trace_file: Option<PathBuf>,

    /// Folder of trace files sharing one tick width
    #[arg(long)]
    trace_folder: Option<PathBuf>,

    /// Strategies to compare (comma-separated)
    #[arg(short, long, default_value = "on_demand,strawman,ideal_no_overhead,pair_amortize")]
    strategies: String,

    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Deadline in hours
    #[arg(long)]
    deadline_hours: Option<f64>,

    /// Total work in hours
    #[arg(long)]
    task_duration_hours: Option<f64>,

    /// Restart overhead in hours
    #[arg(long)]
    restart_overhead_hours: Option<f64>,

    /// Skip this many hours of each trace
    #[arg(long)]
    start_offset_hours: Option<f64>,

    /// Pair width for pair_amortize, in hours
    #[arg(long)]
    pair_interval_hours: Option<f64>,

    /// Carry the average per-pair gain in pair_amortize
    #[arg(long)]
    use_average_gain: bool,

    /// Spot price ($/hr)
    #[arg(long)]
    spot_price: Option<f64>,

    /// On-demand price ($/hr)
    #[arg(long)]
    on_demand_price: Option<f64>,

    /// Output JSON file path (optional)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Per-tick log JSON file path (single trace only)
    #[arg(long)]
    tick_log: Option<PathBuf>,
}

impl RunArgs {
    fn simulation_config(&self) -> anyhow::Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SimulationConfig::default(),
        };

        if let Some(v) = self.deadline_hours {
            config.deadline_hours = v;
        }
        if let Some(v) = self.task_duration_hours {
            config.task_duration_hours = v;
        }
        if let Some(v) = self.restart_overhead_hours {
            config.restart_overhead_hours = v;
        }
        if let Some(v) = self.start_offset_hours {
            config.start_offset_hours = v;
        }
        if let Some(v) = self.pair_interval_hours {
            config.pair_interval_hours = v;
        }
        if self.use_average_gain {
            config.use_average_gain = true;
        }
        if let Some(v) = self.spot_price {
            config.prices.spot_per_hour = v;
        }
        if let Some(v) = self.on_demand_price {
            config.prices.on_demand_per_hour = v;
        }

        config.validate().context("Invalid simulation config")?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deadline_sim=info,deadline_simulation_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Generate {
            trace_folder,
            gap_seconds,
            hourly_rate,
            length,
            num_traces,
        } => {
            let generator = PoissonTraceGenerator::new(gap_seconds, hourly_rate, length)?;
            info!(
                gap_seconds,
                hourly_rate,
                gap_rate = generator.gap_rate(),
                num_traces,
                "Generating traces"
            );
            let folder = generator
                .write_dataset(&trace_folder, num_traces)
                .with_context(|| format!("Failed to write dataset under {}", trace_folder.display()))?;
            println!("✅ {} traces in {}", num_traces, folder.display());
            Ok(())
        }
        Commands::Strategies => {
            for name in PolicyRegistry::builtin().names() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = args.simulation_config()?;
    let registry = PolicyRegistry::builtin();
    let simulator = Simulator::from_registry(config, &registry, &args.strategies)?;

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║  Deadline Simulation Engine                              ║");
    println!("╚══════════════════════════════════════════════════════════╝\n");

    let config = simulator.config();
    println!("Configuration:");
    println!("  Deadline: {} hours", config.deadline_hours);
    println!("  Task duration: {} hours", config.task_duration_hours);
    println!("  Restart overhead: {} hours", config.restart_overhead_hours);
    println!("  Spot price: ${:.4}/hr", config.prices.spot_per_hour);
    println!("  On-demand price: ${:.4}/hr", config.prices.on_demand_per_hour);
    println!(
        "  Strategies: {}\n",
        simulator
            .policies()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    match (&args.trace_file, &args.trace_folder) {
        (Some(path), _) => run_single(&simulator, path, &args),
        (None, Some(folder)) => run_folder(&simulator, folder, &args),
        (None, None) => bail!("either --trace-file or --trace-folder is required"),
    }
}

fn run_single(simulator: &Simulator, path: &Path, args: &RunArgs) -> anyhow::Result<()> {
    let trace = Trace::from_file(path)
        .with_context(|| format!("Failed to load trace {}", path.display()))?;
    println!(
        "Trace: {} ({} ticks of {}s, {:.1}% spot availability)\n",
        path.display(),
        trace.len(),
        trace.gap_seconds(),
        trace.availability() * 100.0
    );

    let named = NamedTrace {
        name: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        trace: Arc::new(trace),
    };

    let mut results = Vec::with_capacity(simulator.policies().len());
    let mut tick_logs = BTreeMap::new();
    for &kind in simulator.policies() {
        print!("Running simulation with {} policy... ", kind);
        let mut log = TickLog::new();
        let result = simulator.run_policy(kind, &named, &mut log)?;
        println!("Done");
        tick_logs.insert(result.strategy.clone(), log.into_records());
        results.push(result);
    }

    print_results(&results);

    if let Some(output_path) = &args.output {
        write_json(output_path, &results)?;
    }
    if let Some(tick_log_path) = &args.tick_log {
        write_json(tick_log_path, &tick_logs)?;
    }

    println!("\n✅ Simulation complete!\n");
    Ok(())
}

fn run_folder(simulator: &Simulator, folder: &Path, args: &RunArgs) -> anyhow::Result<()> {
    if args.tick_log.is_some() {
        bail!("--tick-log is only supported with --trace-file");
    }

    let dataset = TraceDataset::load(folder)
        .with_context(|| format!("Failed to load traces from {}", folder.display()))?;
    println!(
        "Dataset: {} ({} traces of {}s ticks)\n",
        folder.display(),
        dataset.len(),
        dataset.gap_seconds()
    );

    let report = simulator.run_batch(&dataset)?;
    print_summaries(&report);

    if let Some(output_path) = &args.output {
        write_json(output_path, &report)?;
    }

    println!("\n✅ Simulation complete!\n");
    Ok(())
}

fn print_results(results: &[SimulationResult]) {
    println!("\n╔══════════════════════════════════════════════════════════╗");
    println!("║  Simulation Results                                      ║");
    println!("╚══════════════════════════════════════════════════════════╝\n");

    println!(
        "{:<40} {:>12} {:>18} {:>10} {:>10} {:>12}",
        "Policy", "Cost ($)", "Status", "Spot", "On-demand", "Preemptions"
    );
    println!("{}", "-".repeat(107));

    for result in results {
        println!(
            "{:<40} {:>12.2} {:>18} {:>10} {:>10} {:>12}",
            result.strategy,
            result.total_cost,
            format!("{:?}", result.status),
            result.spot_ticks,
            result.on_demand_ticks,
            result.preemptions,
        );
    }

    let costs: Vec<(&str, f64)> = results
        .iter()
        .map(|r| (r.strategy.as_str(), r.total_cost))
        .collect();
    print_savings(&costs);
}

fn print_summaries(report: &BatchReport) {
    println!("\n╔══════════════════════════════════════════════════════════╗");
    println!("║  Batch Results                                           ║");
    println!("╚══════════════════════════════════════════════════════════╝\n");

    println!(
        "{:<40} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8}",
        "Policy", "Mean ($)", "P50 ($)", "P90 ($)", "P99 ($)", "Max ($)", "Missed"
    );
    println!("{}", "-".repeat(107));

    for summary in &report.summaries {
        println!(
            "{:<40} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>5}/{:<3}",
            summary.strategy,
            summary.mean_cost,
            summary.p50_cost,
            summary.p90_cost,
            summary.p99_cost,
            summary.max_cost,
            summary.deadline_exceeded + summary.trace_exhausted,
            summary.runs,
        );
    }

    let costs: Vec<(&str, f64)> = report
        .summaries
        .iter()
        .map(|s: &CostSummary| (s.strategy.as_str(), s.mean_cost))
        .collect();
    print_savings(&costs);
}

/// Savings against the on_demand baseline, or the most expensive policy
fn print_savings(costs: &[(&str, f64)]) {
    if costs.len() < 2 {
        return;
    }

    let baseline = costs
        .iter()
        .find(|(name, _)| *name == "on_demand")
        .or_else(|| costs.iter().max_by(|a, b| a.1.total_cmp(&b.1)));
    let Some(&(baseline_name, baseline_cost)) = baseline else {
        return;
    };

    println!("\n{}", "-".repeat(107));
    println!("Cost Savings vs {} baseline:", baseline_name);

    for &(name, cost) in costs {
        if name != baseline_name {
            let savings = baseline_cost - cost;
            let savings_pct = if baseline_cost > 0.0 {
                (savings / baseline_cost) * 100.0
            } else {
                0.0
            };
            println!("  {:<38} ${:>8.2} ({:>5.1}%)", name, savings, savings_pct);
        }
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    println!("\nWriting {}...", path.display());
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("  Saved");
    Ok(())
}
