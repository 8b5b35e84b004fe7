//! Visualize cumulative cost per policy on one synthetic trace
//!
//! Generates an interactive HTML chart of accumulated cost against elapsed
//! time for every built-in policy.
//!
//! Usage:
//!   cargo run --example visualize_policy_costs
//!   Open visualizations/policy_costs.html in browser

use std::fs;
use std::sync::Arc;

use plotly::{
    color::NamedColor,
    common::{Line, Mode},
    layout::{Axis, HoverMode, Layout},
    Plot, Scatter,
};

use deadline_simulation_engine::{
    report::TickLog, spot_data::PoissonTraceGenerator, NamedTrace, PolicyRegistry,
    SimulationConfig, Simulator,
};

fn main() -> anyhow::Result<()> {
    println!("🎨 Generating policy cost comparison...");

    let config = SimulationConfig {
        deadline_hours: 48.0,
        task_duration_hours: 24.0,
        restart_overhead_hours: 0.2,
        pair_interval_hours: 6.0,
        ..Default::default()
    };

    // Two days of 20 minute ticks, plus slack for the deadline tick
    let generator = PoissonTraceGenerator::new(1200, 0.1, 3 * 48 + 12)?;
    let trace = NamedTrace {
        name: "poisson-seed-7".to_string(),
        trace: Arc::new(generator.generate(7)?),
    };
    println!(
        "   Trace: {} ticks, {:.1}% spot availability",
        trace.trace.len(),
        trace.trace.availability() * 100.0
    );

    let registry = PolicyRegistry::builtin();
    let simulator = Simulator::from_registry(
        config,
        &registry,
        "on_demand,strawman,ideal_no_overhead,pair_amortize",
    )?;

    let colors = [
        "rgba(220, 20, 60, 0.9)",
        "rgba(255, 140, 0, 0.9)",
        "rgba(34, 139, 34, 0.9)",
        "rgba(0, 128, 255, 0.9)",
    ];

    let mut cost_plot = Plot::new();
    let mut totals = Vec::new();

    for (&kind, color) in simulator.policies().iter().zip(colors) {
        println!("   Running {}...", kind);
        let mut log = TickLog::new();
        let result = simulator.run_policy(kind, &trace, &mut log)?;

        let hours: Vec<f64> = log.records().iter().map(|r| r.elapsed_seconds / 3600.0).collect();
        let costs: Vec<f64> = log.records().iter().map(|r| r.accumulated_cost).collect();

        let label = kind.to_string();
        let line = Scatter::new(hours, costs)
            .name(&label)
            .mode(Mode::Lines)
            .line(Line::new().color(color).width(2.0));
        cost_plot.add_trace(line);

        totals.push((label, result.total_cost, result.status));
    }

    let layout = Layout::new()
        .title("Cumulative Cost by Policy (48h deadline, 24h task)")
        .x_axis(Axis::new().title("Elapsed Time (hours)"))
        .y_axis(
            Axis::new()
                .title("Accumulated Cost ($)")
                .grid_color(NamedColor::LightGray),
        )
        .hover_mode(HoverMode::X);
    cost_plot.set_layout(layout);

    fs::create_dir_all("visualizations")?;
    let path = "visualizations/policy_costs.html";
    cost_plot.write_html(path);
    println!("   ✅ Cost chart saved to {}", path);

    println!("\n📊 Total cost per policy:");
    for (name, cost, status) in &totals {
        println!("   {:<40} ${:>8.2}  {:?}", name, cost, status);
    }

    println!("\n🌐 Open visualization in browser:");
    println!("   firefox {} &", path);
    Ok(())
}
