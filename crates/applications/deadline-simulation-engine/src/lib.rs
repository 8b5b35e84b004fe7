//! Deadline Simulation Engine
//!
//! Discrete-time replay of spot availability traces for evaluating
//! cost-minimizing provisioning policies under a hard deadline.
//!
//! ## Architecture
//!
//! ```text
//! Trace (immutable, Arc-shared)
//!   └── Environment      tick counter, granted type, billing history
//!         └── Strategy   budgets, work/overhead bookkeeping, policy decision
//!               └── Simulator   run driver, batch summaries
//! ```
//!
//! Each tick the strategy observes the environment, credits the work done in
//! the tick that just elapsed, picks the next allocation (none, spot or
//! on-demand) and commits it. Cost is a pure function of the billing history.

#![warn(clippy::all)]

pub mod config;
pub mod env;
pub mod error;
pub mod registry;
pub mod report;
pub mod simulator;
pub mod spot_data;
pub mod strategy;
pub mod trace;
pub mod types;

pub use config::SimulationConfig;
pub use env::Environment;
pub use error::{Result, SimError};
pub use registry::PolicyRegistry;
pub use simulator::{BatchReport, CostSummary, RunStatus, SimulationResult, Simulator};
pub use strategy::{Budget, PolicyKind, StepOutcome, Strategy};
pub use trace::{NamedTrace, Trace, TraceDataset};
pub use types::{ClusterType, PriceTable};
