//! Per-tick reporting hooks

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::ClusterType;

/// What happened at one tick of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub tick: u64,
    pub requested: ClusterType,
    /// Type granted for the tick after the request was committed
    pub cluster_type: ClusterType,
    /// Elapsed time at the start of the tick
    pub elapsed_seconds: f64,
    /// Cost billed for all ticks before this one
    pub accumulated_cost: f64,
    pub work_done_seconds: f64,
    pub deadline_critical: bool,
}

/// Receives one record per committed request
pub trait TickReporter {
    fn record(&mut self, record: &TickRecord);
}

/// Collects every record in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickLog {
    records: Vec<TickRecord>,
}

impl TickLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TickRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TickRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TickReporter for TickLog {
    fn record(&mut self, record: &TickRecord) {
        self.records.push(record.clone());
    }
}

/// Emits each record as a `debug` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl TickReporter for TracingReporter {
    fn record(&mut self, record: &TickRecord) {
        debug!(
            tick = record.tick,
            requested = %record.requested,
            cluster_type = %record.cluster_type,
            elapsed_seconds = record.elapsed_seconds,
            accumulated_cost = record.accumulated_cost,
            work_done_seconds = record.work_done_seconds,
            "tick"
        );
    }
}
