//! Synthetic spot availability traces from a Poisson preemption process
//!
//! Preemptions arrive as a Poisson process whose rate is given as the
//! probability of at least one preemption per hour. For a tick of
//! `gap_seconds` the per-tick preemption probability is
//!
//! ```text
//! λ = -ln(1 - hourly_rate)
//! p = 1 - exp(-λ · gap_seconds / 3600)
//! ```
//!
//! Each tick is then an independent Bernoulli(p) draw. Traces are seeded by
//! their index, so regenerating a dataset reproduces it exactly.

use std::fs;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Bernoulli, Distribution};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::trace::Trace;
use crate::types::SECONDS_PER_HOUR;

/// Generator name recorded in produced trace files
pub const POISSON_GENERATOR: &str = "poisson";

/// Poisson preemption trace generator
#[derive(Debug, Clone)]
pub struct PoissonTraceGenerator {
    gap_seconds: u64,
    hourly_rate: f64,
    length: usize,
    gap_rate: f64,
}

impl PoissonTraceGenerator {
    /// Create a new trace generator
    ///
    /// # Arguments
    /// * `gap_seconds` - Tick width (e.g., 1200 = 20 minutes)
    /// * `hourly_rate` - Probability of a preemption within one hour (e.g., 0.1 = 10%)
    /// * `length` - Number of ticks per trace
    pub fn new(gap_seconds: u64, hourly_rate: f64, length: usize) -> Result<Self> {
        if gap_seconds == 0 {
            return Err(SimError::config("gap_seconds must be > 0"));
        }
        if !(0.0..=1.0).contains(&hourly_rate) {
            return Err(SimError::config(format!(
                "hourly_rate must be within [0, 1], got {}",
                hourly_rate
            )));
        }

        let occurrence_per_hour = -(1.0 - hourly_rate).ln();
        let gap_rate = 1.0 - (-occurrence_per_hour * gap_seconds as f64 / SECONDS_PER_HOUR).exp();

        debug!(hourly_rate, gap_seconds, gap_rate, "Derived per-tick preemption probability");

        Ok(PoissonTraceGenerator {
            gap_seconds,
            hourly_rate,
            length,
            gap_rate,
        })
    }

    /// Per-tick preemption probability
    pub fn gap_rate(&self) -> f64 {
        self.gap_rate
    }

    pub fn gap_seconds(&self) -> u64 {
        self.gap_seconds
    }

    pub fn hourly_rate(&self) -> f64 {
        self.hourly_rate
    }

    /// Generate one trace, deterministic for a given seed
    pub fn generate(&self, seed: u64) -> Result<Trace> {
        let mut rng = StdRng::seed_from_u64(seed);
        let preempted = Bernoulli::new(self.gap_rate)
            .map_err(|e| SimError::config(format!("invalid preemption probability: {}", e)))?;

        let data: Vec<u8> = (0..self.length)
            .map(|_| u8::from(preempted.sample(&mut rng)))
            .collect();

        Ok(Trace::new(self.gap_seconds, data)?
            .with_generator(POISSON_GENERATOR)
            .with_metadata("hourly_rate", json!(self.hourly_rate))
            .with_metadata("length", json!(self.length)))
    }

    /// Folder name for a dataset produced by this generator
    pub fn dataset_name(&self) -> String {
        format!("gap_{}_hourly-rate_{}", self.gap_seconds, self.hourly_rate)
    }

    /// Write `num_traces` traces under `trace_folder`
    ///
    /// Files are named `<index>.json` inside a per-configuration subfolder.
    /// Existing files are left untouched.
    ///
    /// # Returns
    /// The dataset folder the traces were written to
    pub fn write_dataset(&self, trace_folder: impl AsRef<Path>, num_traces: usize) -> Result<PathBuf> {
        let output_folder = trace_folder.as_ref().join(self.dataset_name());
        fs::create_dir_all(&output_folder)?;

        let mut written = 0;
        for i in 0..num_traces {
            let path = output_folder.join(format!("{}.json", i));
            if path.exists() {
                continue;
            }
            self.generate(i as u64)?.save(&path)?;
            written += 1;
        }

        info!(
            folder = %output_folder.display(),
            written,
            skipped = num_traces - written,
            gap_rate = self.gap_rate,
            "Generated Poisson traces"
        );
        Ok(output_folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_rate_matches_hourly_rate_for_hour_ticks() {
        let generator = PoissonTraceGenerator::new(3600, 0.1, 10).unwrap();
        assert!((generator.gap_rate() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_gap_rate_shrinks_with_tick_width() {
        let generator = PoissonTraceGenerator::new(1200, 0.1, 10).unwrap();
        // 1 - 0.9^(1/3)
        let expected = 1.0 - 0.9_f64.powf(1.0 / 3.0);
        assert!((generator.gap_rate() - expected).abs() < 1e-12);
        assert!(generator.gap_rate() < 0.1);
    }

    #[test]
    fn test_generation_is_seeded() {
        let generator = PoissonTraceGenerator::new(600, 0.3, 500).unwrap();
        let a = generator.generate(7).unwrap();
        let b = generator.generate(7).unwrap();
        assert_eq!(a.data(), b.data());
        assert_eq!(a.len(), 500);
        assert_eq!(a.gap_seconds(), 600);
        assert_eq!(a.generator(), Some(POISSON_GENERATOR));
    }

    #[test]
    fn test_degenerate_rates() {
        let never = PoissonTraceGenerator::new(600, 0.0, 100).unwrap();
        assert!(never.generate(0).unwrap().data().iter().all(|&v| v == 0));

        let always = PoissonTraceGenerator::new(600, 1.0, 100).unwrap();
        assert!(always.generate(0).unwrap().data().iter().all(|&v| v == 1));
    }

    #[test]
    fn test_invalid_rate() {
        assert!(PoissonTraceGenerator::new(600, 1.5, 10).is_err());
        assert!(PoissonTraceGenerator::new(600, -0.1, 10).is_err());
        assert!(PoissonTraceGenerator::new(0, 0.1, 10).is_err());
    }

    #[test]
    fn test_write_dataset_skips_existing() {
        let root = std::env::temp_dir().join(format!("deadline-sim-gen-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);

        let generator = PoissonTraceGenerator::new(1200, 0.1, 50).unwrap();
        let folder = generator.write_dataset(&root, 3).unwrap();
        assert!(folder.ends_with("gap_1200_hourly-rate_0.1"));

        // Replace one file; a second pass must not overwrite it
        let marker = Trace::new(1200, vec![1]).unwrap();
        marker.save(folder.join("1.json")).unwrap();
        generator.write_dataset(&root, 3).unwrap();

        let kept = Trace::from_file(folder.join("1.json")).unwrap();
        assert_eq!(kept.data(), &[1]);
        let regenerated = Trace::from_file(folder.join("0.json")).unwrap();
        assert_eq!(regenerated.data(), generator.generate(0).unwrap().data());

        fs::remove_dir_all(&root).unwrap();
    }
}
