//! Spot availability traces
//!
//! A trace is an immutable, tick-indexed record of spot availability:
//! `data[i] == 1` means spot capacity was NOT available during tick `i`.
//!
//! ## File Format
//!
//! ```json
//! {
//!   "generator": "poisson",
//!   "metadata": { "gap_seconds": 1200, "hourly_rate": 0.1, "length": 10080 },
//!   "data": [0, 0, 1, 0]
//! }
//! ```
//!
//! Only `metadata.gap_seconds` and `data` are interpreted. Everything else in
//! `metadata` is kept as-is so that a load/save cycle does not lose it.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Result, SimError};

/// Persisted form of a trace
#[derive(Debug, Serialize, Deserialize)]
struct TraceFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    generator: Option<String>,
    metadata: TraceFileMetadata,
    data: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TraceFileMetadata {
    gap_seconds: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Immutable spot availability trace
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    gap_seconds: u64,
    data: Vec<u8>,
    generator: Option<String>,
    extra_metadata: Map<String, Value>,
}

impl Trace {
    /// Create a trace from a gap width and 0/1 preemption flags
    pub fn new(gap_seconds: u64, data: Vec<u8>) -> Result<Self> {
        if gap_seconds == 0 {
            return Err(SimError::format("gap_seconds must be a positive integer"));
        }
        if let Some(pos) = data.iter().position(|&v| v > 1) {
            return Err(SimError::format(format!(
                "data[{}] = {} is not 0 or 1",
                pos, data[pos]
            )));
        }

        Ok(Trace {
            gap_seconds,
            data,
            generator: None,
            extra_metadata: Map::new(),
        })
    }

    /// Tag the trace with the generator that produced it
    pub fn with_generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = Some(generator.into());
        self
    }

    /// Attach an extra metadata entry (persisted next to `gap_seconds`)
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key != "gap_seconds" {
            self.extra_metadata.insert(key, value);
        }
        self
    }

    /// Parse a trace from its JSON representation
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: TraceFile = serde_json::from_str(json)
            .map_err(|e| SimError::format(format!("invalid trace JSON: {}", e)))?;

        let gap_seconds = u64::try_from(file.metadata.gap_seconds)
            .ok()
            .filter(|&gap| gap > 0)
            .ok_or_else(|| {
                SimError::format(format!(
                    "gap_seconds must be a positive integer, got {}",
                    file.metadata.gap_seconds
                ))
            })?;

        let mut data = Vec::with_capacity(file.data.len());
        for (i, value) in file.data.iter().enumerate() {
            match value {
                0 => data.push(0),
                1 => data.push(1),
                other => {
                    return Err(SimError::format(format!(
                        "data[{}] = {} is not 0 or 1",
                        i, other
                    )));
                }
            }
        }

        Ok(Trace {
            gap_seconds,
            data,
            generator: file.generator,
            extra_metadata: file.metadata.extra,
        })
    }

    /// Load a trace from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let trace = Self::from_json_str(&json).map_err(|e| match e {
            SimError::Format(msg) => SimError::format(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        debug!(
            path = %path.display(),
            ticks = trace.len(),
            gap_seconds = trace.gap_seconds,
            "Loaded trace"
        );
        Ok(trace)
    }

    /// Serialize to the persisted JSON form
    pub fn to_json_string(&self) -> Result<String> {
        let file = TraceFile {
            generator: self.generator.clone(),
            metadata: TraceFileMetadata {
                gap_seconds: self.gap_seconds as i64,
                extra: self.extra_metadata.clone(),
            },
            data: self.data.iter().map(|&v| v as i64).collect(),
        };
        Ok(serde_json::to_string(&file)?)
    }

    /// Write the trace to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Wall-clock width of one tick
    pub fn gap_seconds(&self) -> u64 {
        self.gap_seconds
    }

    /// Number of ticks in the trace
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw 0/1 preemption flags
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn generator(&self) -> Option<&str> {
        self.generator.as_deref()
    }

    /// Extra metadata entries other than `gap_seconds`
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.extra_metadata
    }

    /// Preemption flag at `tick` (1 = spot unavailable)
    pub fn at(&self, tick: usize) -> Result<u8> {
        self.data.get(tick).copied().ok_or(SimError::Range {
            tick,
            length: self.data.len(),
        })
    }

    /// Whether spot capacity is available during `tick`
    pub fn is_available(&self, tick: usize) -> Result<bool> {
        Ok(self.at(tick)? == 0)
    }

    /// Number of ticks with spot available in `range`
    pub fn spot_ticks(&self, range: Range<usize>) -> Result<usize> {
        if range.end > self.data.len() {
            return Err(SimError::Range {
                tick: range.end.saturating_sub(1),
                length: self.data.len(),
            });
        }
        Ok(self.data[range].iter().filter(|&&v| v == 0).count())
    }

    /// Fraction of ticks with spot available
    pub fn availability(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let available = self.data.iter().filter(|&&v| v == 0).count();
        available as f64 / self.data.len() as f64
    }
}

/// A trace together with the name it was loaded under
#[derive(Debug, Clone)]
pub struct NamedTrace {
    pub name: String,
    pub trace: Arc<Trace>,
}

/// A folder of traces sharing one gap width
#[derive(Debug, Clone)]
pub struct TraceDataset {
    folder: PathBuf,
    traces: Vec<NamedTrace>,
    gap_seconds: u64,
}

impl TraceDataset {
    /// Load every `*.json` trace in `folder`, ordered by file name
    pub fn load(folder: impl AsRef<Path>) -> Result<Self> {
        let folder = folder.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(folder)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut traces = Vec::with_capacity(paths.len());
        for path in &paths {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            traces.push(NamedTrace {
                name,
                trace: Arc::new(Trace::from_file(path)?),
            });
        }

        let dataset = Self::from_traces(folder, traces)?;
        info!(
            folder = %folder.display(),
            traces = dataset.len(),
            gap_seconds = dataset.gap_seconds,
            "Loaded trace dataset"
        );
        Ok(dataset)
    }

    /// Build a dataset from already-loaded traces
    pub fn from_traces(folder: impl Into<PathBuf>, traces: Vec<NamedTrace>) -> Result<Self> {
        let folder = folder.into();
        let first = traces.first().ok_or_else(|| {
            SimError::format(format!("no traces found in {}", folder.display()))
        })?;
        let gap_seconds = first.trace.gap_seconds();

        if let Some(odd) = traces.iter().find(|t| t.trace.gap_seconds() != gap_seconds) {
            return Err(SimError::format(format!(
                "all traces must share one gap: {} has {}s, expected {}s",
                odd.name,
                odd.trace.gap_seconds(),
                gap_seconds
            )));
        }

        Ok(TraceDataset {
            folder,
            traces,
            gap_seconds,
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn gap_seconds(&self) -> u64 {
        self.gap_seconds
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn traces(&self) -> &[NamedTrace] {
        &self.traces
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedTrace> {
        self.traces.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("deadline-sim-trace-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_trace() {
        let trace = Trace::from_json_str(
            r#"{"metadata": {"gap_seconds": 600}, "data": [0, 1, 1, 0]}"#,
        )
        .unwrap();

        assert_eq!(trace.gap_seconds(), 600);
        assert_eq!(trace.len(), 4);
        assert_eq!(trace.at(1).unwrap(), 1);
        assert!(trace.is_available(0).unwrap());
        assert!(!trace.is_available(2).unwrap());
        assert_eq!(trace.availability(), 0.5);
    }

    #[test]
    fn test_out_of_range_is_error() {
        let trace = Trace::new(60, vec![0, 0]).unwrap();
        let err = trace.at(2).unwrap_err();
        assert!(matches!(err, SimError::Range { tick: 2, length: 2 }));
        assert!(trace.spot_ticks(0..3).is_err());
    }

    #[test]
    fn test_missing_gap_is_format_error() {
        let err = Trace::from_json_str(r#"{"metadata": {}, "data": [0]}"#).unwrap_err();
        assert!(matches!(err, SimError::Format(_)));

        let err = Trace::from_json_str(r#"{"data": [0]}"#).unwrap_err();
        assert!(matches!(err, SimError::Format(_)));
    }

    #[test]
    fn test_non_positive_gap_is_format_error() {
        for json in [
            r#"{"metadata": {"gap_seconds": 0}, "data": [0]}"#,
            r#"{"metadata": {"gap_seconds": -60}, "data": [0]}"#,
            r#"{"metadata": {"gap_seconds": 1.5}, "data": [0]}"#,
        ] {
            let err = Trace::from_json_str(json).unwrap_err();
            assert!(matches!(err, SimError::Format(_)), "{json}");
        }
    }

    #[test]
    fn test_non_binary_data_is_format_error() {
        let err =
            Trace::from_json_str(r#"{"metadata": {"gap_seconds": 60}, "data": [0, 2]}"#).unwrap_err();
        assert!(matches!(err, SimError::Format(_)));

        let err =
            Trace::from_json_str(r#"{"metadata": {"gap_seconds": 60}, "data": "0101"}"#).unwrap_err();
        assert!(matches!(err, SimError::Format(_)));

        assert!(Trace::new(60, vec![0, 3]).is_err());
    }

    #[test]
    fn test_save_and_reload_preserves_metadata() {
        let dir = temp_dir("roundtrip");
        let path = dir.join("trace.json");

        let trace = Trace::new(1200, vec![0, 1, 0, 0, 1])
            .unwrap()
            .with_generator("poisson")
            .with_metadata("hourly_rate", serde_json::json!(0.1));
        trace.save(&path).unwrap();

        let reloaded = Trace::from_file(&path).unwrap();
        assert_eq!(reloaded.gap_seconds(), 1200);
        assert_eq!(reloaded.data(), trace.data());
        assert_eq!(reloaded.generator(), Some("poisson"));
        assert_eq!(reloaded.metadata()["hourly_rate"], serde_json::json!(0.1));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_spot_ticks() {
        let trace = Trace::new(60, vec![0, 1, 0, 0, 1, 0]).unwrap();
        assert_eq!(trace.spot_ticks(0..6).unwrap(), 4);
        assert_eq!(trace.spot_ticks(1..3).unwrap(), 1);
        assert_eq!(trace.spot_ticks(2..2).unwrap(), 0);
    }

    #[test]
    fn test_dataset_requires_shared_gap() {
        let dir = temp_dir("dataset-gap");
        Trace::new(600, vec![0]).unwrap().save(dir.join("a.json")).unwrap();
        Trace::new(1200, vec![0]).unwrap().save(dir.join("b.json")).unwrap();

        let err = TraceDataset::load(&dir).unwrap_err();
        assert!(matches!(err, SimError::Format(_)));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_dataset_loads_sorted_json_only() {
        let dir = temp_dir("dataset-sorted");
        Trace::new(600, vec![1]).unwrap().save(dir.join("2.json")).unwrap();
        Trace::new(600, vec![0]).unwrap().save(dir.join("10.json")).unwrap();
        fs::write(dir.join("notes.txt"), "not a trace").unwrap();

        let dataset = TraceDataset::load(&dir).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.gap_seconds(), 600);
        let names: Vec<&str> = dataset.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["10", "2"]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_empty_dataset_is_error() {
        let dir = temp_dir("dataset-empty");
        assert!(matches!(TraceDataset::load(&dir), Err(SimError::Format(_))));
        fs::remove_dir_all(&dir).unwrap();
    }
}
