//! Sweep lifecycle records
//!
//! One sweep produces one [`SweepRecord`] and one [`TrialRecord`] per
//! executed trial. The records are serialized as a JSON manifest next to the
//! result files, so a failed sweep reports exactly which configuration and
//! trial to resume from without rerunning already-succeeded trials.
//!
//! ```text
//! SweepRecord (1) ──< TrialRecord (N)
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Status of one benchmark trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    /// Trial is planned but not yet started.
    Pending,
    /// Trial is currently executing.
    Running,
    /// Trial completed with exit status zero.
    Success,
    /// Trial (or its build) failed; the sweep halted here.
    Failed,
}

/// Provenance record for one sweep invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepRecord {
    sweep_id: String,
    name: String,
    varying: String,
    created_at: DateTime<Utc>,
    config: Option<serde_json::Value>,
}

impl SweepRecord {
    /// Create a new sweep record stamped with the current time.
    ///
    /// `varying` names the parameter whose values become the x axis of every
    /// chart for this sweep.
    #[must_use]
    pub fn new(
        sweep_id: impl Into<String>,
        name: impl Into<String>,
        varying: impl Into<String>,
    ) -> Self {
        Self {
            sweep_id: sweep_id.into(),
            name: name.into(),
            varying: varying.into(),
            created_at: Utc::now(),
            config: None,
        }
    }

    /// Attach an arbitrary JSON config blob (grids, trial counts, clock rate).
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Sweep identifier.
    #[must_use]
    pub fn sweep_id(&self) -> &str {
        &self.sweep_id
    }

    /// Human-readable sweep name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The varying parameter of this sweep.
    #[must_use]
    pub fn varying(&self) -> &str {
        &self.varying
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Attached config blob, if any.
    #[must_use]
    pub const fn config(&self) -> Option<&serde_json::Value> {
        self.config.as_ref()
    }
}

/// Lifecycle record for a single trial of one configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrialRecord {
    label: String,
    trial: u32,
    status: TrialStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    capture: Option<PathBuf>,
}

impl TrialRecord {
    /// Create a pending trial record.
    #[must_use]
    pub fn new(label: impl Into<String>, trial: u32) -> Self {
        Self {
            label: label.into(),
            trial,
            status: TrialStatus::Pending,
            started_at: None,
            ended_at: None,
            capture: None,
        }
    }

    /// Configuration label this trial belongs to.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Trial index within its configuration.
    #[must_use]
    pub const fn trial(&self) -> u32 {
        self.trial
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        self.status
    }

    /// Start timestamp, if the trial has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// End timestamp, if the trial has finished.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Path of the captured stdout/stderr, once started.
    #[must_use]
    pub fn capture(&self) -> Option<&Path> {
        self.capture.as_deref()
    }

    /// Mark the trial running and record its capture path.
    pub fn start(&mut self, capture: PathBuf) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
        self.capture = Some(capture);
    }

    /// Mark the trial finished with a terminal status.
    pub fn complete(&mut self, status: TrialStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

/// The sweep record plus every trial record, persisted as `sweep.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepManifest {
    sweep: SweepRecord,
    trials: Vec<TrialRecord>,
}

impl SweepManifest {
    /// Create a manifest for one sweep.
    #[must_use]
    pub const fn new(sweep: SweepRecord) -> Self {
        Self {
            sweep,
            trials: Vec::new(),
        }
    }

    /// The sweep record.
    #[must_use]
    pub const fn sweep(&self) -> &SweepRecord {
        &self.sweep
    }

    /// All recorded trials, in execution order.
    #[must_use]
    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    /// Append a trial record, returning its index.
    pub fn push_trial(&mut self, trial: TrialRecord) -> usize {
        self.trials.push(trial);
        self.trials.len() - 1
    }

    /// Mutable access to a trial record by index.
    pub fn trial_mut(&mut self, index: usize) -> Option<&mut TrialRecord> {
        self.trials.get_mut(index)
    }

    /// Write the manifest as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| crate::Error::Ingest(format!("manifest write failed: {e}")))?;
        Ok(())
    }

    /// Read a manifest back from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not valid manifest JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| crate::Error::Ingest(format!("manifest parse failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_lifecycle() {
        let mut trial = TrialRecord::new("caracal", 0);
        assert_eq!(trial.status(), TrialStatus::Pending);
        assert!(trial.started_at().is_none());

        trial.start(PathBuf::from("res/tmp/caracal_t0"));
        assert_eq!(trial.status(), TrialStatus::Running);
        assert!(trial.started_at().is_some());
        assert!(trial.ended_at().is_none());

        trial.complete(TrialStatus::Success);
        assert_eq!(trial.status(), TrialStatus::Success);
        assert!(trial.ended_at().is_some());
    }

    #[test]
    fn manifest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");

        let sweep = SweepRecord::new("sweep-1", "ycsb contention sweep", "contention")
            .with_config(serde_json::json!({"trials": 1, "seconds": 1}));
        let mut manifest = SweepManifest::new(sweep);
        let idx = manifest.push_trial(TrialRecord::new("serval", 0));
        manifest
            .trial_mut(idx)
            .unwrap()
            .complete(TrialStatus::Failed);

        manifest.persist(&path).unwrap();
        let loaded = SweepManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.trials()[0].status(), TrialStatus::Failed);
    }

    #[test]
    fn sweep_record_carries_varying_parameter() {
        let sweep = SweepRecord::new("sweep-2", "tpcc", "num_warehouses");
        assert_eq!(sweep.varying(), "num_warehouses");
        assert!(sweep.config().is_none());
    }
}
