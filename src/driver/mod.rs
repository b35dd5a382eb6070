//! Build and run execution
//!
//! The driver walks the expanded configurations twice: one build pass that
//! compiles each distinct compile key exactly once, in first-seen order, then
//! one run pass executing the declared number of trials per configuration,
//! strictly sequentially. Any non-zero exit status, build or run, halts the
//! whole sweep; there is no retry and no partial-result salvage. Durable
//! artifacts (binaries, compile logs, capture files) are never deleted or
//! overwritten across invocations except by the build tool itself.
//!
//! The external build tool and the benchmark binaries sit behind the
//! [`Toolchain`] trait; [`CmakeToolchain`] is the production implementation.
//! All paths are threaded explicitly through [`SweepLayout`]; the driver
//! never changes the process working directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use tracing::{error, info};

use crate::grid::ExperimentConfig;
use crate::track::{SweepManifest, TrialRecord, TrialStatus};
use crate::{Error, Result};

/// On-disk layout of one sweep, rooted at an explicit base directory.
///
/// ```text
/// base/
///   build/            build tree of the external tool
///   build/log/        compile logs, one per compile key
///   build/bin/        compiled benchmark binaries
///   build/bin/res/    per-run CSV output, header/param files, sweep.json
///   build/bin/res/tmp/    captured stdout/stderr per trial
///   build/bin/res/plots/  rendered charts
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepLayout {
    base: PathBuf,
}

impl SweepLayout {
    /// Create a layout rooted at `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base directory of the sweep.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Build tree of the external tool.
    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.base.join("build")
    }

    /// Compile-log directory.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.build_dir().join("log")
    }

    /// Directory holding the compiled benchmark binaries.
    #[must_use]
    pub fn bin_dir(&self) -> PathBuf {
        self.build_dir().join("bin")
    }

    /// Result directory the benchmark binaries append CSV rows into.
    #[must_use]
    pub fn results_dir(&self) -> PathBuf {
        self.bin_dir().join("res")
    }

    /// Per-trial stdout/stderr capture directory.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.results_dir().join("tmp")
    }

    /// Chart output directory.
    #[must_use]
    pub fn plots_dir(&self) -> PathBuf {
        self.results_dir().join("plots")
    }

    /// Path of the sweep manifest JSON.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.results_dir().join("sweep.json")
    }

    /// Create every directory of the layout that does not exist yet.
    ///
    /// Existing directories and their contents are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn prepare(&self) -> Result<()> {
        for dir in [
            self.build_dir(),
            self.log_dir(),
            self.bin_dir(),
            self.results_dir(),
            self.tmp_dir(),
            self.plots_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Outcome of one build invocation: where the executable landed and the exit
/// status of the slowest-failing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// Path of the produced executable.
    pub executable: PathBuf,
    /// Exit status of the build tool (zero on success).
    pub status: i32,
}

/// One compiled binary, cached per distinct compile key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    fingerprint: String,
    executable: PathBuf,
    log: PathBuf,
}

impl BuildArtifact {
    /// Canonical compile-key fingerprint this artifact was built from.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Path of the compiled executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Path of the captured compile log.
    #[must_use]
    pub fn log(&self) -> &Path {
        &self.log
    }
}

/// Seam to the external build tool and benchmark binaries.
///
/// Implementations report the exit status; the driver decides that non-zero
/// is fatal. I/O failures (spawn, capture file) are errors in their own
/// right.
pub trait Toolchain {
    /// Compile the binary for one configuration's compile key, capturing the
    /// tool output to `log`.
    ///
    /// # Errors
    ///
    /// Returns an error if the build tool cannot be spawned or the log file
    /// cannot be written.
    fn build(&self, config: &ExperimentConfig, log: &Path) -> Result<BuildOutput>;

    /// Execute one trial, capturing stdout/stderr to `capture`, and return
    /// the exit status.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary cannot be spawned or the capture file
    /// cannot be written.
    fn run(&self, executable: &Path, args: &[String], capture: &Path) -> Result<i32>;
}

/// Production [`Toolchain`]: configure + compile via `cmake`/`make`, run the
/// named executable with positional arguments.
///
/// Compile-key names are passed through verbatim as `-D<name>=<value>`
/// definitions, so the grid's split function declares the actual build-tool
/// flag names (`CC_ALG`, `PAYLOAD_SIZE`, ...). The executable name for a
/// configuration is derived by the caller-supplied namer.
pub struct CmakeToolchain {
    source_dir: PathBuf,
    build_dir: PathBuf,
    bin_dir: PathBuf,
    build_type: String,
    benchmark: String,
    run_prefix: Vec<String>,
    namer: Box<dyn Fn(&ExperimentConfig) -> String + Send + Sync>,
}

impl CmakeToolchain {
    /// Create a toolchain for `source_dir`, building into `layout`.
    ///
    /// `build_type` is the `CMAKE_BUILD_TYPE` value (`Release` for paper
    /// experiments, `Debug` otherwise); `benchmark` selects the benchmark
    /// kind (`YCSB`, `TPCC`); `namer` maps a configuration to the executable
    /// name the build produces.
    #[must_use]
    pub fn new(
        source_dir: impl Into<PathBuf>,
        layout: &SweepLayout,
        build_type: impl Into<String>,
        benchmark: impl Into<String>,
        namer: impl Fn(&ExperimentConfig) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            build_dir: layout.build_dir(),
            bin_dir: layout.bin_dir(),
            build_type: build_type.into(),
            benchmark: benchmark.into(),
            run_prefix: Vec::new(),
            namer: Box::new(namer),
        }
    }

    /// Prefix the run invocation with a wrapper command, e.g.
    /// `["numactl", "--interleave=all"]` or `["sudo"]`.
    #[must_use]
    pub fn with_run_prefix<I, S>(mut self, prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_prefix = prefix.into_iter().map(Into::into).collect();
        self
    }

    fn exit_code(status: std::process::ExitStatus) -> i32 {
        // Signal-terminated processes have no code; treat as failure.
        status.code().unwrap_or(-1)
    }
}

impl std::fmt::Debug for CmakeToolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmakeToolchain")
            .field("source_dir", &self.source_dir)
            .field("build_dir", &self.build_dir)
            .field("build_type", &self.build_type)
            .field("benchmark", &self.benchmark)
            .field("run_prefix", &self.run_prefix)
            .finish_non_exhaustive()
    }
}

impl Toolchain for CmakeToolchain {
    fn build(&self, config: &ExperimentConfig, log: &Path) -> Result<BuildOutput> {
        let executable = self.bin_dir.join((self.namer)(config));

        let log_file = File::create(log)?;
        let mut configure = Command::new("cmake");
        configure
            .arg(&self.source_dir)
            .arg("-DLOG_LEVEL=0")
            .arg(format!("-DCMAKE_BUILD_TYPE={}", self.build_type))
            .arg(format!("-DBENCHMARK={}", self.benchmark));
        for (name, value) in config.compile_key() {
            configure.arg(format!("-D{name}={value}"));
        }
        let status = configure
            .current_dir(&self.build_dir)
            .stdout(log_file.try_clone()?)
            .stderr(log_file)
            .status()?;
        if !status.success() {
            return Ok(BuildOutput {
                executable,
                status: Self::exit_code(status),
            });
        }

        let make_log = File::options().append(true).open(log)?;
        let status = Command::new("make")
            .arg("-j")
            .current_dir(&self.build_dir)
            .stdout(make_log.try_clone()?)
            .stderr(make_log)
            .status()?;
        Ok(BuildOutput {
            executable,
            status: Self::exit_code(status),
        })
    }

    fn run(&self, executable: &Path, args: &[String], capture: &Path) -> Result<i32> {
        let capture_file = File::create(capture)?;
        let mut cmd = if let Some((wrapper, rest)) = self.run_prefix.split_first() {
            let mut cmd = Command::new(wrapper);
            cmd.args(rest).arg(executable);
            cmd
        } else {
            Command::new(executable)
        };
        let status = cmd
            .args(args)
            .current_dir(&self.bin_dir)
            .stdout(capture_file.try_clone()?)
            .stderr(capture_file)
            .status()?;
        Ok(Self::exit_code(status))
    }
}

/// Sequential build-once/run-many driver with fail-fast semantics.
pub struct ExecutionDriver<'a, T: Toolchain> {
    toolchain: &'a T,
    layout: &'a SweepLayout,
    trials: u32,
}

impl<'a, T: Toolchain> ExecutionDriver<'a, T> {
    /// Create a driver running `trials` repetitions per configuration.
    #[must_use]
    pub const fn new(toolchain: &'a T, layout: &'a SweepLayout, trials: u32) -> Self {
        Self {
            toolchain,
            layout,
            trials,
        }
    }

    /// Build and run every configuration, recording trial lifecycle into
    /// `manifest`.
    ///
    /// Each distinct compile key is built exactly once, in first-seen order.
    /// Trials run strictly sequentially. The manifest is persisted both on
    /// success and before surfacing a fatal error, so the failure report
    /// identifies the exact configuration and trial to resume from.
    ///
    /// # Errors
    ///
    /// `Error::Build` or `Error::Run` on the first non-zero exit status;
    /// `Error::Io` if a log or capture file cannot be created.
    pub fn execute(
        &self,
        configs: &[ExperimentConfig],
        manifest: &mut SweepManifest,
    ) -> Result<Vec<BuildArtifact>> {
        self.layout.prepare()?;
        let (artifacts, slots) = self.build_all(configs, manifest)?;
        self.run_all(configs, &artifacts, &slots, manifest)?;
        manifest.persist(&self.layout.manifest_path())?;
        Ok(artifacts)
    }

    /// Build pass. Returns the artifacts plus, for each config, the index of
    /// the artifact it shares.
    fn build_all(
        &self,
        configs: &[ExperimentConfig],
        manifest: &mut SweepManifest,
    ) -> Result<(Vec<BuildArtifact>, Vec<usize>)> {
        let log_dir = self.layout.log_dir();
        let mut artifacts: Vec<BuildArtifact> = Vec::new();
        let mut slots = Vec::with_capacity(configs.len());

        for config in configs {
            let fingerprint = config.compile_fingerprint();
            if let Some(at) = artifacts.iter().position(|a| a.fingerprint == fingerprint) {
                slots.push(at);
                continue;
            }

            info!("compiling [{fingerprint}]");
            let log = log_dir.join(format!("{}.compile_log", sanitize(&fingerprint)));
            let output = self.toolchain.build(config, &log)?;
            if output.status != 0 {
                error!("build failed for [{fingerprint}], stopping");
                manifest.persist(&self.layout.manifest_path())?;
                return Err(Error::Build {
                    key: fingerprint,
                    status: output.status,
                    log,
                });
            }
            slots.push(artifacts.len());
            artifacts.push(BuildArtifact {
                fingerprint,
                executable: output.executable,
                log,
            });
        }
        Ok((artifacts, slots))
    }

    fn run_all(
        &self,
        configs: &[ExperimentConfig],
        artifacts: &[BuildArtifact],
        slots: &[usize],
        manifest: &mut SweepManifest,
    ) -> Result<()> {
        let tmp_dir = self.layout.tmp_dir();

        for (config, &slot) in configs.iter().zip(slots) {
            let artifact = &artifacts[slot];

            info!("[{}: {}]", config.label(), config.run_args().join(" "));
            for trial in 0..self.trials {
                info!(" trial {trial}");
                let mut record = TrialRecord::new(config.label(), trial);
                // The manifest index keeps capture names collision-free even
                // when trials finish within the same timestamp tick.
                let capture = tmp_dir.join(format!(
                    "{:04}_{}_{}",
                    manifest.trials().len(),
                    config.label(),
                    Utc::now().format("%Y%m%dT%H%M%S%.6fZ")
                ));
                record.start(capture.clone());

                let mut args = config.run_args().to_vec();
                args.push(trial.to_string());
                let status = self.toolchain.run(&artifact.executable, &args, &capture)?;

                let trial_status = if status == 0 {
                    TrialStatus::Success
                } else {
                    TrialStatus::Failed
                };
                record.complete(trial_status);
                manifest.push_trial(record);

                if status != 0 {
                    error!(
                        "run failed for [{}] trial {trial}, stopping",
                        config.label()
                    );
                    manifest.persist(&self.layout.manifest_path())?;
                    return Err(Error::Run {
                        label: config.label().to_string(),
                        trial,
                        status,
                        capture,
                    });
                }
            }
        }
        Ok(())
    }
}

fn sanitize(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_rooted_at_base() {
        let layout = SweepLayout::new("/tmp/sweep");
        assert_eq!(layout.log_dir(), Path::new("/tmp/sweep/build/log"));
        assert_eq!(layout.results_dir(), Path::new("/tmp/sweep/build/bin/res"));
        assert_eq!(
            layout.plots_dir(),
            Path::new("/tmp/sweep/build/bin/res/plots")
        );
        assert_eq!(
            layout.manifest_path(),
            Path::new("/tmp/sweep/build/bin/res/sweep.json")
        );
    }

    #[test]
    fn sanitize_flattens_separators() {
        assert_eq!(
            sanitize("CC_ALG=CARACAL PAYLOAD_SIZE=4"),
            "CC_ALG_CARACAL_PAYLOAD_SIZE_4"
        );
    }
}
