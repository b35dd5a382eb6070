//! Error types for ccsweep
//!
//! Build and run failures are fatal for the whole sweep: there is no retry
//! policy and no partial-result salvage. Ingest and style errors are fatal to
//! the plotting stage only; they name the offending file or label so the
//! caller can fix the declared configuration and rerun plotting alone.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ccsweep error types
#[derive(Error, Debug)]
pub enum Error {
    /// Non-zero exit from the external build tool (fatal, halts the sweep)
    #[error("build failed for [{key}] with exit status {status}; compile log: {log}")]
    Build {
        /// Compile key of the failed configuration
        key: String,
        /// Exit status of the build tool
        status: i32,
        /// Path to the captured compile log
        log: PathBuf,
    },

    /// Non-zero exit from a benchmark run (fatal, halts the sweep)
    #[error("run failed for [{label}] trial {trial} with exit status {status}; capture: {capture}")]
    Run {
        /// Label of the failed configuration
        label: String,
        /// Trial index that failed
        trial: u32,
        /// Exit status of the benchmark binary
        status: i32,
        /// Path to the captured stdout/stderr
        capture: PathBuf,
    },

    /// Result file missing or misaligned with the declared schema
    #[error("ingest error: {0}")]
    Ingest(String),

    /// A rendered label has no entry in the style table
    #[error("no style declared for label '{0}'")]
    StyleMissing(String),

    /// Grouping over columns with inconsistent cell types
    #[error("aggregation error: {0}")]
    Aggregation(String),

    /// Chart backend error
    #[error("chart error: {0}")]
    Chart(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
