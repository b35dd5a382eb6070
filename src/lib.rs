//! # ccsweep: Benchmark Sweep Driver for Concurrency-Control Protocols
//!
//! ccsweep drives benchmark experiments for a family of concurrency-control
//! protocols (compile-time variants produced by an external native build
//! tool) and turns raw per-run CSV output into normalized, comparable
//! performance charts.
//!
//! ## Pipeline
//!
//! ```text
//! ParameterGrid ──▶ ExecutionDriver ──▶ ResultStore ──▶ MetricNormalizer ──▶ ChartRenderer
//!    (expand)       (build once,         (ingest,        (cycles→seconds,      (lines, bars,
//!                    run N trials,        group+sum,      per-core means)       per-core maps)
//!                    fail fast)           select)
//! ```
//!
//! Each stage consumes only the previous stage's output; none reaches back
//! upstream. Execution is deliberately single-threaded and fully sequential:
//! builds and runs claim whole machine cores, so serializing them keeps
//! measurements free of interference.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ccsweep::driver::{ExecutionDriver, SweepLayout};
//! use ccsweep::grid::ParameterGrid;
//!
//! let grid = ParameterGrid::new()
//!     .declare("protocol", ["caracal", "serval"])
//!     .declare("skew", ["0.1", "0.5"]);
//!
//! let configs = grid.expand(|point| {
//!     ccsweep::grid::ExperimentConfig::new(
//!         [("protocol", point.get("protocol").unwrap())],
//!         [point.get("protocol").unwrap(), point.get("skew").unwrap()],
//!         point.get("protocol").unwrap(),
//!     )
//! });
//! assert_eq!(configs.len(), 4);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod chart;
pub mod driver;
pub mod error;
pub mod grid;
pub mod normalize;
pub mod store;
pub mod track;

pub use error::{Error, Result};
