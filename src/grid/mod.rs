//! Parameter grid expansion
//!
//! A sweep declares, in order, every compile-time and run-time parameter with
//! its candidate values. Expansion is the plain cartesian product in
//! nested-loop order: the first declared parameter varies slowest. The split
//! of a full parameter point into compile key, positional run arguments, and
//! a display label is supplied by the caller, since only the sweep driver
//! knows which parameters reach the build tool and which reach the binary.
//!
//! No cross-parameter constraints are expressed here; invalid combinations
//! are the caller's responsibility.

use serde::{Deserialize, Serialize};

/// Ordered parameter declaration for one sweep.
#[derive(Debug, Clone, Default)]
pub struct ParameterGrid {
    params: Vec<(String, Vec<String>)>,
}

impl ParameterGrid {
    /// Create an empty grid.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter with its candidate values, in sweep order.
    ///
    /// Values are coerced to strings; that is the only transformation the
    /// grid applies.
    #[must_use]
    pub fn declare<S: Into<String>, I, V>(mut self, name: S, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.params
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Number of configurations the expansion will yield (product of the
    /// declared value-list sizes; 1 for an empty grid).
    #[must_use]
    pub fn product_len(&self) -> usize {
        self.params.iter().map(|(_, v)| v.len()).product()
    }

    /// Expand the grid into concrete experiment configurations.
    ///
    /// `split` maps each full parameter point to its compile-key/run-args
    /// split plus the derived label. Iteration order is nested-loop order
    /// with the first declared parameter varying slowest.
    pub fn expand<F>(&self, split: F) -> Vec<ExperimentConfig>
    where
        F: Fn(&ParamPoint) -> ExperimentConfig,
    {
        let mut configs = Vec::with_capacity(self.product_len());
        if self.params.iter().any(|(_, v)| v.is_empty()) {
            return configs;
        }

        let mut indices = vec![0usize; self.params.len()];
        loop {
            let point = ParamPoint {
                values: self
                    .params
                    .iter()
                    .zip(&indices)
                    .map(|((name, values), &i)| (name.clone(), values[i].clone()))
                    .collect(),
            };
            configs.push(split(&point));

            // Odometer increment, last declared parameter fastest.
            let mut pos = self.params.len();
            loop {
                if pos == 0 {
                    return configs;
                }
                pos -= 1;
                indices[pos] += 1;
                if indices[pos] < self.params[pos].1.len() {
                    break;
                }
                indices[pos] = 0;
            }
        }
    }
}

/// One point of the cartesian product: the declared parameters with one
/// concrete value each, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamPoint {
    values: Vec<(String, String)>,
}

impl ParamPoint {
    /// Look up a parameter value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All (name, value) pairs in declaration order.
    #[must_use]
    pub fn values(&self) -> &[(String, String)] {
        &self.values
    }
}

/// One concrete experiment configuration.
///
/// Immutable after expansion. Two configs with an equal compile key share one
/// build artifact; the run arguments follow the fixed positional contract of
/// the benchmark binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    compile_key: Vec<(String, String)>,
    run_args: Vec<String>,
    label: String,
}

impl ExperimentConfig {
    /// Create a configuration from its compile key, run arguments, and label.
    #[must_use]
    pub fn new<K, V, A>(
        compile_key: impl IntoIterator<Item = (K, V)>,
        run_args: impl IntoIterator<Item = A>,
        label: impl Into<String>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        A: Into<String>,
    {
        Self {
            compile_key: compile_key
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            run_args: run_args.into_iter().map(Into::into).collect(),
            label: label.into(),
        }
    }

    /// Ordered compile-time (name, value) pairs.
    #[must_use]
    pub fn compile_key(&self) -> &[(String, String)] {
        &self.compile_key
    }

    /// Canonical one-line rendering of the compile key, used for build
    /// caching and error reports (`name=value` pairs, space separated).
    #[must_use]
    pub fn compile_fingerprint(&self) -> String {
        self.compile_key
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Positional run arguments.
    #[must_use]
    pub fn run_args(&self) -> &[String] {
        &self.run_args
    }

    /// Display label (protocol name, optionally suffixed by feature flags).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}
