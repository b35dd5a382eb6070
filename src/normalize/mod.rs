//! Metric normalization
//!
//! Raw result columns are cycle counters and per-core sums; charts want
//! seconds, milliseconds, and per-unit-of-parallelism averages. A [`UnitPlan`]
//! is the declared table mapping each metric column to its [`UnitRule`]:
//! explicit per-column rules win, then the declared substring markers (e.g.
//! `"Time"` → cycles-to-seconds, `"Wait"` → cycles-to-milliseconds) are
//! checked in declaration order. Nothing is inferred beyond the markers the
//! caller declares.
//!
//! Normalization is NOT idempotent on raw data: applying an unapplied plan
//! twice divides twice. Callers normalize exactly once per raw table; a plan
//! whose `applied` flag is set is a no-op, which is the only sanctioned way
//! to re-run the plotting stage on already-normalized data.

use serde::{Deserialize, Serialize};

use crate::store::{ResultTable, Value};
use crate::{Error, Result};

/// CPU clock rate, declared in cycles per microsecond.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockRate {
    cycles_per_us: f64,
}

impl ClockRate {
    /// Declare a clock rate in cycles per microsecond (e.g. 2100 for a
    /// 2.1 GHz machine).
    #[must_use]
    pub const fn per_us(cycles_per_us: f64) -> Self {
        Self { cycles_per_us }
    }

    /// Cycles per microsecond.
    #[must_use]
    pub const fn cycles_per_us(&self) -> f64 {
        self.cycles_per_us
    }

    /// Cycles per millisecond.
    #[must_use]
    pub fn cycles_per_ms(&self) -> f64 {
        self.cycles_per_us * 1_000.0
    }

    /// Cycles per second.
    #[must_use]
    pub fn cycles_per_sec(&self) -> f64 {
        self.cycles_per_us * 1_000_000.0
    }
}

/// How one metric column is rescaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitRule {
    /// Leave the column untouched.
    Identity,
    /// Divide by the trial repeat count (merge of repeated trials → mean).
    PerTrial(u32),
    /// Divide by the core count (per-core sum → per-core average).
    PerCore(u32),
    /// Divide by the measured duration in seconds (count → rate).
    PerSecond(u64),
    /// Divide by the clock rate to convert cycles to seconds.
    CyclesToSeconds,
    /// Divide by the clock rate to convert cycles to milliseconds.
    CyclesToMillis,
}

impl UnitRule {
    /// Axis-label unit suffix for the rule, if it changes the unit.
    #[must_use]
    pub const fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::CyclesToSeconds => Some(" [s]"),
            Self::CyclesToMillis => Some(" [ms]"),
            _ => None,
        }
    }
}

/// Declared metric-column → unit-rule table for one sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPlan {
    clock: ClockRate,
    markers: Vec<(String, UnitRule)>,
    overrides: Vec<(String, UnitRule)>,
    applied: bool,
}

impl UnitPlan {
    /// Create an empty plan for the given clock rate.
    #[must_use]
    pub const fn new(clock: ClockRate) -> Self {
        Self {
            clock,
            markers: Vec::new(),
            overrides: Vec::new(),
            applied: false,
        }
    }

    /// Declare a substring marker: every column whose name contains
    /// `substring` (and has no explicit override) gets `rule`. Markers are
    /// checked in declaration order; the first match wins.
    #[must_use]
    pub fn marker(mut self, substring: impl Into<String>, rule: UnitRule) -> Self {
        self.markers.push((substring.into(), rule));
        self
    }

    /// Declare an explicit rule for one column. Overrides beat markers.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, rule: UnitRule) -> Self {
        self.overrides.push((name.into(), rule));
        self
    }

    /// Mark the plan as already applied: [`UnitPlan::normalize`] becomes a
    /// no-op. This is the explicit idempotence switch for re-running the
    /// plotting stage on normalized data.
    #[must_use]
    pub fn mark_applied(mut self) -> Self {
        self.applied = true;
        self
    }

    /// Whether the plan is marked already applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.applied
    }

    /// The declared clock rate.
    #[must_use]
    pub const fn clock(&self) -> ClockRate {
        self.clock
    }

    /// Resolve the rule for a column: explicit override first, then the
    /// first declared marker whose substring the name contains, else
    /// identity.
    #[must_use]
    pub fn rule_for(&self, column: &str) -> UnitRule {
        if let Some((_, rule)) = self.overrides.iter().find(|(name, _)| name == column) {
            return *rule;
        }
        self.markers
            .iter()
            .find(|(substring, _)| column.contains(substring.as_str()))
            .map_or(UnitRule::Identity, |(_, rule)| *rule)
    }

    /// Axis-label unit suffix for a column ("" when the unit is unchanged).
    #[must_use]
    pub fn unit_suffix(&self, column: &str) -> &'static str {
        self.rule_for(column).suffix().unwrap_or("")
    }

    fn divisor(&self, rule: UnitRule) -> f64 {
        match rule {
            UnitRule::Identity => 1.0,
            UnitRule::PerTrial(n) => f64::from(n),
            UnitRule::PerCore(n) => f64::from(n),
            UnitRule::PerSecond(s) => {
                // u64 → f64 is exact for any realistic duration.
                #[allow(clippy::cast_precision_loss)]
                {
                    s as f64
                }
            }
            UnitRule::CyclesToSeconds => self.clock.cycles_per_sec(),
            UnitRule::CyclesToMillis => self.clock.cycles_per_ms(),
        }
    }

    /// Apply the plan to a table, returning the rescaled copy.
    ///
    /// An applied plan returns the table unchanged. Otherwise every column
    /// with a non-identity rule is divided cell-wise by the rule's divisor.
    ///
    /// # Errors
    ///
    /// `Error::Aggregation` if a column with a non-identity rule holds a
    /// non-numeric cell.
    pub fn normalize(&self, table: &ResultTable) -> Result<ResultTable> {
        if self.applied {
            return Ok(table.clone());
        }

        let rules: Vec<UnitRule> = table
            .columns()
            .iter()
            .map(|c| self.rule_for(c))
            .collect();

        let mut out = ResultTable::new(table.columns().to_vec());
        for row in table.rows() {
            let mut cells = Vec::with_capacity(row.len());
            for (cell, (rule, column)) in row.iter().zip(rules.iter().zip(table.columns())) {
                if *rule == UnitRule::Identity {
                    cells.push(cell.clone());
                    continue;
                }
                let raw = cell.as_num().ok_or_else(|| {
                    Error::Aggregation(format!(
                        "non-numeric cell in normalized column '{column}'"
                    ))
                })?;
                cells.push(Value::Num(raw / self.divisor(*rule)));
            }
            out.push_row(cells)?;
        }
        Ok(out)
    }
}

/// One labeled series of (x-tick, value) points for one metric, in sweep
/// order. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    label: String,
    points: Vec<(String, f64)>,
}

impl NormalizedSeries {
    /// Extract a series from a (grouped, normalized) table: x ticks from
    /// `x_column` rendered as text, values from `metric`.
    ///
    /// # Errors
    ///
    /// `Error::Ingest` if either column is missing; `Error::Aggregation` if a
    /// metric cell is non-numeric.
    pub fn from_table(
        table: &ResultTable,
        x_column: &str,
        metric: &str,
        label: impl Into<String>,
    ) -> Result<Self> {
        let x_idx = table.column_index(x_column)?;
        let m_idx = table.column_index(metric)?;
        let mut points = Vec::with_capacity(table.num_rows());
        for row in table.rows() {
            let value = row[m_idx].as_num().ok_or_else(|| {
                Error::Aggregation(format!("non-numeric cell in metric column '{metric}'"))
            })?;
            points.push((row[x_idx].to_string(), value));
        }
        Ok(Self {
            label: label.into(),
            points,
        })
    }

    /// Derive a pointwise ratio series `numerator / denominator × scale`
    /// (e.g. cache miss rate as misses over references × 100).
    ///
    /// # Errors
    ///
    /// `Error::Ingest` if a column is missing; `Error::Aggregation` if a cell
    /// is non-numeric or a ratio is non-finite (zero denominator).
    pub fn ratio(
        table: &ResultTable,
        x_column: &str,
        numerator: &str,
        denominator: &str,
        scale: f64,
        label: impl Into<String>,
    ) -> Result<Self> {
        let x_idx = table.column_index(x_column)?;
        let n_idx = table.column_index(numerator)?;
        let d_idx = table.column_index(denominator)?;
        let mut points = Vec::with_capacity(table.num_rows());
        for row in table.rows() {
            let (Some(n), Some(d)) = (row[n_idx].as_num(), row[d_idx].as_num()) else {
                return Err(Error::Aggregation(format!(
                    "non-numeric cell in ratio columns '{numerator}'/'{denominator}'"
                )));
            };
            let value = n / d * scale;
            if !value.is_finite() {
                return Err(Error::Aggregation(format!(
                    "non-finite ratio for '{numerator}'/'{denominator}' at x={}",
                    row[x_idx]
                )));
            }
            points.push((row[x_idx].to_string(), value));
        }
        Ok(Self {
            label: label.into(),
            points,
        })
    }

    /// Series label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The (x-tick, value) points in sweep order.
    #[must_use]
    pub fn points(&self) -> &[(String, f64)] {
        &self.points
    }

    /// Largest value of the series (0.0 for an empty series).
    #[must_use]
    pub fn y_max(&self) -> f64 {
        self.points.iter().map(|(_, v)| *v).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_table() -> ResultTable {
        let mut t = ResultTable::new(
            ["protocol", "contention", "ExecutionTime", "WaitInExecution", "Commits"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        );
        t.push_row(vec![
            Value::Text("caracal".to_string()),
            Value::Num(0.5),
            Value::Num(210_000_000.0),
            Value::Num(4_200_000.0),
            Value::Num(1000.0),
        ])
        .unwrap();
        t
    }

    fn plan() -> UnitPlan {
        UnitPlan::new(ClockRate::per_us(2100.0))
            .marker("Time", UnitRule::CyclesToSeconds)
            .marker("Wait", UnitRule::CyclesToMillis)
    }

    #[test]
    fn cycles_convert_to_declared_units() {
        let normalized = plan().normalize(&raw_table()).unwrap();
        let row = &normalized.rows()[0];
        // 210_000_000 cycles at 2100 cycles/us = 0.1 s.
        assert!((row[2].as_num().unwrap() - 0.1).abs() < 1e-12);
        // 4_200_000 cycles = 2 ms.
        assert!((row[3].as_num().unwrap() - 2.0).abs() < 1e-12);
        // No marker, no override: untouched.
        assert_eq!(row[4], Value::Num(1000.0));
    }

    #[test]
    fn small_counter_converts_to_microscale_seconds() {
        let plan = plan();
        // 210000 cycles at 2100 cycles/us = 100 us = 1e-4 s.
        let divisor = plan.clock().cycles_per_sec();
        assert!((210_000.0 / divisor - 1e-4).abs() < 1e-18);
    }

    #[test]
    fn override_beats_marker() {
        let plan = plan().column("ExecutionTime", UnitRule::Identity);
        assert_eq!(plan.rule_for("ExecutionTime"), UnitRule::Identity);
        assert_eq!(plan.rule_for("InitializationTime"), UnitRule::CyclesToSeconds);
    }

    #[test]
    fn first_declared_marker_wins() {
        let plan = UnitPlan::new(ClockRate::per_us(2100.0))
            .marker("WaitTime", UnitRule::CyclesToMillis)
            .marker("Time", UnitRule::CyclesToSeconds);
        assert_eq!(plan.rule_for("TotalWaitTime"), UnitRule::CyclesToMillis);
        assert_eq!(plan.rule_for("TotalTime"), UnitRule::CyclesToSeconds);
    }

    #[test]
    fn applied_plan_is_a_no_op() {
        let raw = raw_table();
        let normalized = plan().mark_applied().normalize(&raw).unwrap();
        assert_eq!(normalized, raw);
    }

    #[test]
    fn per_core_divides_by_core_count() {
        let plan = UnitPlan::new(ClockRate::per_us(2100.0))
            .column("Commits", UnitRule::PerCore(64));
        let normalized = plan.normalize(&raw_table()).unwrap();
        assert!((normalized.rows()[0][4].as_num().unwrap() - 15.625).abs() < 1e-12);
    }

    #[test]
    fn unit_suffix_follows_rule() {
        let plan = plan();
        assert_eq!(plan.unit_suffix("ExecutionTime"), " [s]");
        assert_eq!(plan.unit_suffix("WaitInExecution"), " [ms]");
        assert_eq!(plan.unit_suffix("Commits"), "");
    }

    #[test]
    fn normalize_rejects_text_in_converted_column() {
        let mut t = ResultTable::new(vec!["ExecutionTime".to_string()]);
        t.push_row(vec![Value::Text("fast".to_string())]).unwrap();
        let err = plan().normalize(&t).unwrap_err();
        assert!(matches!(err, Error::Aggregation(_)));
    }

    #[test]
    fn series_extraction_keeps_sweep_order() {
        let mut t = ResultTable::new(vec!["contention".to_string(), "TotalTime".to_string()]);
        for (x, v) in [(0.99, 3.0), (0.1, 1.0), (0.5, 2.0)] {
            t.push_row(vec![Value::Num(x), Value::Num(v)]).unwrap();
        }
        let series = NormalizedSeries::from_table(&t, "contention", "TotalTime", "caracal").unwrap();
        let ticks: Vec<_> = series.points().iter().map(|(x, _)| x.as_str()).collect();
        assert_eq!(ticks, ["0.99", "0.1", "0.5"]);
        assert_eq!(series.label(), "caracal");
    }

    #[test]
    fn ratio_series_scales_pointwise() {
        let mut t = ResultTable::new(
            ["contention", "PerfLeader", "PerfMember"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        );
        t.push_row(vec![Value::Num(0.5), Value::Num(200.0), Value::Num(50.0)])
            .unwrap();
        let series =
            NormalizedSeries::ratio(&t, "contention", "PerfMember", "PerfLeader", 100.0, "caracal")
                .unwrap();
        assert!((series.points()[0].1 - 25.0).abs() < 1e-12);
    }

    #[test]
    fn ratio_rejects_zero_denominator() {
        let mut t = ResultTable::new(
            ["x", "num", "den"].iter().map(ToString::to_string).collect(),
        );
        t.push_row(vec![Value::Num(1.0), Value::Num(5.0), Value::Num(0.0)])
            .unwrap();
        let err = NormalizedSeries::ratio(&t, "x", "num", "den", 100.0, "p").unwrap_err();
        assert!(matches!(err, Error::Aggregation(_)));
    }
}
