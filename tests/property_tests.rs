//! Property-based tests for grid expansion, grouping, and unit conversion.
//!
//! Run with ProptestConfig::with_cases(100); must stay fast enough for a
//! pre-commit hook.

use proptest::prelude::*;

use ccsweep::grid::{ExperimentConfig, ParameterGrid};
use ccsweep::normalize::{ClockRate, UnitPlan, UnitRule};
use ccsweep::store::{ResultTable, Value};

// ============================================================================
// Strategies
// ============================================================================

/// A grid of 1..=4 parameters with 1..=4 values each.
fn arb_grid() -> impl Strategy<Value = ParameterGrid> {
    proptest::collection::vec(1usize..=4, 1..=4).prop_map(|sizes| {
        let mut grid = ParameterGrid::new();
        for (p, size) in sizes.iter().enumerate() {
            let values: Vec<String> = (0..*size).map(|v| format!("v{p}_{v}")).collect();
            grid = grid.declare(format!("p{p}"), values);
        }
        grid
    })
}

/// A small table with one text key column and two numeric metric columns.
fn arb_table(rows: usize) -> impl Strategy<Value = ResultTable> {
    (
        proptest::collection::vec("k[a-d]", rows),
        proptest::collection::vec(0.0f64..1000.0, rows),
        proptest::collection::vec(0.0f64..1000.0, rows),
    )
        .prop_map(|(keys, xs, ys)| {
            let mut table =
                ResultTable::new(["key", "x", "y"].iter().map(ToString::to_string).collect());
            for ((key, x), y) in keys.into_iter().zip(xs).zip(ys) {
                table
                    .push_row(vec![Value::Text(key), Value::Num(x), Value::Num(y)])
                    .unwrap();
            }
            table
        })
}

fn count_split(point: &ccsweep::grid::ParamPoint) -> ExperimentConfig {
    ExperimentConfig::new(
        Vec::<(String, String)>::new(),
        point.values().iter().map(|(_, v)| v.clone()),
        "label",
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: expansion yields exactly the product of the declared sizes.
    #[test]
    fn prop_expansion_count_is_product(grid in arb_grid()) {
        let configs = grid.expand(count_split);
        prop_assert_eq!(configs.len(), grid.product_len());
    }

    /// Property: every expanded configuration is a distinct tuple.
    #[test]
    fn prop_expansion_tuples_are_distinct(grid in arb_grid()) {
        let configs = grid.expand(count_split);
        for (i, a) in configs.iter().enumerate() {
            for b in &configs[i + 1..] {
                prop_assert_ne!(a.run_args(), b.run_args());
            }
        }
    }

    /// Property: grouping an already-grouped table is the identity.
    #[test]
    fn prop_group_and_sum_is_idempotent(table in arb_table(24)) {
        let group = vec!["key".to_string()];
        let once = table.group_and_sum(&group).unwrap();
        let twice = once.group_and_sum(&group).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// Property: grouping preserves the column-wise total of summed columns.
    #[test]
    fn prop_group_and_sum_preserves_totals(table in arb_table(24)) {
        let group = vec!["key".to_string()];
        let grouped = table.group_and_sum(&group).unwrap();
        let total = |t: &ResultTable, col: usize| -> f64 {
            t.rows().iter().map(|r| r[col].as_num().unwrap()).sum()
        };
        prop_assert!((total(&table, 1) - total(&grouped, 1)).abs() < 1e-6);
        prop_assert!((total(&table, 2) - total(&grouped, 2)).abs() < 1e-6);
    }

    /// Property: cycles→seconds conversion is invertible by the clock rate.
    #[test]
    fn prop_clock_conversion_is_invertible(
        cycles in 1.0f64..1e15,
        clocks_per_us in 100.0f64..5000.0,
    ) {
        let plan = UnitPlan::new(ClockRate::per_us(clocks_per_us))
            .marker("Time", UnitRule::CyclesToSeconds);
        let mut table = ResultTable::new(vec!["TotalTime".to_string()]);
        table.push_row(vec![Value::Num(cycles)]).unwrap();

        let normalized = plan.normalize(&table).unwrap();
        let seconds = normalized.rows()[0][0].as_num().unwrap();
        let roundtrip = seconds * ClockRate::per_us(clocks_per_us).cycles_per_sec();
        prop_assert!((roundtrip - cycles).abs() <= cycles * 1e-12);
    }

    /// Property: select_by returns a subset with the schema intact.
    #[test]
    fn prop_select_by_is_a_subset(table in arb_table(24)) {
        for key in ["ka", "kb", "kc", "kd"] {
            let picked = table.select_by("key", key).unwrap();
            prop_assert_eq!(picked.columns(), table.columns());
            prop_assert!(picked.num_rows() <= table.num_rows());
            for row in picked.rows() {
                prop_assert_eq!(&row[0], &Value::Text(key.to_string()));
            }
        }
    }
}
