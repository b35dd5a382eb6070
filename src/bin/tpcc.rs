//! TPC-C garbage-collection sweep under snapshot isolation.
//!
//! Builds one binary per GC mode, runs the warehouse/thread grid under
//! `numactl --interleave=all`, then turns the per-run counters into
//! per-second rates and renders one line chart per countable column.
//!
//! Usage: `tpcc [BASE_DIR]`. BASE_DIR is the protocol source tree (defaults
//! to the current directory); everything lands under `BASE_DIR/build/`.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ccsweep::chart::{ChartRenderer, Marker, SeriesStyle, StyleTable};
use ccsweep::driver::{CmakeToolchain, ExecutionDriver, SweepLayout};
use ccsweep::grid::{ExperimentConfig, ParameterGrid};
use ccsweep::normalize::{ClockRate, NormalizedSeries, UnitPlan, UnitRule};
use ccsweep::store::ResultTable;
use ccsweep::track::{SweepManifest, SweepRecord};

const CLOCKS_PER_US: f64 = 2100.0;
const NUM_TRIALS: u32 = 1;
const NUM_SECONDS: u64 = 100;
const VARYING: &str = "num_warehouses";

// GC_MODE value → series label.
const GC_MODES: [(&str, &str); 2] = [("2", "epo-r"), ("1", "epo")];

fn gen_grid() -> ParameterGrid {
    ParameterGrid::new()
        .declare("gc_mode", GC_MODES.map(|(mode, _)| mode))
        .declare("num_warehouses", ["54"])
        .declare("num_threads", ["64"])
        .declare("exist_long", ["0"])
        .declare("sleep", ["0"])
        .declare("interval", ["0"])
        .declare("opt_interval", ["20"])
}

fn label_for(mode: &str) -> &'static str {
    GC_MODES
        .iter()
        .find(|(m, _)| *m == mode)
        .map_or("unknown", |(_, label)| label)
}

fn split(point: &ccsweep::grid::ParamPoint) -> ExperimentConfig {
    let gc_mode = point.get("gc_mode").expect("declared");
    ExperimentConfig::new(
        [("CC_ALG", "SI"), ("GC_MODE", gc_mode)],
        [
            NUM_SECONDS.to_string(),
            point.get("num_warehouses").expect("declared").to_string(),
            point.get("num_threads").expect("declared").to_string(),
            point.get("exist_long").expect("declared").to_string(),
            point.get("sleep").expect("declared").to_string(),
            point.get("interval").expect("declared").to_string(),
            point.get("opt_interval").expect("declared").to_string(),
        ],
        label_for(gc_mode),
    )
}

fn styles() -> StyleTable {
    StyleTable::new()
        .with("epo", SeriesStyle::new((255, 0, 0), Marker::Triangle, "epo"))
        .with(
            "epo-r",
            SeriesStyle::new((0, 0, 255), Marker::Cross, "epo-r"),
        )
}

fn build_and_run(layout: &SweepLayout, base: &str) -> Result<()> {
    let configs = gen_grid().expand(split);
    info!("{} configurations", configs.len());

    let toolchain = CmakeToolchain::new(base, layout, "Release", "TPCC", |config| {
        let gc_mode = config
            .compile_key()
            .iter()
            .find(|(k, _)| k == "GC_MODE")
            .map_or("0", |(_, v)| v.as_str());
        format!("tpcc_si_{gc_mode}")
    })
    .with_run_prefix(["numactl", "--interleave=all"]);

    let sweep = SweepRecord::new(
        format!("tpcc-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ")),
        "tpcc gc-mode sweep",
        VARYING,
    )
    .with_config(serde_json::json!({
        "trials": NUM_TRIALS,
        "seconds": NUM_SECONDS,
        "clocks_per_us": CLOCKS_PER_US,
        "gc_modes": GC_MODES.map(|(mode, _)| mode),
    }));
    let mut manifest = SweepManifest::new(sweep);

    let driver = ExecutionDriver::new(&toolchain, layout, NUM_TRIALS);
    driver.execute(&configs, &mut manifest)?;
    Ok(())
}

fn plot_all(layout: &SweepLayout) -> Result<()> {
    let res = layout.results_dir();
    let header = ResultTable::read_params(&res.join("header"))?;
    let mut tpcc_params = ResultTable::read_params(&res.join("tpcc_param"))?;
    tpcc_params.retain(|p| p != "exp_id");
    // Everything that is neither a declared parameter, the trial index, nor
    // the GC-mode selector is a countable metric.
    let countable: Vec<String> = header
        .iter()
        .filter(|c| {
            !tpcc_params.contains(c) && c.as_str() != "exp_id" && c.as_str() != "GC_MODE"
        })
        .cloned()
        .collect();

    let files = ResultTable::discover_csv(&res)?;
    let raw = ResultTable::ingest(&files, &header)?;
    raw.write_concat(&res)?;

    // Counters become rates per wall-clock second, averaged over trials.
    let mut plan = UnitPlan::new(ClockRate::per_us(CLOCKS_PER_US));
    for column in &countable {
        plan = plan.column(
            column.clone(),
            UnitRule::PerSecond(NUM_SECONDS * u64::from(NUM_TRIALS)),
        );
    }

    let renderer = ChartRenderer::new(
        VARYING,
        "#num_warehouse",
        styles(),
        plan.clone(),
        layout.plots_dir(),
    );

    let mut grouped = Vec::new();
    for (mode, label) in GC_MODES {
        let table = raw.select_by("GC_MODE", mode)?;
        if table.num_rows() == 0 {
            continue;
        }
        let table = plan
            .normalize(&table.group_and_sum(&tpcc_params)?)?
            .sort_by_numeric(VARYING, true)?;
        grouped.push((label, table));
    }

    for metric in &countable {
        let series: Vec<NormalizedSeries> = grouped
            .iter()
            .map(|(label, table)| NormalizedSeries::from_table(table, VARYING, metric, *label))
            .collect::<ccsweep::Result<_>>()?;
        renderer.line_chart(metric, &series)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let base = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    let layout = SweepLayout::new(&base);

    build_and_run(&layout, &base)?;
    plot_all(&layout)?;
    Ok(())
}
