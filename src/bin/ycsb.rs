//! YCSB contention sweep: caracal vs serval.
//!
//! Builds one binary per (protocol, payload) compile key, runs every
//! (workload, records, threads, skew, reps) combination sequentially, then
//! aggregates the per-core CSV rows and renders the comparison charts.
//!
//! Usage: `ycsb [BASE_DIR]`. BASE_DIR is the protocol source tree (defaults
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
const NUM_SECONDS: u64 = 1;
const NUM_CORES: u32 = 64;
const VARYING: &str = "contention";

const PROTOCOLS: [&str; 2] = ["caracal", "serval"];

const PLOT_PARAMS: [&str; 7] = [
    "TotalTime",
    "InitializationTime",
    "ExecutionTime",
    "WaitInInitialization",
    "WaitInExecution",
    "PerfLeader",
    "PerfMember",
];

fn gen_grid() -> ParameterGrid {
    ParameterGrid::new()
        .declare("protocol", PROTOCOLS)
        .declare("payload", ["4"])
        .declare("workload", ["X"]) // write only
        .declare("records", ["1000000"])
        .declare("threads", ["64"])
        .declare(
            "contention",
            [
                "0.0", "0.1", "0.2", "0.3", "0.4", "0.5", "0.6", "0.7", "0.8", "0.9", "0.99",
            ],
        )
        .declare("reps", ["20"])
}

fn split(point: &ccsweep::grid::ParamPoint) -> ExperimentConfig {
    let protocol = point.get("protocol").expect("declared");
    let payload = point.get("payload").expect("declared");
    ExperimentConfig::new(
        [
            ("CC_ALG", protocol.to_uppercase()),
            ("PAYLOAD_SIZE", payload.to_string()),
        ],
        [
            NUM_SECONDS.to_string(),
            protocol.to_string(),
            point.get("workload").expect("declared").to_string(),
            point.get("records").expect("declared").to_string(),
            point.get("threads").expect("declared").to_string(),
            point.get("contention").expect("declared").to_string(),
            point.get("reps").expect("declared").to_string(),
        ],
        protocol,
    )
}

fn styles() -> StyleTable {
    StyleTable::new()
        .with(
            "caracal",
            SeriesStyle::new((255, 0, 0), Marker::Triangle, "caracal"),
        )
        .with(
            "serval",
            SeriesStyle::new((0, 0, 255), Marker::Cross, "serval"),
        )
        .with(
            "serval_BCBU",
            SeriesStyle::new((0, 128, 0), Marker::Circle, "serval_BCBU").dashed(),
        )
        .with("node0", SeriesStyle::new((255, 0, 0), Marker::Circle, "node0"))
        .with("node1", SeriesStyle::new((0, 0, 255), Marker::Circle, "node1"))
}

fn clock_plan() -> UnitPlan {
    UnitPlan::new(ClockRate::per_us(CLOCKS_PER_US))
        .marker("Time", UnitRule::CyclesToSeconds)
        .marker("Wait", UnitRule::CyclesToMillis)
}

/// Grouped tables additionally spread the perf counters over the cores that
/// produced them; per-core tables keep the raw counter per core.
fn unit_plan() -> UnitPlan {
    clock_plan()
        .column("PerfLeader", UnitRule::PerCore(NUM_CORES))
        .column("PerfMember", UnitRule::PerCore(NUM_CORES))
}

fn renderer(layout: &SweepLayout) -> ChartRenderer {
    ChartRenderer::new(VARYING, "Skew", styles(), unit_plan(), layout.plots_dir())
        .with_metric_label("TotalTime", "Total Latency")
        .with_metric_label("InitializationTime", "Initialization Latency")
        .with_metric_label("ExecutionTime", "Execution Latency")
        .with_metric_label("WaitInInitialization", "Latch Wait in Initialization")
        .with_metric_label("WaitInExecution", "Wait in Execution")
        .with_metric_label("PerfLeader", "Perf Leader")
        .with_metric_label("PerfMember", "Perf Member")
}

fn build_and_run(layout: &SweepLayout, base: &str) -> Result<()> {
    let grid = gen_grid();
    let configs = grid.expand(split);
    info!("{} configurations", configs.len());

    let toolchain = CmakeToolchain::new(base, layout, "Release", "YCSB", |config| {
        let payload = config
            .compile_key()
            .iter()
            .find(|(k, _)| k == "PAYLOAD_SIZE")
            .map_or("4", |(_, v)| v.as_str());
        format!("ycsb{payload}_{}", config.label())
    });

    let sweep = SweepRecord::new(
        format!("ycsb-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ")),
        "ycsb contention sweep",
        VARYING,
    )
    .with_config(serde_json::json!({
        "trials": NUM_TRIALS,
        "seconds": NUM_SECONDS,
        "clocks_per_us": CLOCKS_PER_US,
        "protocols": PROTOCOLS,
    }));
    let mut manifest = SweepManifest::new(sweep);

    let driver = ExecutionDriver::new(&toolchain, layout, NUM_TRIALS);
    driver.execute(&configs, &mut manifest)?;
    Ok(())
}

fn plot_all(layout: &SweepLayout) -> Result<()> {
    let res = layout.results_dir();
    let header = ResultTable::read_params(&res.join("header"))?;
    let runtime_params = ResultTable::read_params(&res.join("runtime_params"))?;

    let files = ResultTable::discover_csv(&res)?;
    let raw = ResultTable::ingest(&files, &header)?;
    raw.write_concat(&res)?;

    let plan = unit_plan();
    let renderer = renderer(layout);

    // Per-protocol tables: per-core rows for the decomposition charts,
    // grouped + normalized totals for everything else.
    let mut grouped = Vec::new();
    let mut per_core = Vec::new();
    for protocol in PROTOCOLS {
        let table = raw.select_by("protocol", protocol)?;
        grouped.push((protocol, plan.normalize(&table.group_and_sum(&runtime_params)?)?));
        per_core.push((protocol, clock_plan().normalize(&table)?));
    }

    for metric in PLOT_PARAMS {
        let series: Vec<NormalizedSeries> = grouped
            .iter()
            .map(|(protocol, table)| {
                NormalizedSeries::from_table(table, VARYING, metric, *protocol)
            })
            .collect::<ccsweep::Result<_>>()?;
        renderer.line_chart(metric, &series)?;
    }

    for (protocol, table) in &per_core {
        for metric in PLOT_PARAMS {
            renderer.per_core_chart(protocol, table, metric, "Core", "Node")?;
        }
    }

    // Cache miss rate: member misses over leader references.
    let miss_rate: Vec<NormalizedSeries> = grouped
        .iter()
        .map(|(protocol, table)| {
            NormalizedSeries::ratio(table, VARYING, "PerfMember", "PerfLeader", 100.0, *protocol)
        })
        .collect::<ccsweep::Result<_>>()?;
    renderer.derived_line_chart("CacheMissRate", "Cache Miss Rate [%]", &miss_rate)?;

    // Startup vs execution cost at the heaviest contention point.
    let at_x = "0.99";
    let mut pairs = Vec::new();
    for (protocol, table) in &grouped {
        let fixed = table.select_by(VARYING, at_x)?;
        if fixed.num_rows() == 0 {
            continue;
        }
        let init = NormalizedSeries::from_table(&fixed, VARYING, "InitializationTime", *protocol)?;
        let exec = NormalizedSeries::from_table(&fixed, VARYING, "ExecutionTime", *protocol)?;
        pairs.push((
            (*protocol).to_string(),
            init.points()[0].1,
            exec.points()[0].1,
        ));
    }
    if !pairs.is_empty() {
        renderer.paired_bars("InitializationTime", "ExecutionTime", at_x, &pairs)?;
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
