//! Chart rendering
//!
//! Every rendered series is attributed to a label (protocol name, optionally
//! feature-suffixed, or a NUMA-node name for per-core decompositions), and
//! every label must have a [`SeriesStyle`] entry in the [`StyleTable`]
//! (color, marker shape, line kind, display name), so the same label looks
//! the same on every chart of a sweep. A label without an entry fails with
//! [`Error::StyleMissing`] before any output file is created.
//!
//! X ticks are the sweep's varying parameter, rendered as text in series
//! order; callers wanting numeric order sort the table before extracting
//! series. Output files are SVG, one per (metric, chart shape), with
//! deterministic names derived from the metric and the varying parameter.

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use tracing::info;

use crate::normalize::{NormalizedSeries, UnitPlan};
use crate::store::ResultTable;
use crate::{Error, Result};

/// Marker shape drawn on line-chart points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Filled triangle.
    Triangle,
    /// Diagonal cross.
    Cross,
    /// Filled circle.
    Circle,
}

/// Line rendering kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Continuous stroke.
    Solid,
    /// Dashed stroke.
    Dashed,
}

/// Visual identity of one label.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStyle {
    /// Stroke/fill color as an RGB triple.
    pub rgb: (u8, u8, u8),
    /// Marker shape.
    pub marker: Marker,
    /// Line kind.
    pub line: LineKind,
    /// Name shown in legends and axis labels.
    pub display: String,
}

impl SeriesStyle {
    /// Create a solid-line style.
    #[must_use]
    pub fn new(rgb: (u8, u8, u8), marker: Marker, display: impl Into<String>) -> Self {
        Self {
            rgb,
            marker,
            line: LineKind::Solid,
            display: display.into(),
        }
    }

    /// Switch the line kind to dashed.
    #[must_use]
    pub fn dashed(mut self) -> Self {
        self.line = LineKind::Dashed;
        self
    }

    fn color(&self) -> RGBColor {
        RGBColor(self.rgb.0, self.rgb.1, self.rgb.2)
    }
}

/// Label → style mapping, shared by every chart of a sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleTable {
    entries: Vec<(String, SeriesStyle)>,
}

impl StyleTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the style for one label.
    #[must_use]
    pub fn with(mut self, label: impl Into<String>, style: SeriesStyle) -> Self {
        self.entries.push((label.into(), style));
        self
    }

    /// Look up the style for a label.
    ///
    /// # Errors
    ///
    /// `Error::StyleMissing` naming the label if it has no entry.
    pub fn style(&self, label: &str) -> Result<&SeriesStyle> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, s)| s)
            .ok_or_else(|| Error::StyleMissing(label.to_string()))
    }

    /// Check that every given label has an entry.
    ///
    /// # Errors
    ///
    /// `Error::StyleMissing` for the first label without an entry.
    pub fn validate<'a>(&self, labels: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for label in labels {
            self.style(label)?;
        }
        Ok(())
    }
}

const CHART_SIZE: (u32, u32) = (960, 720);
const MARKER_SIZE: i32 = 6;
const STROKE_WIDTH: u32 = 2;

/// Renders the charts of one sweep with consistent visual encodings.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    varying: String,
    x_label: String,
    metric_labels: Vec<(String, String)>,
    unit_plan: UnitPlan,
    styles: StyleTable,
    out_dir: PathBuf,
}

impl ChartRenderer {
    /// Create a renderer for one sweep.
    ///
    /// `varying` is the sweep's varying parameter (and the x column of the
    /// result tables); `x_label` its display name; `unit_plan` supplies the
    /// unit suffix for y-axis labels; charts land in `out_dir`.
    #[must_use]
    pub fn new(
        varying: impl Into<String>,
        x_label: impl Into<String>,
        styles: StyleTable,
        unit_plan: UnitPlan,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            varying: varying.into(),
            x_label: x_label.into(),
            metric_labels: Vec::new(),
            unit_plan,
            styles,
            out_dir: out_dir.into(),
        }
    }

    /// Declare the display name for a metric's y axis (falls back to the
    /// metric name itself).
    #[must_use]
    pub fn with_metric_label(
        mut self,
        metric: impl Into<String>,
        display: impl Into<String>,
    ) -> Self {
        self.metric_labels.push((metric.into(), display.into()));
        self
    }

    /// The varying parameter this renderer charts against.
    #[must_use]
    pub fn varying(&self) -> &str {
        &self.varying
    }

    /// Y-axis label for a metric: display name plus unit suffix.
    #[must_use]
    pub fn metric_axis_label(&self, metric: &str) -> String {
        let display = self
            .metric_labels
            .iter()
            .find(|(m, _)| m == metric)
            .map_or(metric, |(_, d)| d.as_str());
        format!("{display}{}", self.unit_plan.unit_suffix(metric))
    }

    /// One line per label across the sweep, for a single metric.
    ///
    /// # Errors
    ///
    /// `Error::StyleMissing` (before any file write) if a series label has no
    /// style; `Error::Chart` on backend failure.
    pub fn line_chart(&self, metric: &str, series: &[NormalizedSeries]) -> Result<PathBuf> {
        let path = self
            .out_dir
            .join(format!("{metric}_varying_{}.svg", self.varying));
        self.draw_lines(&path, &self.metric_axis_label(metric), series)?;
        Ok(path)
    }

    /// Line chart for a derived series (e.g. a cache-miss-rate ratio) with an
    /// explicit name and y-axis label.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ChartRenderer::line_chart`].
    pub fn derived_line_chart(
        &self,
        name: &str,
        ylabel: &str,
        series: &[NormalizedSeries],
    ) -> Result<PathBuf> {
        let path = self
            .out_dir
            .join(format!("{name}_varying_{}.svg", self.varying));
        self.draw_lines(&path, ylabel, series)?;
        Ok(path)
    }

    fn draw_lines(&self, path: &Path, ylabel: &str, series: &[NormalizedSeries]) -> Result<()> {
        // Style lookup happens before the backend touches the filesystem.
        for s in series {
            self.styles.style(s.label())?;
        }

        let ticks = tick_union(series);
        let n = ticks.len().max(1);
        let y_max = series
            .iter()
            .map(NormalizedSeries::y_max)
            .fold(0.0, f64::max);
        let y_top = if y_max > 0.0 { y_max * 1.05 } else { 1.0 };

        let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(to_chart_err)?;

        #[allow(clippy::cast_precision_loss)]
        let x_top = n as f64 - 0.5;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.5f64..x_top, 0f64..y_top)
            .map_err(to_chart_err)?;

        let formatter = tick_formatter(&ticks);
        chart
            .configure_mesh()
            .x_labels(n)
            .x_label_formatter(&formatter)
            .x_desc(self.x_label.as_str())
            .y_desc(ylabel)
            .draw()
            .map_err(to_chart_err)?;

        for s in series {
            let style = self.styles.style(s.label())?;
            let color = style.color();
            let stroke = color.stroke_width(STROKE_WIDTH);
            let points = indexed_points(s, &ticks);

            let anno = match style.line {
                LineKind::Solid => chart
                    .draw_series(LineSeries::new(points.clone(), stroke))
                    .map_err(to_chart_err)?,
                LineKind::Dashed => chart
                    .draw_series(DashedLineSeries::new(points.clone(), 8, 4, stroke))
                    .map_err(to_chart_err)?,
            };
            anno.label(style.display.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

            match style.marker {
                Marker::Triangle => chart
                    .draw_series(
                        points
                            .iter()
                            .map(|&p| TriangleMarker::new(p, MARKER_SIZE, color.filled())),
                    )
                    .map_err(to_chart_err)?,
                Marker::Cross => chart
                    .draw_series(points.iter().map(|&p| {
                        Cross::new(p, MARKER_SIZE, color.stroke_width(STROKE_WIDTH))
                    }))
                    .map_err(to_chart_err)?,
                Marker::Circle => chart
                    .draw_series(
                        points
                            .iter()
                            .map(|&p| Circle::new(p, MARKER_SIZE, color.filled())),
                    )
                    .map_err(to_chart_err)?,
            };
        }

        chart
            .configure_series_labels()
            .border_style(BLACK)
            .background_style(WHITE.mix(0.8))
            .draw()
            .map_err(to_chart_err)?;
        root.present().map_err(to_chart_err)?;
        info!("wrote {}", path.display());
        Ok(())
    }

    /// Paired bar chart contrasting two metrics at one fixed x value, one
    /// bar pair per label. The first metric renders as the label's solid
    /// fill, the second as a translucent fill with a solid border.
    ///
    /// # Errors
    ///
    /// `Error::StyleMissing` (before any file write) if a label has no style;
    /// `Error::Chart` on backend failure.
    pub fn paired_bars(
        &self,
        metric_a: &str,
        metric_b: &str,
        at_x: &str,
        values: &[(String, f64, f64)],
    ) -> Result<PathBuf> {
        self.styles
            .validate(values.iter().map(|(label, _, _)| label.as_str()))?;

        let path = self.out_dir.join(format!(
            "{metric_a}_vs_{metric_b}_at_{at_x}_varying_{}.svg",
            self.varying
        ));

        let y_max = values
            .iter()
            .map(|(_, a, b)| a.max(*b))
            .fold(0.0, f64::max);
        let y_top = if y_max > 0.0 { y_max * 1.05 } else { 1.0 };
        let groups = values.len().max(1);

        let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(to_chart_err)?;

        // Each label occupies 3 units: two bars plus a gap.
        #[allow(clippy::cast_precision_loss)]
        let x_top = groups as f64 * 3.0 - 0.5;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.5f64..x_top, 0f64..y_top)
            .map_err(to_chart_err)?;

        let group_names: Vec<String> = values
            .iter()
            .map(|(label, _, _)| {
                self.styles
                    .style(label)
                    .map(|s| s.display.clone())
                    .unwrap_or_else(|_| label.clone())
            })
            .collect();
        let formatter = move |x: &f64| {
            let group = (x / 3.0).floor();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let idx = if group < 0.0 { 0 } else { group as usize };
            // Label the group under its first bar only.
            if (x - (group * 3.0 + 0.5)).abs() < 0.5 {
                group_names.get(idx).cloned().unwrap_or_default()
            } else {
                String::new()
            }
        };
        chart
            .configure_mesh()
            .x_labels(groups * 3)
            .x_label_formatter(&formatter)
            .x_desc(format!("{} = {at_x}", self.x_label))
            .y_desc(format!(
                "{} / {}",
                self.metric_axis_label(metric_a),
                self.metric_axis_label(metric_b)
            ))
            .draw()
            .map_err(to_chart_err)?;

        for (i, (label, a, b)) in values.iter().enumerate() {
            let color = self.styles.style(label)?.color();
            #[allow(clippy::cast_precision_loss)]
            let x0 = i as f64 * 3.0;
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(x0, 0.0), (x0 + 0.9, *a)],
                    color.filled(),
                )))
                .map_err(to_chart_err)?;
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(x0 + 1.0, 0.0), (x0 + 1.9, *b)],
                    color.mix(0.4).filled(),
                )))
                .map_err(to_chart_err)?;
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(x0 + 1.0, 0.0), (x0 + 1.9, *b)],
                    color.stroke_width(1),
                )))
                .map_err(to_chart_err)?;
        }

        root.present().map_err(to_chart_err)?;
        drop(chart);
        drop(root);
        info!("wrote {}", path.display());
        Ok(path)
    }

    /// Per-core decomposition within one label: one line per core, colored by
    /// the core's node, one legend entry per node.
    ///
    /// `table` holds the label's per-core rows (varying parameter, core and
    /// node columns, metrics). Node style labels are `node{N}`.
    ///
    /// # Errors
    ///
    /// `Error::StyleMissing` (before any file write) if a node label has no
    /// style; `Error::Ingest`/`Error::Aggregation` on schema or type
    /// mismatches; `Error::Chart` on backend failure.
    pub fn per_core_chart(
        &self,
        label: &str,
        table: &ResultTable,
        metric: &str,
        core_column: &str,
        node_column: &str,
    ) -> Result<PathBuf> {
        let node_idx = table.column_index(node_column)?;

        // Resolve every core's series and node style before the backend
        // touches the filesystem.
        let mut lines: Vec<(String, NormalizedSeries)> = Vec::new();
        for core in table.distinct(core_column)? {
            let sub = table.select_by(core_column, &core.to_string())?;
            let node_label = format!("node{}", sub.rows()[0][node_idx]);
            self.styles.style(&node_label)?;
            let series =
                NormalizedSeries::from_table(&sub, &self.varying, metric, node_label.clone())?;
            lines.push((node_label, series));
        }

        let path = self.out_dir.join(format!(
            "{label}_per_core_{metric}_varying_{}.svg",
            self.varying
        ));

        let all: Vec<NormalizedSeries> = lines.iter().map(|(_, s)| s.clone()).collect();
        let ticks = tick_union(&all);
        let n = ticks.len().max(1);
        let y_max = all.iter().map(NormalizedSeries::y_max).fold(0.0, f64::max);
        let y_top = if y_max > 0.0 { y_max * 1.05 } else { 1.0 };

        let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(to_chart_err)?;

        #[allow(clippy::cast_precision_loss)]
        let x_top = n as f64 - 0.5;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.5f64..x_top, 0f64..y_top)
            .map_err(to_chart_err)?;

        let formatter = tick_formatter(&ticks);
        chart
            .configure_mesh()
            .x_labels(n)
            .x_label_formatter(&formatter)
            .x_desc(self.x_label.as_str())
            .y_desc(format!("{} {label}", self.metric_axis_label(metric)))
            .draw()
            .map_err(to_chart_err)?;

        let mut seen_nodes: Vec<String> = Vec::new();
        for (node_label, series) in &lines {
            let style = self.styles.style(node_label)?;
            let color = style.color();
            let points = indexed_points(series, &ticks);
            let anno = chart
                .draw_series(LineSeries::new(points, color.stroke_width(STROKE_WIDTH)))
                .map_err(to_chart_err)?;
            // One legend entry per node, not per core.
            if !seen_nodes.contains(node_label) {
                seen_nodes.push(node_label.clone());
                anno.label(style.display.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
        }

        chart
            .configure_series_labels()
            .border_style(BLACK)
            .background_style(WHITE.mix(0.8))
            .draw()
            .map_err(to_chart_err)?;
        root.present().map_err(to_chart_err)?;
        drop(chart);
        drop(root);
        info!("wrote {}", path.display());
        Ok(path)
    }
}

fn to_chart_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Chart(e.to_string())
}

/// Distinct x ticks across all series, in first-appearance order.
fn tick_union(series: &[NormalizedSeries]) -> Vec<String> {
    let mut ticks: Vec<String> = Vec::new();
    for s in series {
        for (x, _) in s.points() {
            if !ticks.iter().any(|t| t == x) {
                ticks.push(x.clone());
            }
        }
    }
    ticks
}

fn indexed_points(series: &NormalizedSeries, ticks: &[String]) -> Vec<(f64, f64)> {
    series
        .points()
        .iter()
        .filter_map(|(x, v)| {
            ticks.iter().position(|t| t == x).map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let xi = i as f64;
                (xi, *v)
            })
        })
        .collect()
}

fn tick_formatter(ticks: &[String]) -> impl Fn(&f64) -> String + '_ {
    move |x: &f64| {
        if (x - x.round()).abs() > 1e-9 {
            return String::new();
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = if x.round() < 0.0 {
            return String::new();
        } else {
            x.round() as usize
        };
        ticks.get(idx).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ClockRate;
    use crate::store::Value;

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
                "node0",
                SeriesStyle::new((255, 0, 0), Marker::Circle, "node0"),
            )
            .with(
                "node1",
                SeriesStyle::new((0, 0, 255), Marker::Circle, "node1"),
            )
    }

    fn renderer(out_dir: &Path) -> ChartRenderer {
        let plan = UnitPlan::new(ClockRate::per_us(2100.0))
            .marker("Time", crate::normalize::UnitRule::CyclesToSeconds);
        ChartRenderer::new("contention", "Skew", styles(), plan, out_dir)
            .with_metric_label("TotalTime", "Total Latency")
    }

    fn series(label: &str) -> NormalizedSeries {
        let mut t = ResultTable::new(vec!["contention".to_string(), "TotalTime".to_string()]);
        for (x, v) in [(0.1, 1.0), (0.5, 2.5), (0.99, 4.0)] {
            t.push_row(vec![Value::Num(x), Value::Num(v)]).unwrap();
        }
        NormalizedSeries::from_table(&t, "contention", "TotalTime", label).unwrap()
    }

    #[test]
    fn axis_label_combines_display_and_unit() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path());
        assert_eq!(r.metric_axis_label("TotalTime"), "Total Latency [s]");
        assert_eq!(r.metric_axis_label("Commits"), "Commits");
    }

    #[test]
    fn line_chart_writes_deterministic_filename() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path());
        let path = r
            .line_chart("TotalTime", &[series("caracal"), series("serval")])
            .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "TotalTime_varying_contention.svg"
        );
        assert!(path.is_file());
    }

    #[test]
    fn style_missing_fails_before_file_write() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path());
        let err = r
            .line_chart("TotalTime", &[series("caracal"), series("serval_BCBU")])
            .unwrap_err();
        assert!(matches!(err, Error::StyleMissing(ref l) if l == "serval_BCBU"));
        assert!(!dir.path().join("TotalTime_varying_contention.svg").exists());
    }

    #[test]
    fn paired_bars_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path());
        let path = r
            .paired_bars(
                "InitializationTime",
                "ExecutionTime",
                "0.99",
                &[
                    ("caracal".to_string(), 1.5, 3.0),
                    ("serval".to_string(), 0.5, 2.0),
                ],
            )
            .unwrap();
        assert!(path.is_file());
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("InitializationTime_vs_ExecutionTime_at_0.99"));
    }

    #[test]
    fn per_core_chart_colors_by_node() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path());
        let mut t = ResultTable::new(
            ["contention", "Core", "Node", "TotalTime"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        );
        for (skew, core, node, v) in [
            (0.1, 0, 0, 1.0),
            (0.5, 0, 0, 2.0),
            (0.1, 1, 1, 1.5),
            (0.5, 1, 1, 2.5),
        ] {
            t.push_row(vec![
                Value::Num(skew),
                Value::Num(f64::from(core)),
                Value::Num(f64::from(node)),
                Value::Num(v),
            ])
            .unwrap();
        }
        let path = r
            .per_core_chart("caracal", &t, "TotalTime", "Core", "Node")
            .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "caracal_per_core_TotalTime_varying_contention.svg"
        );
        assert!(path.is_file());
    }

    #[test]
    fn per_core_chart_requires_node_styles() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path());
        let mut t = ResultTable::new(
            ["contention", "Core", "Node", "TotalTime"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        );
        t.push_row(vec![
            Value::Num(0.1),
            Value::Num(0.0),
            Value::Num(7.0),
            Value::Num(1.0),
        ])
        .unwrap();
        let err = r
            .per_core_chart("caracal", &t, "TotalTime", "Core", "Node")
            .unwrap_err();
        assert!(matches!(err, Error::StyleMissing(ref l) if l == "node7"));
    }
}
