//! Kaplan-Meier figures for pooled cross-validation results.
//!
//! Every call renders into its own drawing area, either an SVG file or any
//! caller-supplied plotters area, so successive plots never share state.

use std::path::Path;

use log::{info, warn};
use ndarray::Array1;
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::{
    error::{Result, SurvivalError},
    hazard::{HazardSummary, get_hazard_with_alpha},
    kaplan_meier::{AtRiskCounts, KaplanMeier},
    results::{RISK_GROUP_COLUMN, ResultsTable, RiskGroup},
};

pub const FIGURE_SIZE: (u32, u32) = (900, 720);

const BINARY_TITLE: &str = "Model Kaplan Meier curve";
const TERTILE_TITLE: &str = "Model Kaplan Meier curve (Three Risk Groups)";

const LOW_COLOR: RGBColor = RGBColor(31, 119, 180);
const MEDIUM_COLOR: RGBColor = RGBColor(44, 160, 44);
const HIGH_COLOR: RGBColor = RGBColor(214, 39, 40);
const BINARY_HIGH_COLOR: RGBColor = RGBColor(255, 127, 14);

const TICK_HINT: usize = 6;
const ROW_HEIGHT: u32 = 16;

/// One curve as drawn
#[derive(Debug, Clone, PartialEq)]
pub struct CurveSummary {
    pub label: String,
    pub n_subjects: usize,
    pub n_events: usize,
    pub median_survival: Option<f64>,
    pub at_risk: Vec<AtRiskCounts>, // one entry per tick
}

/// What a plot call put on the figure
#[derive(Debug, Clone, PartialEq)]
pub struct KmFigure {
    pub curves: Vec<CurveSummary>,
    pub hazard: Option<HazardSummary>,
    pub ticks: Vec<f64>,
}

struct Group {
    color: RGBColor,
    km: KaplanMeier,
}

fn plot_err<E: std::error::Error + Send + Sync>(e: DrawingAreaErrorKind<E>) -> SurvivalError {
    SurvivalError::plot(e.to_string())
}

/// Low-risk vs high-risk curves with the hazard-ratio box, written as SVG.
/// The box shows the `1 - alpha` interval.
pub fn plot_km(results: &ResultsTable, alpha: f64, path: impl AsRef<Path>) -> Result<KmFigure> {
    let path = path.as_ref();
    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    let figure = draw_km(&root, results, alpha)?;
    root.present().map_err(plot_err)?;
    info!("wrote {} to {}", BINARY_TITLE, path.display());
    Ok(figure)
}

/// Low / medium / high curves read from `risk_column`, written as SVG
pub fn plot_km_tri(results: &ResultsTable, risk_column: &str, path: impl AsRef<Path>) -> Result<KmFigure> {
    let path = path.as_ref();
    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    let figure = draw_km_tri(&root, results, risk_column)?;
    root.present().map_err(plot_err)?;
    info!("wrote {} to {}", TERTILE_TITLE, path.display());
    Ok(figure)
}

/// [`plot_km_tri`] on the built-in `risk_group` column
pub fn plot_km_risk_groups(results: &ResultsTable, path: impl AsRef<Path>) -> Result<KmFigure> {
    plot_km_tri(results, RISK_GROUP_COLUMN, path)
}

pub fn draw_km<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    results: &ResultsTable,
    alpha: f64,
) -> Result<KmFigure> {
    let (low, high): (Vec<usize>, Vec<usize>) = (0..results.len()).partition(|&i| results.rows()[i].low_risk);

    let groups = fit_groups(
        results,
        vec![("low risk", LOW_COLOR, low), ("high risk", BINARY_HIGH_COLOR, high)],
    )?;

    let hazard = if groups.len() == 2 {
        Some(get_hazard_with_alpha(results, alpha)?)
    } else {
        warn!("only one risk group present, no hazard ratio to annotate");
        None
    };

    let ticks = draw_curves(area, BINARY_TITLE, &groups, hazard.as_ref())?;
    Ok(describe(&groups, hazard, ticks))
}

pub fn draw_km_tri<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    results: &ResultsTable,
    risk_column: &str,
) -> Result<KmFigure> {
    let partition = |group: RiskGroup| results.indices_where(risk_column, group.as_str());
    let groups = fit_groups(
        results,
        vec![
            ("low risk", LOW_COLOR, partition(RiskGroup::Low)?),
            ("medium risk", MEDIUM_COLOR, partition(RiskGroup::Medium)?),
            ("high risk", HIGH_COLOR, partition(RiskGroup::High)?),
        ],
    )?;

    let ticks = draw_curves(area, TERTILE_TITLE, &groups, None)?;
    Ok(describe(&groups, None, ticks))
}

/// one Kaplan-Meier fit per non-empty subset
fn fit_groups(results: &ResultsTable, subsets: Vec<(&str, RGBColor, Vec<usize>)>) -> Result<Vec<Group>> {
    let times = results.times();
    let events = results.events();

    let mut groups = Vec::new();
    for (label, color, indices) in subsets {
        if indices.is_empty() {
            warn!("no subjects in group '{}', skipping its curve", label);
            continue;
        }
        let group_times: Array1<f64> = indices.iter().map(|&i| times[i]).collect();
        let group_events: Vec<bool> = indices.iter().map(|&i| events[i]).collect();
        groups.push(Group {
            color,
            km: KaplanMeier::fit(group_times.view(), &group_events, label)?,
        });
    }

    if groups.is_empty() {
        return Err(SurvivalError::invalid_survival_data("no subjects to plot"));
    }
    Ok(groups)
}

fn describe(groups: &[Group], hazard: Option<HazardSummary>, ticks: Vec<f64>) -> KmFigure {
    let curves = groups
        .iter()
        .map(|g| CurveSummary {
            label: g.km.label().to_string(),
            n_subjects: g.km.n_subjects(),
            n_events: g.km.event_table().iter().map(|row| row.observed).sum(),
            median_survival: g.km.median_survival_time(),
            at_risk: ticks.iter().map(|&t| g.km.at_risk_counts(t)).collect(),
        })
        .collect();

    KmFigure { curves, hazard, ticks }
}

/// (t, s) pairs tracing a right-continuous step function
fn step_points(timeline: &[f64], values: &[f64]) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(timeline.len() * 2);
    for (i, (&t, &v)) in timeline.iter().zip(values).enumerate() {
        if i > 0 {
            points.push((t, values[i - 1]));
        }
        points.push((t, v));
    }
    points
}

/// Draws curves, bands, legend, optional hazard box and the at-risk table.
/// Returns the x tick positions used for the table.
fn draw_curves<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    title: &str,
    groups: &[Group],
    hazard: Option<&HazardSummary>,
) -> Result<Vec<f64>> {
    area.fill(&WHITE).map_err(plot_err)?;

    let (_, height) = area.dim_in_pixel();
    let table_height = 24 + ROW_HEIGHT * 4 * groups.len() as u32;
    let (upper, lower) = area.split_vertically(height.saturating_sub(table_height));

    let last_time = groups.iter().map(|g| g.km.last_time()).fold(0.0, f64::max);
    let x_max = if last_time > 0.0 { last_time * 1.05 } else { 1.0 };

    let mut chart = ChartBuilder::on(&upper)
        .caption(title, ("sans-serif", 20))
        .margin(15)
        .x_label_area_size(35)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..x_max, 0f64..1f64)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_labels(TICK_HINT)
        .y_labels(6)
        .x_desc("timeline")
        .y_desc("probability")
        .draw()
        .map_err(plot_err)?;

    for group in groups {
        let color = group.color;
        let timeline = group.km.timeline();
        let (band_lower, band_upper) = group.km.confidence_interval();

        let mut band = step_points(timeline, band_upper);
        band.extend(step_points(timeline, band_lower).into_iter().rev());
        chart
            .draw_series(std::iter::once(Polygon::new(band, color.mix(0.15))))
            .map_err(plot_err)?;

        chart
            .draw_series(LineSeries::new(
                step_points(timeline, group.km.survival_function()),
                color.stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(group.km.label())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    if let Some(hazard) = hazard {
        let style = TextStyle::from(("sans-serif", 14));
        chart
            .draw_series(std::iter::once(
                EmptyElement::at((x_max * 0.5, 0.5))
                    + Rectangle::new([(0, 0), (160, 62)], BLACK.mix(0.1).filled())
                    + Text::new(format!("HR = {:.3}", hazard.hazard_ratio), (8, 6), style.clone())
                    + Text::new(
                        format!("CI [{:.3}, {:.3}]", hazard.ci_lower, hazard.ci_upper),
                        (8, 24),
                        style.clone(),
                    )
                    + Text::new(format!("p = {:.3}", hazard.p_value), (8, 42), style),
            ))
            .map_err(plot_err)?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    let ticks = chart.as_coord_spec().x_spec().key_points(TICK_HINT);
    let base = lower.get_base_pixel();
    let tick_x: Vec<i32> = ticks.iter().map(|&t| chart.backend_coord(&(t, 0.0)).0 - base.0).collect();
    draw_at_risk_table(&lower, groups, &ticks, &tick_x)?;

    Ok(ticks)
}

fn draw_at_risk_table<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    groups: &[Group],
    ticks: &[f64],
    tick_x: &[i32],
) -> Result<()> {
    let rows: [(&str, fn(&AtRiskCounts) -> usize); 3] = [
        ("At risk", |c| c.at_risk),
        ("Censored", |c| c.censored),
        ("Events", |c| c.events),
    ];
    let text = TextStyle::from(("sans-serif", 12));
    let centered = text.pos(Pos::new(HPos::Center, VPos::Top));

    let mut y = 8;
    for group in groups {
        area.draw_text(group.km.label(), &text.color(&group.color), (8, y))
            .map_err(plot_err)?;
        y += ROW_HEIGHT as i32;

        let counts: Vec<AtRiskCounts> = ticks.iter().map(|&t| group.km.at_risk_counts(t)).collect();
        for (name, value) in rows {
            area.draw_text(name, &text, (16, y)).map_err(plot_err)?;
            for (&x, c) in tick_x.iter().zip(&counts) {
                area.draw_text(&value(c).to_string(), &centered, (x, y))
                    .map_err(plot_err)?;
            }
            y += ROW_HEIGHT as i32;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ScoredSubject;

    fn results_with(groups: &[RiskGroup]) -> ResultsTable {
        let rows = (0..24)
            .map(|i| {
                let group = groups[i % groups.len()];
                let shift = match group {
                    RiskGroup::Low => 6.0,
                    RiskGroup::Medium => 3.5,
                    RiskGroup::High => 1.0,
                };
                ScoredSubject {
                    id: i.to_string(),
                    fold: i % 3,
                    time: shift + (i % 5) as f64 * 1.3,
                    event: i % 4 != 0,
                    covariates: vec![],
                    predicted_hazard: 1.0,
                    low_risk: group == RiskGroup::Low,
                    risk_group: group,
                }
            })
            .collect();
        ResultsTable::from_rows(vec![], rows).unwrap()
    }

    fn render<F>(draw: F) -> (String, KmFigure)
    where
        F: FnOnce(&DrawingArea<SVGBackend, Shift>) -> Result<KmFigure>,
    {
        let mut svg = String::new();
        let figure = {
            let root = SVGBackend::with_string(&mut svg, FIGURE_SIZE).into_drawing_area();
            let figure = draw(&root).unwrap();
            root.present().unwrap();
            figure
        };
        (svg, figure)
    }

    #[test]
    fn test_binary_plot_has_two_curves_and_hazard_box() {
        let results = results_with(&[RiskGroup::Low, RiskGroup::High]);
        let (svg, figure) = render(|area| draw_km(area, &results, 0.05));

        assert_eq!(figure.curves.len(), 2);
        assert_eq!(figure.curves[0].label, "low risk");
        assert_eq!(figure.curves[0].n_subjects + figure.curves[1].n_subjects, 24);
        let hazard = figure.hazard.unwrap();
        assert!(hazard.ci_lower <= hazard.hazard_ratio && hazard.hazard_ratio <= hazard.ci_upper);

        assert!(svg.contains(BINARY_TITLE));
        assert!(svg.contains("HR = "));
        assert!(svg.contains("probability"));
        assert!(svg.contains("At risk"));
    }

    #[test]
    fn test_tri_plot_curve_count_follows_groups() {
        let results = results_with(&RiskGroup::ALL);
        let (svg, figure) = render(|area| draw_km_tri(area, &results, RISK_GROUP_COLUMN));
        assert_eq!(figure.curves.len(), 3);
        assert_eq!(figure.curves.iter().map(|c| c.n_subjects).sum::<usize>(), 24);
        assert!(figure.hazard.is_none());
        assert!(svg.contains("Three Risk Groups"));
        assert!(!svg.contains("HR = "));

        let results = results_with(&[RiskGroup::Low, RiskGroup::High]);
        let (_, figure) = render(|area| draw_km_tri(area, &results, RISK_GROUP_COLUMN));
        let labels: Vec<&str> = figure.curves.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["low risk", "high risk"]);
    }

    #[test]
    fn test_tri_plot_reads_custom_column() {
        let mut results = results_with(&[RiskGroup::Low]);
        let labels = (0..24).map(|i| ["low", "medium", "high", "other"][i % 4].to_string()).collect();
        results.add_label_column("grade", labels).unwrap();

        let (_, figure) = render(|area| draw_km_tri(area, &results, "grade"));
        assert_eq!(figure.curves.len(), 3);
        assert!(figure.curves.iter().all(|c| c.n_subjects == 6));

        let mut svg = String::new();
        let root = SVGBackend::with_string(&mut svg, FIGURE_SIZE).into_drawing_area();
        assert!(draw_km_tri(&root, &results, "missing").is_err());
    }

    #[test]
    fn test_at_risk_counts_per_tick() {
        let results = results_with(&[RiskGroup::Low, RiskGroup::High]);
        let (_, figure) = render(|area| draw_km(area, &results, 0.05));
        assert!(!figure.ticks.is_empty());
        for curve in &figure.curves {
            assert_eq!(curve.at_risk.len(), figure.ticks.len());
            for counts in &curve.at_risk {
                assert_eq!(counts.at_risk + counts.censored + counts.events, curve.n_subjects);
            }
        }
    }

    #[test]
    fn test_hazard_box_uses_requested_alpha() {
        let results = results_with(&[RiskGroup::Low, RiskGroup::High]);
        let (svg, figure) = render(|area| draw_km(area, &results, 0.2));

        let expected = get_hazard_with_alpha(&results, 0.2).unwrap();
        let default = get_hazard_with_alpha(&results, 0.05).unwrap();
        let hazard = figure.hazard.unwrap();
        assert_eq!(hazard, expected);
        assert!(hazard.ci_upper - hazard.ci_lower < default.ci_upper - default.ci_lower);
        assert!(svg.contains(&format!("CI [{:.3}, {:.3}]", expected.ci_lower, expected.ci_upper)));
    }

    #[test]
    fn test_single_group_skips_hazard() {
        let results = results_with(&[RiskGroup::High]);
        let (svg, figure) = render(|area| draw_km(area, &results, 0.05));
        assert_eq!(figure.curves.len(), 1);
        assert!(figure.hazard.is_none());
        assert!(!svg.contains("HR = "));
    }

    #[test]
    fn test_writes_svg_files() {
        let dir = tempfile::tempdir().unwrap();
        let results = results_with(&RiskGroup::ALL);

        let binary = dir.path().join("km.svg");
        plot_km(&results, 0.05, &binary).unwrap();
        let tri = dir.path().join("km_tri.svg");
        plot_km_risk_groups(&results, &tri).unwrap();

        assert!(std::fs::read_to_string(binary).unwrap().contains("<svg"));
        assert!(std::fs::metadata(tri).unwrap().len() > 0);
    }

    #[test]
    fn test_step_points() {
        let points = step_points(&[0.0, 1.0, 2.0], &[1.0, 0.5, 0.25]);
        assert_eq!(points, vec![(0.0, 1.0), (1.0, 1.0), (1.0, 0.5), (2.0, 0.5), (2.0, 0.25)]);
    }
}
