//! Time traces of the field energies with the saturated region highlighted.

use super::{
    PALETTE, RenderOptions, Text, decade_ticks, grid_segments, linear_range, linear_ticks,
    log_range, prepare_text, write_atomically,
};
use crate::dataset::{Dataset, TIME};
use crate::saturation::{Saturation, SaturationParams, detect_in_dataset};
use crate::style::PlotStyle;
use anyhow::{Context, Result, bail};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILENAME: &str = "field_time_traces.png";

/// Candidate fields, in drawing order.
pub const TRACE_FIELDS: [&str; 3] = ["phi2", "apar2", "bpar2"];

const SATURATION_COLOR: RGBColor = RGBColor(0, 128, 0);

#[derive(Debug, Default, PartialEq, Clone)]
pub struct TracesOptions {
    pub render: RenderOptions,
    pub saturation: SaturationParams,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Trace {
    pub name: &'static str,
    pub values: Vec<f64>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TracesPlan {
    pub time: Vec<f64>,
    /// One trace per field present in the dataset.
    pub traces: Vec<Trace>,
    /// Saturation of `phi2`; drawn as a marker and shading when detected.
    pub saturation: Saturation,
}

pub fn plan_time_traces(ds: &Dataset, params: &SaturationParams) -> Result<TracesPlan> {
    let time = ds
        .get_coordinate(TIME)
        .context("failed to get time coordinate")?
        .to_vec();

    let mut traces = Vec::new();
    for name in TRACE_FIELDS.into_iter().filter(|name| ds.has_variable(name)) {
        let var = ds.get_variable(name)?;
        if var.dims() != [TIME] {
            bail!("{name} must depend on {TIME:?} only, but has dims {:?}", var.dims());
        }
        traces.push(Trace {
            name,
            values: var.data().iter().copied().collect(),
        });
    }

    let saturation = detect_in_dataset(ds, params).context("failed to detect saturation")?;

    Ok(TracesPlan {
        time,
        traces,
        saturation,
    })
}

/// Plot the time trace of each available field of (`phi2`, `apar2`, `bpar2`)
/// on a logarithmic scale and highlight the saturated region of `phi2`.
///
/// Returns the path of the written figure.
pub fn plot_fields_time_traces(ds: &Dataset, opts: &TracesOptions) -> Result<PathBuf> {
    let plan = plan_time_traces(ds, &opts.saturation).context("failed to plan time traces")?;
    log::debug!(
        "time traces: {} fields, saturation {}",
        plan.traces.len(),
        plan.saturation
    );

    let style = &opts.render.style;
    let text = prepare_text(style).context("failed to prepare text")?;
    let path = opts.render.output_path(DEFAULT_FILENAME)?;

    write_atomically(&path, |file| draw_time_traces(&plan, style, text, file))
        .with_context(|| format!("failed to draw {path:?}"))?;
    log::info!("wrote {path:?}");

    Ok(path)
}

fn draw_time_traces(plan: &TracesPlan, style: &PlotStyle, text: Text, file: &Path) -> Result<()> {
    let root = BitMapBackend::new(file, style.pixels(style.traces_size)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_range = match (plan.time.first(), plan.time.last()) {
        (Some(&first), Some(&last)) if last > first => first..last,
        _ => linear_range(&plan.time),
    };
    let y_range = log_range(plan.traces.iter().flat_map(|trace| &trace.values));

    let label_area = if text.enabled { 4.0 * text.size } else { 0.0 };
    let mut chart = ChartBuilder::on(&root)
        .margin(style.points_to_pixels(8.0))
        .x_label_area_size(label_area as u32)
        .y_label_area_size((1.5 * label_area) as u32)
        .build_cartesian_2d(x_range.clone(), y_range.clone().log_scale())?;

    let grid_color = BLACK.mix(style.grid_alpha);
    if text.enabled {
        chart
            .configure_mesh()
            .bold_line_style(grid_color)
            .light_line_style(TRANSPARENT)
            .x_desc("t")
            .y_desc("field²")
            .label_style(text.small_font())
            .axis_desc_style(text.font())
            .draw()?;
    } else {
        // The logarithmic mesh lays out tick labels even when none are shown.
        let segments = grid_segments(
            &linear_ticks(&x_range, 10),
            &decade_ticks(&y_range),
            &x_range,
            &y_range,
        );
        chart.draw_series(
            segments
                .into_iter()
                .map(|segment| PathElement::new(segment, grid_color)),
        )?;
    }

    let line_width = style.points_to_pixels(style.line_width);

    if let Saturation::Detected { time: t_sat, .. } = plan.saturation {
        chart.draw_series(std::iter::once(Rectangle::new(
            [(t_sat, y_range.start), (x_range.end, y_range.end)],
            SATURATION_COLOR.mix(style.shade_alpha).filled(),
        )))?;
    }

    for (i, trace) in plan.traces.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        // Non-positive values have no place on a logarithmic axis.
        let points = plan
            .time
            .iter()
            .zip(&trace.values)
            .filter(|&(_, &val)| val > 0.0 && val.is_finite())
            .map(|(&t, &val)| (t, val));

        let series = chart.draw_series(LineSeries::new(points, color.stroke_width(line_width)))?;
        if text.enabled {
            series.label(trace.name).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(line_width))
            });
        }
    }

    if let Saturation::Detected { time: t_sat, .. } = plan.saturation {
        let marker_style = SATURATION_COLOR.stroke_width(2 * line_width);
        let marker = chart.draw_series(std::iter::once(PathElement::new(
            vec![(t_sat, y_range.start), (t_sat, y_range.end)],
            marker_style,
        )))?;
        if text.enabled {
            marker
                .label(format!("Saturation (t = {t_sat:.2})"))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], marker_style));
        }
    }

    if text.enabled && (!plan.traces.is_empty() || plan.saturation.is_detected()) {
        chart
            .configure_series_labels()
            .label_font(text.small_font())
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}
