//! (kx, ky) spectra of the fields at the last time step.

use super::{RenderOptions, Text, prepare_text, write_atomically};
use crate::dataset::{Dataset, Selection, TIME};
use crate::style::PlotStyle;
use anyhow::{Context, Result, bail};
use ndarray::{Array2, Ix2};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::colors::colormaps::{ColorMap, ViridisRGB};
use std::path::{Path, PathBuf};

pub const DEFAULT_FILENAME: &str = "fields_by_mode.png";

/// Candidate fields and their panel titles, one panel each.
pub const MODE_FIELDS: [(&str, &str); 3] = [
    ("phi2_by_mode", "|φ|²"),
    ("apar2_by_mode", "|A∥|²"),
    ("bpar2_by_mode", "|B∥|²"),
];

/// Steps of the colour bar gradient.
const N_BAR_STEPS: usize = 64;

#[derive(Debug, PartialEq, Clone)]
pub struct ModePanel {
    pub name: &'static str,
    pub title: &'static str,
    /// Monotonic `kx` (FFT-shifted).
    pub kx: Vec<f64>,
    pub ky: Vec<f64>,
    /// Values at the last time step, indexed `[ky, kx]` with `kx` shifted
    /// like [`ModePanel::kx`].
    pub values: Array2<f64>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ModesPlan {
    /// One entry per candidate field; `None` panels are hidden.
    pub panels: Vec<Option<ModePanel>>,
}

impl ModesPlan {
    pub fn n_active(&self) -> usize {
        self.panels.iter().flatten().count()
    }

    pub fn n_hidden(&self) -> usize {
        self.panels.len() - self.n_active()
    }
}

/// Move the zero frequency of an FFT-ordered sequence to the centre.
pub fn fftshift(vals: &[f64]) -> Vec<f64> {
    let n = vals.len();
    (0..n).map(|i| vals[(i + n - n / 2) % n]).collect()
}

pub fn plan_fields_by_mode(ds: &Dataset) -> Result<ModesPlan> {
    let mut panels = Vec::with_capacity(MODE_FIELDS.len());
    for (name, title) in MODE_FIELDS {
        if !ds.has_variable(name) {
            panels.push(None);
            continue;
        }
        let panel = plan_panel(ds, name, title).with_context(|| format!("failed to plan {name}"))?;
        panels.push(Some(panel));
    }
    Ok(ModesPlan { panels })
}

fn plan_panel(ds: &Dataset, name: &'static str, title: &'static str) -> Result<ModePanel> {
    let kx = fftshift(&ds.get_coordinate("kx")?.to_vec());
    let ky = ds.get_coordinate("ky")?.to_vec();

    let dims: Vec<&str> = ds
        .get_variable(name)?
        .dims()
        .iter()
        .map(String::as_str)
        .filter(|&dim| dim != TIME)
        .collect();
    let last = ds
        .select(name, TIME, Selection::Index(-1))?
        .into_dimensionality::<Ix2>()
        .context("expected two dims besides time")?;
    let last = match dims.as_slice() {
        ["ky", "kx"] => last,
        ["kx", "ky"] => last.reversed_axes(),
        _ => bail!("expected dims (ky, kx) besides time, but got {dims:?}"),
    };

    let n_kx = last.ncols();
    let values = Array2::from_shape_fn(last.dim(), |(i_ky, i_kx)| {
        last[[i_ky, (i_kx + n_kx - n_kx / 2) % n_kx]]
    });

    Ok(ModePanel {
        name,
        title,
        kx,
        ky,
        values,
    })
}

/// Plot the (kx, ky) spectrum of each available field of (`phi2_by_mode`,
/// `apar2_by_mode`, `bpar2_by_mode`) at the last time step, one panel per
/// field. Panels of absent fields are left blank.
///
/// Returns the path of the written figure.
pub fn plot_fields_by_mode(ds: &Dataset, opts: &RenderOptions) -> Result<PathBuf> {
    let plan = plan_fields_by_mode(ds).context("failed to plan mode spectra")?;
    log::debug!(
        "mode spectra: {} active panels, {} hidden",
        plan.n_active(),
        plan.n_hidden()
    );

    let text = prepare_text(&opts.style).context("failed to prepare text")?;
    let path = opts.output_path(DEFAULT_FILENAME)?;

    write_atomically(&path, |file| draw_fields_by_mode(&plan, &opts.style, text, file))
        .with_context(|| format!("failed to draw {path:?}"))?;
    log::info!("wrote {path:?}");

    Ok(path)
}

fn draw_fields_by_mode(plan: &ModesPlan, style: &PlotStyle, text: Text, file: &Path) -> Result<()> {
    let root = BitMapBackend::new(file, style.pixels(style.modes_size)).into_drawing_area();
    root.fill(&WHITE)?;

    let areas = root.split_evenly((1, plan.panels.len().max(1)));
    for (area, panel) in areas.iter().zip(&plan.panels) {
        let Some(panel) = panel else {
            continue;
        };
        draw_panel(area, panel, style, text)?;
    }

    root.present()?;
    Ok(())
}

fn draw_panel(
    area: &DrawingArea<BitMapBackend, Shift>,
    panel: &ModePanel,
    style: &PlotStyle,
    text: Text,
) -> Result<()> {
    if panel.kx.is_empty() || panel.ky.is_empty() {
        return Ok(());
    }

    let (width, _) = area.dim_in_pixel();
    let bar_width = if text.enabled { width / 5 } else { width / 12 };
    let (plot_area, bar_area) = area.split_horizontally(width.saturating_sub(bar_width));

    let norm = LogNorm::new(panel.values.iter().copied());
    let kx_edges = cell_edges(&panel.kx);
    let ky_edges = cell_edges(&panel.ky);

    let label_area = if text.enabled { 3.0 * text.size } else { 0.0 };
    let mut builder = ChartBuilder::on(&plot_area);
    builder
        .margin(style.points_to_pixels(6.0))
        .x_label_area_size(label_area as u32)
        .y_label_area_size(label_area as u32);
    if text.enabled {
        builder.caption(panel.title, text.font());
    }
    let mut chart = builder.build_cartesian_2d(span(&kx_edges), span(&ky_edges))?;

    if text.enabled {
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("k_x ρ_ref")
            .y_desc("k_y ρ_ref")
            .label_style(text.small_font())
            .axis_desc_style(text.small_font())
            .draw()?;
    }

    // Non-positive values are masked, as on any logarithmic colour scale.
    chart.draw_series(panel.values.indexed_iter().filter_map(|((i_ky, i_kx), &val)| {
        let frac = norm.fraction(val)?;
        Some(Rectangle::new(
            [
                (kx_edges[i_kx], ky_edges[i_ky]),
                (kx_edges[i_kx + 1], ky_edges[i_ky + 1]),
            ],
            viridis(frac).filled(),
        ))
    }))?;

    draw_colorbar(&bar_area, &norm, style, text)
}

fn draw_colorbar(
    area: &DrawingArea<BitMapBackend, Shift>,
    norm: &LogNorm,
    style: &PlotStyle,
    text: Text,
) -> Result<()> {
    let (width, _) = area.dim_in_pixel();
    let label_area = if text.enabled { width * 3 / 5 } else { 0 };

    // Leave the same room as the panel's caption and x labels so the bar
    // lines up with the plotting area.
    let caption_room = if text.enabled { 2.2 * text.size } else { 0.0 };
    let x_label_room = if text.enabled { 3.0 * text.size } else { 0.0 };
    let margin = style.points_to_pixels(6.0);

    let mut chart = ChartBuilder::on(area)
        .margin(margin)
        .margin_top(margin + caption_room as u32)
        .margin_bottom(margin + x_label_room as u32)
        .y_label_area_size(label_area)
        .build_cartesian_2d(0.0f64..1.0, (norm.min..norm.max).log_scale())?;

    if text.enabled {
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(0)
            .y_labels(5)
            .label_style(text.small_font())
            .draw()?;
    }

    let ratio = norm.max / norm.min;
    chart.draw_series((0..N_BAR_STEPS).map(|i_step| {
        let lo = norm.min * ratio.powf(i_step as f64 / N_BAR_STEPS as f64);
        let hi = norm.min * ratio.powf((i_step + 1) as f64 / N_BAR_STEPS as f64);
        let frac = (i_step as f64 + 0.5) / N_BAR_STEPS as f64;
        Rectangle::new([(0.0, lo), (1.0, hi)], viridis(frac).filled())
    }))?;

    Ok(())
}

/// Logarithmic colour normalisation over the positive finite values.
#[derive(Debug, PartialEq, Clone, Copy)]
struct LogNorm {
    min: f64,
    max: f64,
}

impl LogNorm {
    fn new<I: Iterator<Item = f64>>(vals: I) -> Self {
        let (min, max) = vals
            .filter(|&val| val > 0.0 && val.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), val| {
                (min.min(val), max.max(val))
            });
        if !min.is_finite() {
            return Self { min: 1.0, max: 10.0 };
        }
        if max > min {
            Self { min, max }
        } else {
            Self {
                min: min / 10.0,
                max: max * 10.0,
            }
        }
    }

    /// Position of `val` on the colour scale, `None` if it cannot be shown.
    fn fraction(&self, val: f64) -> Option<f64> {
        if !(val > 0.0 && val.is_finite()) {
            return None;
        }
        let frac = (val / self.min).ln() / (self.max / self.min).ln();
        Some(frac.clamp(0.0, 1.0))
    }
}

/// Boundaries of the cells centred on `centers`.
fn cell_edges(centers: &[f64]) -> Vec<f64> {
    let n = centers.len();
    if n == 1 {
        return vec![centers[0] - 0.5, centers[0] + 0.5];
    }
    let mut edges = Vec::with_capacity(n + 1);
    edges.push(centers[0] - 0.5 * (centers[1] - centers[0]));
    edges.extend(centers.windows(2).map(|pair| 0.5 * (pair[0] + pair[1])));
    edges.push(centers[n - 1] + 0.5 * (centers[n - 1] - centers[n - 2]));
    edges
}

fn span(edges: &[f64]) -> std::ops::Range<f64> {
    let min = edges.iter().copied().fold(f64::INFINITY, f64::min);
    let max = edges.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    min..max
}

/// Colour of a position on the scale, clamped to `[0, 1]`.
fn viridis(frac: f64) -> RGBColor {
    ViridisRGB.get_color(frac.clamp(0.0, 1.0))
}
