//! Poloidal structure of the zonal-flow transfer diagnostics.

use super::{
    PALETTE, RenderOptions, Text, grid_segments, linear_range, linear_ticks, prepare_text,
    write_atomically,
};
use crate::dataset::{Dataset, Selection, TIME};
use crate::saturation::InvalidArgument;
use crate::style::PlotStyle;
use anyhow::{Context, Result, bail};
use ndarray::ArrayD;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILENAME: &str = "transfer_by_theta.png";
pub const AVERAGED_FILENAME: &str = "transfer_by_theta_averaged.png";

const THETA: &str = "theta";

/// Candidate diagnostics and their legend labels.
pub const TRANSFER_DIAGNOSTICS: [(&str, &str); 4] = [
    ("kinetic_energy_transfer_theta", "T_v ZF"),
    ("entropy_transfer_phi_theta", "T_S,φ ZF"),
    ("entropy_transfer_apar_theta", "T_S,A∥ ZF"),
    ("entropy_transfer_bpar_theta", "T_S,B∥ ZF"),
];

/// Options of [`plot_transfer_by_theta_averaged`].
#[derive(Debug, PartialEq, Clone)]
pub struct AveragedOptions {
    pub render: RenderOptions,
    /// Duration of the averaging window.
    pub window: f64,
    /// Start of the averaging window; defaults to the last `window` time
    /// units of the run.
    pub tstart: Option<f64>,
}

impl AveragedOptions {
    pub fn new(window: f64) -> Self {
        Self {
            render: RenderOptions::default(),
            window,
            tstart: None,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Profile {
    pub name: &'static str,
    pub label: &'static str,
    pub values: Vec<f64>,
}

/// Closed time interval a profile was averaged over.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
    /// Number of time samples inside the interval.
    pub n_samples: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TransferPlan {
    pub theta: Vec<f64>,
    pub profiles: Vec<Profile>,
    /// Averaging interval, `None` for the last time step.
    pub interval: Option<Interval>,
}

fn enabled_diagnostics(ds: &Dataset) -> Vec<(&'static str, &'static str)> {
    TRANSFER_DIAGNOSTICS
        .into_iter()
        .filter(|(name, _)| ds.has_variable(name))
        .collect()
}

fn theta_of(ds: &Dataset, enabled: &[(&str, &str)]) -> Result<Vec<f64>> {
    if enabled.is_empty() && !ds.has_coordinate(THETA) {
        return Ok(Vec::new());
    }
    Ok(ds.get_coordinate(THETA)?.to_vec())
}

fn profile(name: &'static str, label: &'static str, values: ArrayD<f64>) -> Result<Profile> {
    if values.ndim() != 1 {
        bail!(
            "{name} must depend on ({TIME:?}, {THETA:?}), but has {} dims besides time",
            values.ndim()
        );
    }
    Ok(Profile {
        name,
        label,
        values: values.iter().copied().collect(),
    })
}

/// Plan the transfer profiles at the last time step.
pub fn plan_transfer_by_theta(ds: &Dataset) -> Result<TransferPlan> {
    let enabled = enabled_diagnostics(ds);
    let theta = theta_of(ds, &enabled).context("failed to get poloidal angle")?;

    let mut profiles = Vec::with_capacity(enabled.len());
    for (name, label) in enabled {
        let last = ds
            .select(name, TIME, Selection::Index(-1))
            .with_context(|| format!("failed to select last step of {name}"))?;
        profiles.push(profile(name, label, last)?);
    }

    Ok(TransferPlan {
        theta,
        profiles,
        interval: None,
    })
}

/// Plan the transfer profiles averaged over `[tstart, tstart + window]`.
///
/// Without `tstart` the window ends at the last time step.
pub fn plan_transfer_by_theta_averaged(
    ds: &Dataset,
    window: f64,
    tstart: Option<f64>,
) -> Result<TransferPlan> {
    if !(window.is_finite() && window > 0.0) {
        return Err(InvalidArgument::NonPositiveWindow(window).into());
    }

    let time = ds.get_coordinate(TIME).context("failed to get time coordinate")?;
    let start = match tstart {
        Some(start) => start,
        None => time.last().context("time coordinate is empty")? - window,
    };
    let end = start + window;
    let n_samples = time.iter().filter(|&&t| t >= start && t <= end).count();
    if n_samples == 0 {
        log::warn!("no time samples in [{start}, {end}]");
    }

    let enabled = enabled_diagnostics(ds);
    let theta = theta_of(ds, &enabled).context("failed to get poloidal angle")?;

    let mut profiles = Vec::with_capacity(enabled.len());
    for (name, label) in enabled {
        let avg = ds
            .mean(name, TIME, start, end)
            .with_context(|| format!("failed to average {name}"))?;
        profiles.push(profile(name, label, avg)?);
    }

    Ok(TransferPlan {
        theta,
        profiles,
        interval: Some(Interval {
            start,
            end,
            n_samples,
        }),
    })
}

/// Plot each available transfer diagnostic against the poloidal angle at
/// the last time step.
///
/// Returns the path of the written figure.
pub fn plot_transfer_by_theta(ds: &Dataset, opts: &RenderOptions) -> Result<PathBuf> {
    let plan = plan_transfer_by_theta(ds).context("failed to plan transfer profiles")?;
    render(&plan, opts, DEFAULT_FILENAME)
}

/// Plot each available transfer diagnostic against the poloidal angle,
/// averaged over a time window.
///
/// Returns the path of the written figure.
pub fn plot_transfer_by_theta_averaged(ds: &Dataset, opts: &AveragedOptions) -> Result<PathBuf> {
    let plan = plan_transfer_by_theta_averaged(ds, opts.window, opts.tstart)
        .context("failed to plan averaged transfer profiles")?;
    render(&plan, &opts.render, AVERAGED_FILENAME)
}

fn render(plan: &TransferPlan, opts: &RenderOptions, default_filename: &str) -> Result<PathBuf> {
    log::debug!("transfer profiles: {}", plan.profiles.len());

    let text = prepare_text(&opts.style).context("failed to prepare text")?;
    let path = opts.output_path(default_filename)?;

    write_atomically(&path, |file| draw_transfer(plan, &opts.style, text, file))
        .with_context(|| format!("failed to draw {path:?}"))?;
    log::info!("wrote {path:?}");

    Ok(path)
}

fn draw_transfer(plan: &TransferPlan, style: &PlotStyle, text: Text, file: &Path) -> Result<()> {
    let root = BitMapBackend::new(file, style.pixels(style.transfer_size)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_range = linear_range(&plan.theta);
    let y_range = linear_range(plan.profiles.iter().flat_map(|profile| &profile.values));

    let label_area = if text.enabled { 4.0 * text.size } else { 0.0 };
    let mut builder = ChartBuilder::on(&root);
    builder
        .margin(style.points_to_pixels(8.0))
        .x_label_area_size(label_area as u32)
        .y_label_area_size((1.5 * label_area) as u32);
    if let (true, Some(interval)) = (text.enabled, plan.interval) {
        builder.caption(
            format!(
                "Averaged over t = [{:.1}, {:.1}]",
                interval.start, interval.end
            ),
            text.font(),
        );
    }
    let mut chart = builder.build_cartesian_2d(x_range.clone(), y_range.clone())?;

    let grid_color = BLACK.mix(style.grid_alpha);
    if text.enabled {
        chart
            .configure_mesh()
            .bold_line_style(grid_color)
            .light_line_style(TRANSPARENT)
            .x_desc("θ")
            .y_desc("transfer")
            .label_style(text.small_font())
            .axis_desc_style(text.font())
            .draw()?;
    } else {
        let segments = grid_segments(
            &linear_ticks(&x_range, 8),
            &linear_ticks(&y_range, 8),
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
    for (i, profile) in plan.profiles.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let points = plan
            .theta
            .iter()
            .zip(&profile.values)
            .filter(|&(_, val)| val.is_finite())
            .map(|(&theta, &val)| (theta, val));

        let series = chart.draw_series(LineSeries::new(points, color.stroke_width(line_width)))?;
        if text.enabled {
            series.label(profile.label).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(line_width))
            });
        }
    }

    if text.enabled && !plan.profiles.is_empty() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Variable;
    use ndarray::{Array, Array1};

    /// Time 0..=100; every diagnostic equals `t * cos(theta)`.
    fn transfer_dataset(names: &[&str]) -> Dataset {
        let time = Array1::linspace(0.0, 100.0, 101);
        let theta = Array1::linspace(-std::f64::consts::PI, std::f64::consts::PI, 9);

        let data = Array::from_shape_fn((time.len(), theta.len()), |(i_t, i_theta)| {
            time[i_t] * theta[i_theta].cos()
        });

        let mut ds = Dataset::new();
        ds.insert_coordinate(TIME, time);
        if !names.is_empty() {
            ds.insert_coordinate(THETA, theta);
        }
        for &name in names {
            let var = Variable::new(&[TIME, THETA], data.clone().into_dyn()).unwrap();
            ds.insert_variable(name, var).unwrap();
        }
        ds
    }

    #[test]
    fn last_step_profiles_follow_candidate_order() {
        let ds = transfer_dataset(&["entropy_transfer_bpar_theta", "kinetic_energy_transfer_theta"]);
        let plan = plan_transfer_by_theta(&ds).unwrap();

        let names: Vec<_> = plan.profiles.iter().map(|profile| profile.name).collect();
        assert_eq!(
            names,
            vec!["kinetic_energy_transfer_theta", "entropy_transfer_bpar_theta"]
        );
        assert_eq!(plan.interval, None);
        assert_eq!(plan.profiles[0].values[4], 100.0);
    }

    #[test]
    fn default_start_averages_last_window() {
        let ds = transfer_dataset(&["kinetic_energy_transfer_theta"]);
        let plan = plan_transfer_by_theta_averaged(&ds, 10.0, None).unwrap();

        assert_eq!(
            plan.interval,
            Some(Interval {
                start: 90.0,
                end: 100.0,
                n_samples: 11
            })
        );
        // Mean of t over {90, 91, ..., 100} at theta = 0.
        assert!((plan.profiles[0].values[4] - 95.0).abs() < 1e-12);
    }

    #[test]
    fn explicit_start_sets_interval() {
        let ds = transfer_dataset(&["entropy_transfer_phi_theta"]);
        let plan = plan_transfer_by_theta_averaged(&ds, 4.0, Some(10.0)).unwrap();

        let interval = plan.interval.unwrap();
        assert_eq!((interval.start, interval.end, interval.n_samples), (10.0, 14.0, 5));
        assert!((plan.profiles[0].values[4] - 12.0).abs() < 1e-12);
    }

    #[test]
    fn empty_window_gives_nan_profile() {
        let ds = transfer_dataset(&["entropy_transfer_phi_theta"]);
        let plan = plan_transfer_by_theta_averaged(&ds, 5.0, Some(500.0)).unwrap();

        assert_eq!(plan.interval.unwrap().n_samples, 0);
        assert!(plan.profiles[0].values.iter().all(|val| val.is_nan()));
    }

    #[test]
    fn non_positive_window_is_rejected() {
        let ds = transfer_dataset(&["entropy_transfer_phi_theta"]);
        let err = plan_transfer_by_theta_averaged(&ds, 0.0, None).unwrap_err();
        assert_eq!(
            err.downcast_ref::<InvalidArgument>(),
            Some(&InvalidArgument::NonPositiveWindow(0.0))
        );
    }

    #[test]
    fn draws_without_text() {
        let dir =
            std::env::temp_dir().join(format!("gs2post-transfer-plain-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("no_text.png");

        let ds = transfer_dataset(&["kinetic_energy_transfer_theta"]);
        let plan = plan_transfer_by_theta_averaged(&ds, 10.0, None).unwrap();
        let text = Text {
            enabled: false,
            size: 12.0,
        };
        draw_transfer(&plan, &PlotStyle::default(), text, &file).unwrap();
        let bytes = std::fs::read(&file).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn renders_with_and_without_diagnostics() {
        let dir = std::env::temp_dir().join(format!("gs2post-transfer-{}", std::process::id()));

        let ds = transfer_dataset(&["kinetic_energy_transfer_theta", "entropy_transfer_apar_theta"]);
        let path = plot_transfer_by_theta(&ds, &RenderOptions::new(&dir)).unwrap();
        assert_eq!(path, dir.join(DEFAULT_FILENAME));
        assert!(path.is_file());

        let opts = AveragedOptions {
            render: RenderOptions::new(&dir),
            ..AveragedOptions::new(10.0)
        };
        let path = plot_transfer_by_theta_averaged(&ds, &opts).unwrap();
        assert_eq!(path, dir.join(AVERAGED_FILENAME));
        assert!(path.is_file());

        let empty = transfer_dataset(&[]);
        assert!(plan_transfer_by_theta(&empty).unwrap().profiles.is_empty());
        let opts = RenderOptions {
            filename: Some("empty_transfer.png".to_string()),
            ..RenderOptions::new(&dir)
        };
        assert!(plot_transfer_by_theta(&empty, &opts).unwrap().is_file());

        std::fs::remove_dir_all(&dir).ok();
    }
}
