//! Saturation-time detection.
//!
//! The saturation time marks the end of the linear (exponential growth) phase
//! of a field-energy trace. It is estimated from a windowed finite-difference
//! growth rate of `ln(field)`: after the growth rate peaks, the first sample
//! whose growth rate falls below a threshold is taken as the saturation time.

use crate::dataset::{Dataset, TIME};
use anyhow::{Context, Result, bail};
use std::{error::Error, fmt};

/// Rejected inputs of the growth-rate estimator.
#[derive(Clone, Debug, PartialEq)]
pub enum InvalidArgument {
    /// `time` and `field` have different lengths.
    LengthMismatch { n_time: usize, n_field: usize },
    /// Fewer than two samples, so no sampling interval can be derived.
    TooFewSamples { n: usize },
    /// The window is zero, negative or not finite.
    NonPositiveWindow(f64),
    /// The threshold is zero, negative or not finite.
    NonPositiveThreshold(f64),
    /// `time[index] <= time[index - 1]`.
    NonIncreasingTime { index: usize },
}

impl fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { n_time, n_field } => {
                write!(f, "time has {n_time} samples but field has {n_field}")
            }
            Self::TooFewSamples { n } => write!(f, "at least 2 samples are needed, got {n}"),
            Self::NonPositiveWindow(window) => write!(f, "window must be positive, got {window}"),
            Self::NonPositiveThreshold(threshold) => {
                write!(f, "threshold must be positive, got {threshold}")
            }
            Self::NonIncreasingTime { index } => {
                write!(f, "time must be strictly increasing (violated at index {index})")
            }
        }
    }
}

impl Error for InvalidArgument {}

/// Outcome of a saturation search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Saturation {
    /// Saturation starts at `time`, which is the sample `index` of the input.
    Detected { time: f64, index: usize },
    /// The growth rate never dropped below the threshold after its peak, or
    /// could not be computed at all.
    NotFound,
}

impl Saturation {
    pub fn time(&self) -> Option<f64> {
        match *self {
            Self::Detected { time, .. } => Some(time),
            Self::NotFound => None,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Detected { .. })
    }
}

impl fmt::Display for Saturation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detected { time, .. } => write!(f, "{time}"),
            Self::NotFound => write!(f, "not found"),
        }
    }
}

/// Parameters of the saturation search.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct SaturationParams {
    /// Time span (in units of the time coordinate) of the finite difference.
    pub window: f64,
    /// Growth rate (inverse time units) below which the field is saturated.
    pub threshold: f64,
}

impl Default for SaturationParams {
    fn default() -> Self {
        Self {
            window: 20.0,
            threshold: 0.1,
        }
    }
}

/// Convert a time window into a sample offset.
///
/// Only the first sampling interval is used: on non-uniformly sampled input
/// the offset does not correspond to `window` time units elsewhere in the
/// series.
pub fn window_offset(time: &[f64], window: f64) -> Result<usize, InvalidArgument> {
    if time.len() < 2 {
        return Err(InvalidArgument::TooFewSamples { n: time.len() });
    }
    check_window(window)?;
    // Saturating cast: a huge ratio maps to usize::MAX and is then >= N.
    Ok((window / (time[1] - time[0])).floor() as usize)
}

/// Windowed growth rate of `ln(field)`.
///
/// Entries before the first full window are NaN, as are entries touching a
/// non-positive field value.
pub fn growth_rate(time: &[f64], field: &[f64], window: f64) -> Result<Vec<f64>, InvalidArgument> {
    check_series(time, field)?;
    let k = window_offset(time, window)?;
    Ok(compute_growth_rate(time, field, k))
}

/// Detect the saturation time of `field` sampled at `time`.
///
/// Numerically degenerate input (window longer than the series, flat or
/// non-positive data, growth that never decays) yields
/// [`Saturation::NotFound`]; only malformed arguments are rejected.
pub fn detect_saturation_time(
    time: &[f64],
    field: &[f64],
    window: f64,
    threshold: f64,
) -> Result<Saturation, InvalidArgument> {
    check_series(time, field)?;
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(InvalidArgument::NonPositiveThreshold(threshold));
    }
    let k = window_offset(time, window)?;
    if k == 0 || k >= time.len() {
        return Ok(Saturation::NotFound);
    }

    let growth = compute_growth_rate(time, field, k);

    let Some(i_peak) = first_argmax(&growth) else {
        return Ok(Saturation::NotFound);
    };

    // Only look after the peak so early transients cannot trigger.
    let saturation = growth[i_peak..]
        .iter()
        .position(|&rate| rate < threshold)
        .map_or(Saturation::NotFound, |offset| {
            let index = i_peak + offset;
            Saturation::Detected {
                time: time[index],
                index,
            }
        });

    Ok(saturation)
}

/// Detect the saturation time of the `phi2` trace of a dataset.
///
/// A dataset without `phi2` has no detectable saturation.
pub fn detect_in_dataset(ds: &Dataset, params: &SaturationParams) -> Result<Saturation> {
    if !ds.has_variable("phi2") {
        return Ok(Saturation::NotFound);
    }
    let time = ds.get_coordinate(TIME).context("failed to get time coordinate")?;
    let phi2 = ds.get_variable("phi2").context("failed to get phi2")?;
    if phi2.dims() != [TIME] {
        bail!("phi2 must depend on {TIME:?} only, but has dims {:?}", phi2.dims());
    }

    let time = time.to_vec();
    let phi2: Vec<f64> = phi2.data().iter().copied().collect();
    let saturation = detect_saturation_time(&time, &phi2, params.window, params.threshold)
        .context("invalid saturation search arguments")?;
    log::debug!("saturation of phi2: {saturation}");

    Ok(saturation)
}

fn check_window(window: f64) -> Result<(), InvalidArgument> {
    if !(window.is_finite() && window > 0.0) {
        return Err(InvalidArgument::NonPositiveWindow(window));
    }
    Ok(())
}

fn check_series(time: &[f64], field: &[f64]) -> Result<(), InvalidArgument> {
    if time.len() != field.len() {
        return Err(InvalidArgument::LengthMismatch {
            n_time: time.len(),
            n_field: field.len(),
        });
    }
    if time.len() < 2 {
        return Err(InvalidArgument::TooFewSamples { n: time.len() });
    }
    // Written so that NaN samples also fail.
    if let Some(i) = time.windows(2).position(|pair| !(pair[1] > pair[0])) {
        return Err(InvalidArgument::NonIncreasingTime { index: i + 1 });
    }
    Ok(())
}

fn compute_growth_rate(time: &[f64], field: &[f64], k: usize) -> Vec<f64> {
    let log_field: Vec<f64> = field
        .iter()
        .map(|&val| if val > 0.0 { val.ln() } else { f64::NAN })
        .collect();

    let mut growth = vec![f64::NAN; time.len()];
    if k == 0 {
        return growth;
    }
    for i in k..time.len() {
        growth[i] = (log_field[i] - log_field[i - k]) / (time[i] - time[i - k]);
    }
    growth
}

/// Index of the largest non-NaN value; the lowest index wins ties.
fn first_argmax(vals: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &val) in vals.iter().enumerate() {
        if val.is_nan() {
            continue;
        }
        match best {
            Some((_, max)) if val <= max => {}
            _ => best = Some((i, val)),
        }
    }
    best.map(|(i, _)| i)
}
