//! Synthetic datasets with the layout of GS2 output.
//!
//! Fields grow exponentially until a prescribed saturation time and stay
//! flat afterwards, with multiplicative log-normal noise. Useful for demos
//! and for exercising the renderers end to end.

use crate::dataset::{Dataset, TIME, Variable};
use crate::utils::check_num;
use anyhow::{Context, Result};
use ndarray::{Array, Array1};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::{LogNormal, Normal};
use serde::{Deserialize, Serialize};
use std::{f64::consts::PI, fs, path::Path};

/// Parameters of a synthetic dataset.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynthParams {
    /// Number of time samples.
    pub n_t: usize,
    /// Sampling interval.
    pub dt: f64,
    /// Linear growth rate of the field amplitude (`phi2` grows at twice it).
    pub growth_rate: f64,
    /// Time at which growth stops.
    pub t_sat: f64,
    /// Standard deviation of the log-normal noise.
    pub noise: f64,

    pub n_kx: usize,
    pub n_ky: usize,
    pub n_theta: usize,

    /// Include `apar2` and `apar2_by_mode`.
    pub apar: bool,
    /// Include `bpar2` and `bpar2_by_mode`.
    pub bpar: bool,
    /// Include the zonal-flow transfer diagnostics.
    pub transfer: bool,

    pub seed: u64,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            n_t: 400,
            dt: 0.5,
            growth_rate: 0.2,
            t_sat: 80.0,
            noise: 0.05,
            n_kx: 16,
            n_ky: 8,
            n_theta: 33,
            apar: true,
            bpar: true,
            transfer: true,
            seed: 0,
        }
    }
}

impl SynthParams {
    /// Load [`SynthParams`] from a TOML file and validate them.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let params: SynthParams =
            toml::from_str(&contents).context("failed to deserialize synthesis parameters")?;

        params
            .validate()
            .context("failed to validate synthesis parameters")?;

        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        check_num(self.n_t, 2..1_000_000).context("invalid number of time samples")?;
        check_num(self.dt, 1e-6..1e6).context("invalid sampling interval")?;
        check_num(self.growth_rate, 0.0..100.0).context("invalid growth rate")?;
        check_num(self.t_sat, 0.0..f64::INFINITY).context("invalid saturation time")?;
        check_num(self.noise, 0.0..10.0).context("invalid noise level")?;
        check_num(self.n_kx, 1..4096).context("invalid number of kx modes")?;
        check_num(self.n_ky, 1..4096).context("invalid number of ky modes")?;
        check_num(self.n_theta, 2..100_000).context("invalid number of theta points")?;
        Ok(())
    }
}

/// Wavenumbers in FFT order: zero, positive, then negative.
fn fft_wavenumbers(n: usize, dk: f64) -> Array1<f64> {
    Array1::from_iter((0..n).map(|i| {
        let m = if i < n.div_ceil(2) {
            i as f64
        } else {
            i as f64 - n as f64
        };
        m * dk
    }))
}

/// Generate a synthetic dataset. The same parameters always give the same
/// dataset.
pub fn synthesize(params: &SynthParams) -> Result<Dataset> {
    params.validate().context("invalid synthesis parameters")?;

    let mut rng = ChaCha12Rng::seed_from_u64(params.seed);
    let noise_dist = LogNormal::new(0.0, params.noise)?;
    let transfer_noise_dist = Normal::new(0.0, params.noise)?;

    let time = Array1::from_iter((0..params.n_t).map(|i| i as f64 * params.dt));
    let kx = fft_wavenumbers(params.n_kx, 0.1);
    let ky = Array1::from_iter((0..params.n_ky).map(|i| i as f64 * 0.1));
    let theta = Array1::linspace(-PI, PI, params.n_theta);

    // Noise-free energy envelope of the fields.
    let envelope = time.mapv(|t| (2.0 * params.growth_rate * t.min(params.t_sat)).exp());

    let mut ds = Dataset::new();
    ds.insert_coordinate(TIME, time);
    ds.insert_coordinate("kx", kx.clone());
    ds.insert_coordinate("ky", ky.clone());

    let fields = [
        ("phi2", true, 1.0),
        ("apar2", params.apar, 1e-2),
        ("bpar2", params.bpar, 1e-4),
    ];
    for (name, enabled, scale) in fields {
        if !enabled {
            continue;
        }

        let trace = envelope.mapv(|val| scale * val * noise_dist.sample(&mut rng));
        let var = Variable::new(&[TIME], trace.into_dyn())?;
        ds.insert_variable(name, var)?;

        let by_mode = Array::from_shape_fn(
            (params.n_t, params.n_ky, params.n_kx),
            |(i_t, i_ky, i_kx)| {
                let weight = (-(kx[i_kx] / 0.4).powi(2) - ((ky[i_ky] - 0.3) / 0.2).powi(2)).exp();
                scale * envelope[i_t] * (weight + 1e-6) * noise_dist.sample(&mut rng)
            },
        );
        let var = Variable::new(&[TIME, "ky", "kx"], by_mode.into_dyn())?;
        ds.insert_variable(format!("{name}_by_mode"), var)?;
    }

    if params.transfer {
        ds.insert_coordinate("theta", theta.clone());

        let saturated = envelope.mapv(|val| val / envelope[params.n_t - 1]);
        let diagnostics: [(&str, fn(f64) -> f64, bool); 4] = [
            ("kinetic_energy_transfer_theta", |th| th.cos(), true),
            ("entropy_transfer_phi_theta", |th| 0.5 * (2.0 * th).cos(), true),
            ("entropy_transfer_apar_theta", |th| 0.1 * th.sin(), params.apar),
            ("entropy_transfer_bpar_theta", |th| -0.05 * th.cos(), params.bpar),
        ];
        for (name, shape, enabled) in diagnostics {
            if !enabled {
                continue;
            }
            let data = Array::from_shape_fn((params.n_t, params.n_theta), |(i_t, i_theta)| {
                saturated[i_t] * (shape(theta[i_theta]) + transfer_noise_dist.sample(&mut rng))
            });
            let var = Variable::new(&[TIME, "theta"], data.into_dyn())?;
            ds.insert_variable(name, var)?;
        }
    }

    log::info!(
        "synthesized dataset with {} variables",
        ds.variable_names().count()
    );

    Ok(ds)
}
