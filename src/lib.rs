//! Post-processing of GS2 gyrokinetic simulation output.
//!
//! Detects the saturation time of the electrostatic field energy and draws
//! the standard diagnostic figures of a run: field time traces, field
//! spectra by mode and zonal-flow transfer profiles along `theta`.

pub mod dataset;
pub mod manager;
pub mod render;
pub mod saturation;
pub mod style;
pub mod synth;

mod utils;

pub use dataset::{Dataset, Selection, Variable};
pub use manager::Manager;
pub use saturation::{InvalidArgument, Saturation, SaturationParams, detect_saturation_time};
pub use style::PlotStyle;
