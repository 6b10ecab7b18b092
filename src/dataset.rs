//! Labeled multi-dimensional simulation output.
//!
//! A [`Dataset`] mirrors the layout of a GS2 `.out.nc` file: named 1-D
//! coordinates (`t`, `kx`, `ky`, `theta`) and named variables whose axes are
//! labeled by those coordinates. Datasets are stored as MessagePack.

use anyhow::{Context, Result, bail};
use ndarray::{Array1, ArrayD, ArrayView1, Axis, IxDyn};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Name of the time coordinate.
pub const TIME: &str = "t";

/// Array of values labeled by coordinate names, one per axis.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Variable {
    dims: Vec<String>,
    data: ArrayD<f64>,
}

impl Variable {
    pub fn new<S: AsRef<str>>(dims: &[S], data: ArrayD<f64>) -> Result<Self> {
        let dims: Vec<String> = dims.iter().map(|dim| dim.as_ref().to_string()).collect();
        if dims.len() != data.ndim() {
            bail!(
                "variable has {} dims but data has {} axes",
                dims.len(),
                data.ndim()
            );
        }
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Axis labeled by `dim`.
    pub fn axis(&self, dim: &str) -> Result<Axis> {
        let i_axis = self
            .dims
            .iter()
            .position(|name| name == dim)
            .with_context(|| format!("variable has no dim {dim:?} (dims: {:?})", self.dims))?;
        Ok(Axis(i_axis))
    }
}

/// Selection along one dimension of a variable.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Selection {
    /// A single position; negative values count from the end (`-1` is the
    /// last one). The dimension is dropped.
    Index(isize),
    /// All positions whose coordinate lies in the closed interval
    /// `[start, end]`. The dimension is kept.
    Interval { start: f64, end: f64 },
}

#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Dataset {
    coords: BTreeMap<String, Array1<f64>>,
    vars: BTreeMap<String, Variable>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a [`Dataset`] from a MessagePack-encoded file and validate it.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        let ds: Dataset =
            decode::from_read(&mut reader).context("failed to deserialize dataset")?;

        ds.validate().context("failed to validate dataset")?;

        Ok(ds)
    }

    /// Save the dataset to a MessagePack-encoded file.
    pub fn to_file<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, self).context("failed to serialize dataset")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    pub fn insert_coordinate<S: Into<String>>(&mut self, name: S, values: Array1<f64>) {
        self.coords.insert(name.into(), values);
    }

    /// Insert a variable, checking that its dims are known coordinates of
    /// matching length.
    pub fn insert_variable<S: Into<String>>(&mut self, name: S, var: Variable) -> Result<()> {
        let name = name.into();
        self.check_variable(&var)
            .with_context(|| format!("invalid variable {name:?}"))?;
        self.vars.insert(name, var);
        Ok(())
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn has_coordinate(&self, name: &str) -> bool {
        self.coords.contains_key(name)
    }

    pub fn get_variable(&self, name: &str) -> Result<&Variable> {
        self.vars
            .get(name)
            .with_context(|| format!("dataset has no variable {name:?}"))
    }

    pub fn get_coordinate(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let coord = self
            .coords
            .get(name)
            .with_context(|| format!("dataset has no coordinate {name:?}"))?;
        Ok(coord.view())
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Select part of `variable` along `dim`.
    pub fn select(&self, variable: &str, dim: &str, sel: Selection) -> Result<ArrayD<f64>> {
        let var = self.get_variable(variable)?;
        let axis = var.axis(dim)?;
        let len = var.data.len_of(axis);

        match sel {
            Selection::Index(idx) => {
                let resolved = if idx < 0 { len as isize + idx } else { idx };
                if resolved < 0 || resolved as usize >= len {
                    bail!("index {idx} is out of bounds for dim {dim:?} of length {len}");
                }
                Ok(var.data.index_axis(axis, resolved as usize).to_owned())
            }
            Selection::Interval { start, end } => {
                let coord = self.get_coordinate(dim)?;
                let idxs: Vec<usize> = coord
                    .iter()
                    .enumerate()
                    .filter(|&(_, &val)| val >= start && val <= end)
                    .map(|(i, _)| i)
                    .collect();
                Ok(var.data.select(axis, &idxs))
            }
        }
    }

    /// Mean of `variable` over the closed coordinate interval `[start, end]`
    /// of `dim`. The dimension is dropped; an empty interval gives NaN.
    pub fn mean(&self, variable: &str, dim: &str, start: f64, end: f64) -> Result<ArrayD<f64>> {
        let axis = self.get_variable(variable)?.axis(dim)?;
        let selected = self.select(variable, dim, Selection::Interval { start, end })?;

        if selected.len_of(axis) == 0 {
            let mut shape = selected.shape().to_vec();
            shape.remove(axis.index());
            return Ok(ArrayD::from_elem(IxDyn(&shape), f64::NAN));
        }

        selected
            .mean_axis(axis)
            .context("failed to average over interval")
    }

    /// Check that every variable matches its coordinates and that the time
    /// coordinate, if present, is strictly increasing.
    pub fn validate(&self) -> Result<()> {
        if let Some(time) = self.coords.get(TIME) {
            let time = time.as_slice().context("time coordinate is not contiguous")?;
            if let Some(i) = time.windows(2).position(|pair| !(pair[1] > pair[0])) {
                bail!("time must be strictly increasing (violated at index {})", i + 1);
            }
        }
        for (name, var) in &self.vars {
            self.check_variable(var)
                .with_context(|| format!("invalid variable {name:?}"))?;
        }
        Ok(())
    }

    fn check_variable(&self, var: &Variable) -> Result<()> {
        if var.dims.len() != var.data.ndim() {
            bail!(
                "variable has {} dims but data has {} axes",
                var.dims.len(),
                var.data.ndim()
            );
        }
        for (i_axis, dim) in var.dims.iter().enumerate() {
            let coord = self
                .coords
                .get(dim)
                .with_context(|| format!("unknown dim {dim:?}"))?;
            let len = var.data.len_of(Axis(i_axis));
            if len != coord.len() {
                bail!(
                    "dim {dim:?} has length {len}, but its coordinate has length {}",
                    coord.len()
                );
            }
        }
        Ok(())
    }
}
