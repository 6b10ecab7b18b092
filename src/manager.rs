use crate::dataset::Dataset;
use crate::render::{
    RenderOptions,
    modes::plot_fields_by_mode,
    traces::{TracesOptions, plot_fields_time_traces},
    transfer::{AveragedOptions, plot_transfer_by_theta, plot_transfer_by_theta_averaged},
};
use crate::saturation::{SaturationParams, detect_in_dataset};
use crate::style::PlotStyle;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

/// Default duration of the averaging window of the averaged transfer figure.
pub const DEFAULT_AVG_WINDOW: f64 = 10.0;

/// Batch driver that draws every figure for one or many datasets.
///
/// Figures of a dataset go to `output_dir/<dataset file stem>/`.
pub struct Manager {
    output_dir: PathBuf,
    style: PlotStyle,
    saturation: SaturationParams,
    avg_window: f64,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(output_dir: P, style: PlotStyle) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();

        style.validate().context("invalid plot style")?;

        Ok(Self {
            output_dir,
            style,
            saturation: SaturationParams::default(),
            avg_window: DEFAULT_AVG_WINDOW,
        })
    }

    pub fn with_saturation(mut self, saturation: SaturationParams) -> Self {
        self.saturation = saturation;
        self
    }

    pub fn with_avg_window(mut self, avg_window: f64) -> Self {
        self.avg_window = avg_window;
        self
    }

    /// Draw every figure of the dataset stored in `file`.
    ///
    /// Returns the paths of the written figures.
    pub fn process_dataset<P: AsRef<Path>>(&self, file: P) -> Result<Vec<PathBuf>> {
        let file = file.as_ref();
        let ds = Dataset::from_file(file).with_context(|| format!("failed to load {file:?}"))?;
        log::info!("loaded {file:?}");

        let dataset_dir = self.dataset_dir(file)?;
        let render = RenderOptions {
            output_dir: dataset_dir,
            filename: None,
            style: self.style.clone(),
        };

        let saturation =
            detect_in_dataset(&ds, &self.saturation).context("failed to detect saturation")?;
        log::info!("saturation time of {file:?}: {saturation}");

        let traces_opts = TracesOptions {
            render: render.clone(),
            saturation: self.saturation,
        };
        let averaged_opts = AveragedOptions {
            render: render.clone(),
            window: self.avg_window,
            tstart: None,
        };

        let paths = vec![
            plot_fields_time_traces(&ds, &traces_opts).context("failed to plot time traces")?,
            plot_fields_by_mode(&ds, &render).context("failed to plot mode spectra")?,
            plot_transfer_by_theta(&ds, &render).context("failed to plot transfer profiles")?,
            plot_transfer_by_theta_averaged(&ds, &averaged_opts)
                .context("failed to plot averaged transfer profiles")?,
        ];

        Ok(paths)
    }

    /// Draw every figure of each dataset matching `pattern`.
    ///
    /// Returns the number of processed datasets.
    pub fn process_pattern(&self, pattern: &str) -> Result<usize> {
        let files: Vec<PathBuf> = glob(pattern)
            .context("failed to glob datasets")?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        if files.is_empty() {
            bail!("no dataset matches {pattern:?}");
        }

        // Datasets sharing a stem would overwrite each other's figures.
        let mut stems = BTreeSet::new();
        for file in &files {
            let stem = file_stem(file)?;
            if !stems.insert(stem) {
                bail!("more than one dataset is named {stem:?}");
            }
        }

        for file in &files {
            self.process_dataset(file)
                .with_context(|| format!("failed to process {file:?}"))?;
        }

        Ok(files.len())
    }

    /// Remove the output directory and everything in it.
    pub fn clean(&self) -> Result<()> {
        if !self.output_dir.exists() {
            log::info!("nothing to remove at {:?}", self.output_dir);
            return Ok(());
        }

        fs::remove_dir_all(&self.output_dir)
            .with_context(|| format!("failed to remove {:?}", self.output_dir))?;
        log::info!("removed {:?}", self.output_dir);

        Ok(())
    }

    fn dataset_dir(&self, file: &Path) -> Result<PathBuf> {
        Ok(self.output_dir.join(file_stem(file)?))
    }
}

fn file_stem(file: &Path) -> Result<&str> {
    file.file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("{file:?} has no valid UTF-8 file stem"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{SynthParams, synthesize};

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gs2post-manager-{name}-{}", std::process::id()))
    }

    fn write_dataset(file: &Path) {
        let params = SynthParams {
            n_t: 60,
            n_kx: 4,
            n_ky: 3,
            n_theta: 9,
            ..SynthParams::default()
        };
        synthesize(&params).unwrap().to_file(file).unwrap();
    }

    #[test]
    fn processes_every_matching_dataset() {
        let dir = scratch_dir("pattern");
        fs::create_dir_all(dir.join("data")).unwrap();
        write_dataset(&dir.join("data").join("run_a.msgpack"));
        write_dataset(&dir.join("data").join("run_b.msgpack"));

        let mgr = Manager::new(dir.join("figures"), PlotStyle::default())
            .unwrap()
            .with_avg_window(5.0);
        let pattern = dir.join("data").join("*.msgpack");
        let count = mgr.process_pattern(pattern.to_str().unwrap()).unwrap();
        assert_eq!(count, 2);

        for stem in ["run_a", "run_b"] {
            let figures = fs::read_dir(dir.join("figures").join(stem)).unwrap().count();
            assert_eq!(figures, 4);
        }

        mgr.clean().unwrap();
        assert!(!dir.join("figures").exists());
        mgr.clean().unwrap();

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn duplicate_stems_are_rejected() {
        let dir = scratch_dir("duplicates");
        fs::create_dir_all(dir.join("a")).unwrap();
        fs::create_dir_all(dir.join("b")).unwrap();
        write_dataset(&dir.join("a").join("run.msgpack"));
        write_dataset(&dir.join("b").join("run.msgpack"));

        let mgr = Manager::new(dir.join("figures"), PlotStyle::default()).unwrap();
        let pattern = dir.join("*").join("run.msgpack");
        let err = mgr.process_pattern(pattern.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("more than one dataset"));
        assert!(!dir.join("figures").exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_pattern_is_an_error() {
        let dir = scratch_dir("empty");
        let mgr = Manager::new(dir.join("figures"), PlotStyle::default()).unwrap();
        let pattern = dir.join("*.msgpack");
        assert!(mgr.process_pattern(pattern.to_str().unwrap()).is_err());
    }
}
