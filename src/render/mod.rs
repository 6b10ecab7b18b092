//! Diagnostic figures.
//!
//! Every renderer first builds a plan (the data it is going to draw, decided
//! from which variables the dataset provides) and then rasterizes the plan
//! into a single PNG file. Plans are public so figure content can be checked
//! without decoding images.

pub mod modes;
pub mod traces;
pub mod transfer;

use crate::style::PlotStyle;
use anyhow::{Context, Result, anyhow};
use plotters::prelude::*;
use plotters::style::{FontStyle, register_font};
use std::{
    collections::BTreeMap,
    fs,
    ops::Range,
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex},
};

/// Font family used for every text element.
const FONT_FAMILY: &str = "sans-serif";

/// Locations searched for a font when the style does not name one.
const FONT_CANDIDATES: [&str; 7] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Line colours, in order of use.
pub(crate) const PALETTE: [RGBColor; 4] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
];

/// Font bytes by path. Registered fonts must outlive every drawing call.
static FONT_CACHE: LazyLock<Mutex<BTreeMap<PathBuf, &'static [u8]>>> =
    LazyLock::new(|| Mutex::new(BTreeMap::new()));

/// Output location and style shared by all renderers.
#[derive(Debug, PartialEq, Clone)]
pub struct RenderOptions {
    /// Directory of the figure, created if missing.
    pub output_dir: PathBuf,
    /// File name of the figure; each renderer has its own default.
    pub filename: Option<String>,
    pub style: PlotStyle,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            filename: None,
            style: PlotStyle::default(),
        }
    }
}

impl RenderOptions {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Create the output directory and resolve the figure path.
    ///
    /// A file name without extension gets `.png`.
    pub fn output_path(&self, default_filename: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {:?}", self.output_dir))?;

        let filename = self.filename.as_deref().unwrap_or(default_filename);
        let mut path = self.output_dir.join(filename);
        if path.extension().is_none() {
            path.set_extension("png");
        }
        Ok(path)
    }
}

/// Text settings of one drawing call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Text {
    /// A font is registered and text can be drawn.
    pub enabled: bool,
    /// Font size in pixels.
    pub size: f64,
}

impl Text {
    pub fn font(&self) -> TextStyle<'static> {
        (FONT_FAMILY, self.size).into_font().into()
    }

    pub fn small_font(&self) -> TextStyle<'static> {
        (FONT_FAMILY, 0.8 * self.size).into_font().into()
    }
}

/// Register the style's font with the plotting backend.
///
/// An explicitly configured font that cannot be loaded is an error; when no
/// font is configured and none of the usual locations has one, text is
/// disabled.
pub(crate) fn prepare_text(style: &PlotStyle) -> Result<Text> {
    let size = style.points_to_pixels(style.font_size) as f64;

    let bytes = match &style.font_path {
        Some(path) => Some(load_font(path).with_context(|| format!("failed to load {path:?}"))?),
        None => FONT_CANDIDATES
            .iter()
            .map(Path::new)
            .filter(|path| path.is_file())
            .find_map(|path| load_font(path).ok()),
    };

    let Some(bytes) = bytes else {
        log::warn!("no font found, drawing figures without text");
        return Ok(Text {
            enabled: false,
            size,
        });
    };

    register_font(FONT_FAMILY, FontStyle::Normal, bytes)
        .map_err(|_| anyhow!("failed to register font"))?;

    Ok(Text {
        enabled: true,
        size,
    })
}

fn load_font(path: &Path) -> Result<&'static [u8]> {
    let mut cache = FONT_CACHE
        .lock()
        .map_err(|_| anyhow!("font cache is poisoned"))?;
    if let Some(&bytes) = cache.get(path) {
        return Ok(bytes);
    }

    let bytes = fs::read(path).with_context(|| format!("failed to read {path:?}"))?;
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    cache.insert(path.to_path_buf(), bytes);
    Ok(bytes)
}

/// Draw into a temporary sibling of `path` and move it into place.
///
/// On failure the temporary file is removed and `path` is left untouched.
pub(crate) fn write_atomically<F>(path: &Path, draw: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .context("file name is not valid UTF-8")?;
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("png");
    let tmp_path = path.with_file_name(format!(".{stem}.partial.{ext}"));

    let result = draw(&tmp_path).and_then(|()| {
        fs::rename(&tmp_path, path).with_context(|| format!("failed to move figure to {path:?}"))
    });
    if result.is_err() {
        fs::remove_file(&tmp_path).ok();
    }
    result
}

/// Linear axis range covering the finite values, padded by 5%.
pub(crate) fn linear_range<'a, I>(vals: I) -> Range<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let (min, max) = finite_bounds(vals.into_iter().copied());
    if !min.is_finite() {
        return 0.0..1.0;
    }
    let span = max - min;
    let pad = if span > 0.0 {
        0.05 * span
    } else {
        0.5 * min.abs().max(1.0)
    };
    (min - pad)..(max + pad)
}

/// Logarithmic axis range covering the positive finite values.
pub(crate) fn log_range<'a, I>(vals: I) -> Range<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let (min, max) = finite_bounds(vals.into_iter().copied().filter(|&val| val > 0.0));
    if !min.is_finite() {
        return 0.1..10.0;
    }
    if max > min {
        let pad = (max / min).powf(0.05);
        (min / pad)..(max * pad)
    } else {
        (min / 10.0)..(max * 10.0)
    }
}

/// `n + 1` evenly spaced positions covering `range`.
pub(crate) fn linear_ticks(range: &Range<f64>, n: usize) -> Vec<f64> {
    let step = (range.end - range.start) / n.max(1) as f64;
    (0..=n).map(|i| range.start + i as f64 * step).collect()
}

/// Powers of ten inside a positive `range`.
pub(crate) fn decade_ticks(range: &Range<f64>) -> Vec<f64> {
    if !(range.start > 0.0 && range.end > range.start) {
        return Vec::new();
    }
    let first = range.start.log10().ceil() as i32;
    let last = range.end.log10().floor() as i32;
    (first..=last).map(|exp| 10f64.powi(exp)).collect()
}

/// Grid lines through the ticks, each spanning the other axis.
pub(crate) fn grid_segments(
    x_ticks: &[f64],
    y_ticks: &[f64],
    x_range: &Range<f64>,
    y_range: &Range<f64>,
) -> Vec<[(f64, f64); 2]> {
    let vertical = x_ticks
        .iter()
        .map(|&x| [(x, y_range.start), (x, y_range.end)]);
    let horizontal = y_ticks
        .iter()
        .map(|&y| [(x_range.start, y), (x_range.end, y)]);
    vertical.chain(horizontal).collect()
}

fn finite_bounds<I: Iterator<Item = f64>>(vals: I) -> (f64, f64) {
    vals.filter(|val| val.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), val| {
            (min.min(val), max.max(val))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_ignore_non_finite_values() {
        let vals = [1.0, f64::NAN, 3.0, f64::INFINITY];
        let range = linear_range(&vals);
        assert!(range.start < 1.0 && range.end > 3.0);
        assert_eq!(linear_range(&[f64::NAN]), 0.0..1.0);

        let range = log_range(&[-1.0, 0.0, 1e-3, 1e2]);
        assert!(range.start < 1e-3 && range.start > 0.0 && range.end > 1e2);
        assert_eq!(log_range(&[0.0]), 0.1..10.0);
    }

    #[test]
    fn grid_ticks_cover_ranges() {
        assert_eq!(linear_ticks(&(0.0..10.0), 5), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(decade_ticks(&(0.5..2e3)), vec![1.0, 10.0, 100.0, 1000.0]);
        assert!(decade_ticks(&(2.0..5.0)).is_empty());
        assert!(decade_ticks(&(0.0..5.0)).is_empty());

        let segments = grid_segments(&[1.0], &[10.0, 100.0], &(0.0..2.0), &(1.0..1e3));
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], [(1.0, 1.0), (1.0, 1e3)]);
        assert_eq!(segments[2], [(0.0, 100.0), (2.0, 100.0)]);
    }

    #[test]
    fn output_dir_blocked_by_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("gs2post-blocked-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("outputs");
        fs::write(&blocker, b"not a directory").unwrap();

        let opts = RenderOptions::new(&blocker);
        assert!(opts.output_path("figure.png").is_err());

        let ds = crate::dataset::Dataset::new();
        assert!(modes::plot_fields_by_mode(&ds, &opts).is_err());
        assert_eq!(fs::read(&blocker).unwrap(), b"not a directory");
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn output_path_creates_directory() {
        let dir = std::env::temp_dir().join(format!("gs2post-render-{}", std::process::id()));
        let opts = RenderOptions {
            filename: Some("custom".to_string()),
            ..RenderOptions::new(dir.join("nested"))
        };
        let path = opts.output_path("default.png").unwrap();
        assert_eq!(path, dir.join("nested").join("custom.png"));
        assert!(dir.join("nested").is_dir());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn failed_draw_leaves_nothing_behind() {
        let dir = std::env::temp_dir().join(format!("gs2post-atomic-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("figure.png");

        let result = write_atomically(&path, |tmp| {
            fs::write(tmp, b"partial")?;
            Err(anyhow!("drawing failed"))
        });
        assert!(result.is_err());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        write_atomically(&path, |tmp| Ok(fs::write(tmp, b"done")?)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"done");
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);

        fs::remove_dir_all(&dir).ok();
    }
}
