use crate::utils::check_num;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Plot style parameters.
///
/// Passed explicitly to every renderer, so a figure depends only on the
/// arguments of the call that draws it. Can be loaded from a TOML file, see
/// [`PlotStyle::from_file`]; missing keys take their default values.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotStyle {
    /// Resolution in dots per inch.
    pub dpi: u32,

    /// Size in inches of the time-trace figure.
    pub traces_size: (f64, f64),
    /// Size in inches of the mode-spectrum figure.
    pub modes_size: (f64, f64),
    /// Size in inches of the transfer figures.
    pub transfer_size: (f64, f64),

    /// Line width in points.
    pub line_width: f64,
    /// Font size of axis descriptions in points.
    pub font_size: f64,
    /// TrueType font used for text.
    ///
    /// If unset, a few common system locations are searched. Without a font
    /// the figures are drawn without text.
    pub font_path: Option<PathBuf>,

    /// Opacity of grid lines.
    pub grid_alpha: f64,
    /// Opacity of the saturated-region shading.
    pub shade_alpha: f64,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            dpi: 150,
            traces_size: (10.0, 5.0),
            modes_size: (14.0, 4.0),
            transfer_size: (10.0, 5.0),
            line_width: 1.5,
            font_size: 12.0,
            font_path: None,
            grid_alpha: 0.3,
            shade_alpha: 0.2,
        }
    }
}

impl PlotStyle {
    /// Load a [`PlotStyle`] from a TOML file and validate it.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let style: PlotStyle = toml::from_str(&contents).context("failed to deserialize style")?;

        style.validate().context("failed to validate style")?;

        Ok(style)
    }

    pub fn validate(&self) -> Result<()> {
        check_num(self.dpi, 10..=1200).context("invalid dpi")?;

        check_size(self.traces_size).context("invalid time-trace figure size")?;
        check_size(self.modes_size).context("invalid mode-spectrum figure size")?;
        check_size(self.transfer_size).context("invalid transfer figure size")?;

        check_num(self.line_width, 0.1..=20.0).context("invalid line width")?;
        check_num(self.font_size, 1.0..=72.0).context("invalid font size")?;

        check_num(self.grid_alpha, 0.0..=1.0).context("invalid grid opacity")?;
        check_num(self.shade_alpha, 0.0..=1.0).context("invalid shading opacity")?;

        Ok(())
    }

    /// Pixel dimensions of a figure of `size` inches.
    pub fn pixels(&self, size: (f64, f64)) -> (u32, u32) {
        let dpi = self.dpi as f64;
        ((size.0 * dpi).round() as u32, (size.1 * dpi).round() as u32)
    }

    /// Convert a length in points to pixels (at least one).
    pub fn points_to_pixels(&self, points: f64) -> u32 {
        ((points * self.dpi as f64 / 72.0).round() as u32).max(1)
    }
}

fn check_size(size: (f64, f64)) -> Result<()> {
    check_num(size.0, 1.0..=50.0).context("invalid width")?;
    check_num(size.1, 1.0..=50.0).context("invalid height")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_style_is_valid() {
        let style = PlotStyle::default();
        style.validate().unwrap();
        assert_eq!(style.pixels(style.traces_size), (1500, 750));
        assert_eq!(style.pixels(style.modes_size), (2100, 600));
        assert_eq!(style.points_to_pixels(style.line_width), 3);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let style: PlotStyle = toml::from_str("dpi = 100\ntraces_size = [8.0, 4.0]\n").unwrap();
        assert_eq!(style.dpi, 100);
        assert_eq!(style.traces_size, (8.0, 4.0));
        assert_eq!(style.modes_size, PlotStyle::default().modes_size);
        assert_eq!(style.pixels(style.traces_size), (800, 400));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let style = PlotStyle {
            shade_alpha: 1.5,
            ..PlotStyle::default()
        };
        assert!(style.validate().is_err());

        let style = PlotStyle {
            traces_size: (0.0, 5.0),
            ..PlotStyle::default()
        };
        assert!(style.validate().is_err());

        assert!(toml::from_str::<PlotStyle>("colour = \"red\"\n").is_err());
    }
}
