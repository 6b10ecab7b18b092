use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gs2post::{
    Dataset, Manager, PlotStyle, SaturationParams,
    manager::DEFAULT_AVG_WINDOW,
    render::{
        RenderOptions,
        modes::plot_fields_by_mode,
        traces::{TracesOptions, plot_fields_time_traces},
        transfer::{AveragedOptions, plot_transfer_by_theta, plot_transfer_by_theta_averaged},
    },
    saturation::detect_in_dataset,
    synth::{SynthParams, synthesize},
};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// Plot style file (TOML).
    #[arg(long, global = true)]
    style: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct SaturationArgs {
    /// Time span of the growth-rate finite difference.
    #[arg(long, default_value_t = 20.0)]
    window: f64,

    /// Growth rate below which the field is saturated.
    #[arg(long, default_value_t = 0.1)]
    threshold: f64,
}

#[derive(Debug, Args)]
struct PlotArgs {
    #[arg(long)]
    dataset: PathBuf,

    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,

    #[arg(long)]
    filename: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the saturation time of phi2.
    Saturation {
        #[arg(long)]
        dataset: PathBuf,

        #[command(flatten)]
        saturation: SaturationArgs,
    },

    /// Plot the field time traces.
    Traces {
        #[command(flatten)]
        plot: PlotArgs,

        #[command(flatten)]
        saturation: SaturationArgs,
    },

    /// Plot the field spectra by mode at the last time step.
    Modes {
        #[command(flatten)]
        plot: PlotArgs,
    },

    /// Plot the transfer profiles along theta at the last time step.
    Transfer {
        #[command(flatten)]
        plot: PlotArgs,
    },

    /// Plot the transfer profiles along theta averaged over a time window.
    TransferAveraged {
        #[command(flatten)]
        plot: PlotArgs,

        #[arg(long, default_value_t = DEFAULT_AVG_WINDOW)]
        window: f64,

        /// Start of the window [default: last time minus window].
        #[arg(long)]
        tstart: Option<f64>,
    },

    /// Draw every figure of each dataset matching a glob pattern.
    All {
        #[arg(long)]
        pattern: String,

        #[arg(long, default_value = "outputs")]
        output_dir: PathBuf,

        #[arg(long, default_value_t = DEFAULT_AVG_WINDOW)]
        avg_window: f64,

        #[command(flatten)]
        saturation: SaturationArgs,
    },

    /// Remove an output directory.
    Clean {
        #[arg(long, default_value = "outputs")]
        output_dir: PathBuf,
    },

    /// Write a synthetic dataset.
    Synthesize {
        #[arg(long)]
        output: PathBuf,

        /// Synthesis parameter file (TOML).
        #[arg(long)]
        params: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,
    },
}

impl SaturationArgs {
    fn params(&self) -> SaturationParams {
        SaturationParams {
            window: self.window,
            threshold: self.threshold,
        }
    }
}

impl PlotArgs {
    fn load(&self, style: PlotStyle) -> Result<(Dataset, RenderOptions)> {
        let ds = Dataset::from_file(&self.dataset)
            .with_context(|| format!("failed to load {:?}", self.dataset))?;
        let opts = RenderOptions {
            output_dir: self.output_dir.clone(),
            filename: self.filename.clone(),
            style,
        };
        Ok((ds, opts))
    }
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let style = match &args.style {
        Some(file) => PlotStyle::from_file(file).context("failed to load plot style")?,
        None => PlotStyle::default(),
    };

    match args.command {
        Command::Saturation {
            dataset,
            saturation,
        } => {
            let ds = Dataset::from_file(&dataset)
                .with_context(|| format!("failed to load {dataset:?}"))?;
            let saturation = detect_in_dataset(&ds, &saturation.params())?;
            println!("{saturation}");
        }
        Command::Traces { plot, saturation } => {
            let (ds, render) = plot.load(style)?;
            let opts = TracesOptions {
                render,
                saturation: saturation.params(),
            };
            plot_fields_time_traces(&ds, &opts)?;
        }
        Command::Modes { plot } => {
            let (ds, render) = plot.load(style)?;
            plot_fields_by_mode(&ds, &render)?;
        }
        Command::Transfer { plot } => {
            let (ds, render) = plot.load(style)?;
            plot_transfer_by_theta(&ds, &render)?;
        }
        Command::TransferAveraged {
            plot,
            window,
            tstart,
        } => {
            let (ds, render) = plot.load(style)?;
            let opts = AveragedOptions {
                render,
                window,
                tstart,
            };
            plot_transfer_by_theta_averaged(&ds, &opts)?;
        }
        Command::All {
            pattern,
            output_dir,
            avg_window,
            saturation,
        } => {
            let mgr = Manager::new(output_dir, style)
                .context("failed to construct mgr")?
                .with_saturation(saturation.params())
                .with_avg_window(avg_window);
            let count = mgr.process_pattern(&pattern)?;
            log::info!("processed {count} datasets");
        }
        Command::Clean { output_dir } => {
            let mgr = Manager::new(output_dir, style).context("failed to construct mgr")?;
            mgr.clean()?;
        }
        Command::Synthesize {
            output,
            params,
            seed,
        } => {
            let mut params = match params {
                Some(file) => SynthParams::from_file(file)?,
                None => SynthParams::default(),
            };
            if let Some(seed) = seed {
                params.seed = seed;
            }
            let ds = synthesize(&params).context("failed to synthesize dataset")?;
            ds.to_file(&output)
                .with_context(|| format!("failed to write {output:?}"))?;
            log::info!("wrote {output:?}");
        }
    }

    Ok(())
}
