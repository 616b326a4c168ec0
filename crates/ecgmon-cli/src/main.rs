mod acquisition;
mod transport;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ecgmon_lib::{
    config::MonitorConfig,
    io::{write_export, write_recording, ExportPaths},
    query::LiveView,
    session::Monitor,
    summary::EventSummary,
};
use env_logger::Env;
use log::info;
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::acquisition::{
    log_transitions, spawn_acquisition, Clock, ReplaySource, SampleSource, SyntheticParams,
    SyntheticSource,
};

#[derive(Parser)]
#[command(
    name = "ecgmon",
    version,
    about = "Streaming ECG monitor: heart rate, rhythm features and cardiac event flags"
)]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Configuration file plus the overrides accepted on the command line.
#[derive(Args, Clone, Debug)]
struct MonitorArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Sample rate (Hz) for value-per-line recordings and the acquisition period
    #[arg(long)]
    fs: Option<f64>,
    /// Raw amplitude a sample must exceed to count as a peak
    #[arg(long)]
    threshold: Option<i64>,
    /// Intervals must be longer than this to count (seconds)
    #[arg(long)]
    min_rr_gap: Option<f64>,
}

impl MonitorArgs {
    fn load(&self) -> Result<MonitorConfig> {
        let mut cfg = match &self.config {
            Some(path) => MonitorConfig::load(path)?,
            None => MonitorConfig::default(),
        };
        if let Some(fs) = self.fs {
            cfg.sample_rate_hz = fs;
        }
        if let Some(threshold) = self.threshold {
            cfg.detector.amplitude_threshold = threshold;
        }
        if let Some(gap) = self.min_rr_gap {
            cfg.detector.min_rr_gap_s = gap;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recording through the monitor and print a JSON report
    Run {
        /// CSV recording (timestamp,value) or newline-delimited values
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        monitor: MonitorArgs,
        /// Write ecg_data_with_flags.csv, bpm_data.csv and summary.json here
        #[arg(long)]
        export_dir: Option<PathBuf>,
        /// Pace samples at the configured sample rate instead of replaying flat out
        #[arg(long)]
        realtime: bool,
    },
    /// Write a synthetic CSV recording
    Synth {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 30.0)]
        seconds: f64,
        #[arg(long, default_value_t = 75.0)]
        bpm: f64,
        #[arg(long, default_value_t = 250.0)]
        fs: f64,
        /// R-spike height above baseline
        #[arg(long, default_value_t = 20_000.0)]
        amplitude: f64,
        #[arg(long, default_value_t = 2_000.0)]
        baseline: f64,
        /// Half-width of uniform noise
        #[arg(long, default_value_t = 300.0)]
        noise: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Start of a flatline pause (seconds)
        #[arg(long)]
        pause_at: Option<f64>,
        #[arg(long, default_value_t = 5.0)]
        pause_s: f64,
    },
    /// Acquire in the background and answer JSON requests on stdin
    Serve {
        /// Replay this recording; a synthetic wall-clock source is used otherwise
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        monitor: MonitorArgs,
        /// Heart rate of the synthetic source
        #[arg(long, default_value_t = 75.0)]
        bpm: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        monitor: MonitorArgs,
    },
}

/// Outcome of a `run` replay.
#[derive(Debug, Serialize)]
struct RunReport {
    samples: usize,
    beats: usize,
    live: LiveView,
    summary: EventSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    export: Option<ExportPaths>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::Run {
            input,
            monitor,
            export_dir,
            realtime,
        } => cmd_run(&input, &monitor, export_dir.as_deref(), realtime)?,
        Commands::Synth {
            out,
            seconds,
            bpm,
            fs,
            amplitude,
            baseline,
            noise,
            seed,
            pause_at,
            pause_s,
        } => {
            let params = SyntheticParams {
                fs,
                bpm,
                amplitude,
                baseline,
                noise,
                pause: pause_at.map(|start| (start, pause_s)),
                duration_s: Some(seconds),
                ..SyntheticParams::default()
            };
            cmd_synth(&out, params, seed)?
        }
        Commands::Serve {
            input,
            monitor,
            bpm,
            seed,
        } => cmd_serve(input.as_deref(), &monitor, bpm, seed)?,
        Commands::Config { monitor } => {
            let cfg = monitor.load()?;
            print!("{}", cfg.to_toml_string()?);
        }
    }
    Ok(())
}

fn sample_period(cfg: &MonitorConfig) -> Duration {
    Duration::from_secs_f64(cfg.sample_period_s())
}

fn cmd_run(
    input: &Path,
    args: &MonitorArgs,
    export_dir: Option<&Path>,
    realtime: bool,
) -> Result<()> {
    let cfg = args.load()?;
    let mut source = ReplaySource::open(input, cfg.sample_rate_hz)?;
    let monitor = Monitor::new(cfg)?;

    let (samples, beats) = if realtime {
        let stats = spawn_acquisition(monitor.clone(), source, sample_period(monitor.config())).wait();
        (stats.samples, stats.beats)
    } else {
        let (mut samples, mut beats) = (0, 0);
        while let Some(sample) = source.next_sample() {
            let report = monitor.ingest_sample(sample);
            log_transitions(&report, sample.timestamp);
            samples += 1;
            beats += usize::from(report.bpm.is_some());
        }
        (samples, beats)
    };

    let export = export_dir
        .map(|dir| {
            let paths = write_export(dir, &monitor.export())?;
            info!("export written to {}", dir.display());
            Ok::<_, anyhow::Error>(paths)
        })
        .transpose()?;

    let report = RunReport {
        samples,
        beats,
        live: monitor.live(),
        summary: monitor.summary(),
        export,
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_synth(out: &Path, params: SyntheticParams, seed: u64) -> Result<()> {
    let mut source = SyntheticSource::new(params, Clock::Synthetic { start: 0.0 }, seed)?;
    let samples: Vec<_> = std::iter::from_fn(|| source.next_sample()).collect();
    write_recording(out, &samples)
        .with_context(|| format!("writing synthetic recording {}", out.display()))?;
    info!("wrote {} samples to {}", samples.len(), out.display());
    Ok(())
}

fn cmd_serve(input: Option<&Path>, args: &MonitorArgs, bpm: f64, seed: u64) -> Result<()> {
    let cfg = args.load()?;
    let monitor = Monitor::new(cfg)?;
    let period = sample_period(monitor.config());
    let handle = match input {
        Some(path) => {
            let source = ReplaySource::open(path, monitor.config().sample_rate_hz)?;
            spawn_acquisition(monitor.clone(), source, period)
        }
        None => {
            let params = SyntheticParams {
                fs: monitor.config().sample_rate_hz,
                bpm,
                ..SyntheticParams::default()
            };
            let source = SyntheticSource::new(params, Clock::Wall, seed)?;
            spawn_acquisition(monitor.clone(), source, period)
        }
    };
    let served = transport::run_stdio(&monitor);
    let stats = handle.stop();
    info!(
        "acquisition stopped: {} samples, {} beats",
        stats.samples, stats.beats
    );
    served
}
