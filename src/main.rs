//! CLI entry point for mccdaq
//!
//! Provides commands for:
//! - Listing attached DAQ devices
//! - One-shot timed acquisition with CSV export
//! - Manual position sweeps (one acquisition and one CSV per position)
//!
//! # Usage
//!
//! ```bash
//! mccdaq list
//! mccdaq acquire --rate 1000 --duration 2 --channel 0=coil --channel 1=probe
//! mccdaq acquire --config config/daq.toml
//! mccdaq sweep --config config/daq.toml --start 0 --end 10 --step 2
//! ```
//!
//! Boards are simulated by the mock driver.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use mccdaq::data::{generate_file_name, CsvExporter};
use mccdaq::hardware::mock::{MockBoardSpec, MockDriver};
use mccdaq::logging::{self, TracingConfig};
use mccdaq::{AcquisitionSession, BoardDriver, DaqConfig};

#[derive(Parser)]
#[command(name = "mccdaq")]
#[command(about = "Continuous multi-channel analog acquisition", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached DAQ devices
    List {
        /// Print the inventory as JSON
        #[arg(long)]
        json: bool,

        /// Seed for the simulated boards
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Acquire for a fixed duration and export CSV
    Acquire(RunArgs),

    /// Acquire once per manually set position
    Sweep {
        /// First position
        #[arg(long)]
        start: f64,

        /// Last position (inclusive)
        #[arg(long)]
        end: f64,

        /// Distance between positions
        #[arg(long, default_value = "1.0")]
        step: f64,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Configuration file (TOML); command-line values override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Board number
    #[arg(long, conflicts_with = "device")]
    board: Option<u32>,

    /// Product name to look up, e.g. E-1608-394C95
    #[arg(long)]
    device: Option<String>,

    /// Channel as INDEX=NAME, repeatable
    #[arg(long = "channel", value_parser = parse_channel)]
    channels: Vec<(u32, String)>,

    /// Sampling rate in Hz
    #[arg(long)]
    rate: Option<f64>,

    /// Acquisition length in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Output directory for CSV files
    #[arg(long)]
    output: Option<PathBuf>,

    /// Keep every n-th row on export
    #[arg(long)]
    downsample: Option<usize>,

    /// Seed for the simulated boards
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List { json, seed } => {
            logging::init(TracingConfig::default())?;
            list_devices(&mock_driver(seed), json)
        }
        Commands::Acquire(args) => {
            let config = build_config(&args)?;
            logging::init_from_config(&config)?;
            acquire(&config, args.seed).await
        }
        Commands::Sweep {
            start,
            end,
            step,
            run,
        } => {
            let config = build_config(&run)?;
            logging::init_from_config(&config)?;
            sweep(&config, run.seed, &positions(start, end, step)?).await
        }
    }
}

fn mock_driver(seed: Option<u64>) -> MockDriver {
    let builder = MockDriver::builder().board(MockBoardSpec::e1608(0));
    match seed {
        Some(seed) => builder.seed(seed).build(),
        None => builder.build(),
    }
}

fn list_devices(driver: &dyn BoardDriver, json: bool) -> Result<()> {
    let devices = driver.inventory()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No DAQ devices detected.");
        return Ok(());
    }
    println!("Found {} DAQ device(s):", devices.len());
    for device in devices {
        println!("  [{}] {}", device.board_id, device);
    }
    Ok(())
}

async fn acquire(config: &DaqConfig, seed: Option<u64>) -> Result<()> {
    let mut session = AcquisitionSession::from_config(config, Arc::new(mock_driver(seed)))?;

    let interrupted = run_for(&mut session, config.duration()).await?;
    if interrupted {
        warn!("Acquisition interrupted");
    }

    let path = generate_file_name(&config.storage.output_dir)?;
    export(config, &session, &path, None)?;
    Ok(())
}

async fn sweep(config: &DaqConfig, seed: Option<u64>, positions: &[f64]) -> Result<()> {
    let mut session = AcquisitionSession::from_config(config, Arc::new(mock_driver(seed)))?;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    for (i, &position) in positions.iter().enumerate() {
        println!(
            "[{}/{}] Move to position {position} and press Enter",
            i + 1,
            positions.len()
        );
        tokio::select! {
            line = stdin.next_line() => {
                if line?.is_none() {
                    bail!("stdin closed before sweep finished");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(position, "Sweep cancelled");
                return Ok(());
            }
        }

        if run_for(&mut session, config.duration()).await? {
            warn!(position, "Sweep cancelled during acquisition");
            return Ok(());
        }

        let path = position_file_name(&generate_file_name(&config.storage.output_dir)?, position);
        export(config, &session, &path, Some(position))?;
    }

    info!(positions = positions.len(), "Sweep complete");
    Ok(())
}

/// Run one acquisition. Returns true if cut short by Ctrl+C.
async fn run_for(session: &mut AcquisitionSession, duration: Duration) -> Result<bool> {
    session.start()?;
    let interrupted = tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    session.stop()?;

    let stats = session.stats();
    println!(
        "Acquired {} rows from board {} ({} channels)",
        stats.rows,
        session.board_id(),
        session.channels().len()
    );
    if let Some(fault) = session.fault() {
        warn!(%fault, "Sampling ended early");
    }
    if stats.overruns > 0 {
        warn!(missed = stats.overruns, "Rate too high, some samples were missed");
    }
    Ok(interrupted)
}

fn export(
    config: &DaqConfig,
    session: &AcquisitionSession,
    path: &Path,
    position: Option<f64>,
) -> Result<()> {
    let names: Vec<&str> = session.channels().values().map(String::as_str).collect();
    let mut exporter = CsvExporter::new(path)
        .with_setting("board", session.board_id())
        .with_setting("sample_rate_hz", config.board.sample_rate_hz)
        .with_setting("duration_secs", config.board.duration_secs)
        .with_setting("channels", names.join(" "))
        .with_downsample(config.storage.downsample);
    if let Some(position) = position {
        exporter = exporter.with_setting("position", position);
    }

    let rows = exporter
        .write(&session.snapshot())
        .with_context(|| format!("saving {}", path.display()))?;
    println!("Saved {rows} rows to {}", path.display());
    Ok(())
}

fn build_config(args: &RunArgs) -> Result<DaqConfig> {
    let mut config = match &args.config {
        Some(path) => DaqConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let rate = args
                .rate
                .ok_or_else(|| anyhow!("--rate is required when no --config is given"))?;
            DaqConfig::new(0, rate)
        }
    };

    if let Some(board) = args.board {
        config.board.board_id = board;
        config.board.device_name = None;
    }
    if let Some(device) = &args.device {
        config.board.device_name = Some(device.clone());
    }
    if let Some(rate) = args.rate {
        config.board.sample_rate_hz = rate;
    }
    if let Some(duration) = args.duration {
        config.board.duration_secs = duration;
    }
    if let Some(output) = &args.output {
        config.storage.output_dir = output.clone();
    }
    if let Some(downsample) = args.downsample {
        config.storage.downsample = downsample;
    }
    if !args.channels.is_empty() {
        config.channels = args
            .channels
            .iter()
            .map(|(index, name)| (index.to_string(), name.clone()))
            .collect();
    } else if config.channels.is_empty() {
        config = config.with_channel(0, "ch0").with_channel(1, "ch1");
    }

    config.validate()?;
    Ok(config)
}

fn parse_channel(s: &str) -> Result<(u32, String), String> {
    let (index, name) = s
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=NAME, got '{s}'"))?;
    let index = index
        .trim()
        .parse()
        .map_err(|_| format!("'{index}' is not a channel number"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("channel {index} has no name"));
    }
    Ok((index, name.to_string()))
}

fn positions(start: f64, end: f64, step: f64) -> Result<Vec<f64>> {
    if !(step.is_finite() && step > 0.0) {
        bail!("--step must be greater than 0");
    }
    let span = end - start;
    let count = (span.abs() / step + 1e-9).floor() as usize;
    let direction = span.signum();
    Ok((0..=count)
        .map(|i| start + direction * step * i as f64)
        .collect())
}

fn position_file_name(path: &Path, position: f64) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());
    path.with_file_name(format!("{stem}_pos{position}.csv"))
}
