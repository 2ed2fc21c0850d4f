//! CAN Telemetry CLI Application
//!
//! Replays a text CAN capture through the can-telemetry library:
//! - Loads DBC catalogs and a JSON rule set
//! - Decodes every frame into the shared signal cache
//! - Evaluates the rules every N decoded frames
//! - Reports violations as they are raised and cleared

use anyhow::{Context, Result};
use can_telemetry::{Decoder, RuleSet, ValidationEngine, ViolationTracker};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod config;
mod log_reader;
mod report;

use config::{AppConfig, OutputFormat};
use log_reader::LogReader;
use report::Reporter;

/// CAN Telemetry - Decode and validate CAN captures
#[derive(Parser, Debug)]
#[command(name = "can-telemetry-cli")]
#[command(about = "Decode a CAN capture and check signals against a rule set", long_about = None)]
#[command(version)]
struct Args {
    /// Path to DBC file(s) (can be repeated)
    #[arg(long, value_name = "FILE")]
    dbc: Vec<PathBuf>,

    /// Path to the JSON rule set
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Path to the capture to replay
    #[arg(short, long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Evaluate the rules after every N decoded frames
    #[arg(long, value_name = "N")]
    evaluate_every: Option<usize>,

    /// Report signals not updated within this many milliseconds
    #[arg(long, value_name = "MS")]
    stale_ms: Option<u64>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print violations and the summary as JSON lines
    #[arg(long)]
    json: bool,

    /// Maximum number of frames to read (for testing)
    #[arg(long, value_name = "COUNT")]
    max_frames: Option<usize>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CAN Telemetry CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using can-telemetry library v{}", can_telemetry::VERSION);

    let config = merge_args(&args)?;
    config.validate()?;
    run(&config, args.max_frames)
}

/// Command line flags take precedence over the config file
fn merge_args(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if !args.dbc.is_empty() {
        config.input.dbc_files = args.dbc.clone();
    }
    if args.rules.is_some() {
        config.input.rules = args.rules.clone();
    }
    if args.log.is_some() {
        config.input.log = args.log.clone();
    }
    if let Some(n) = args.evaluate_every {
        config.monitoring.evaluate_every = n;
    }
    if args.stale_ms.is_some() {
        config.monitoring.default_stale_ms = args.stale_ms;
    }
    if args.json {
        config.output.format = OutputFormat::Json;
    }

    Ok(config)
}

fn run(config: &AppConfig, max_frames: Option<usize>) -> Result<()> {
    let decoder = Decoder::from_dbc_files(&config.input.dbc_files)
        .context("Failed to load DBC catalog")?
        .with_config(config.decoder.clone());

    let stats = decoder.database_stats();
    log::info!(
        "Catalog: {} messages, {} signals ({} reserved), {} rejected",
        stats.num_messages,
        stats.num_signals,
        stats.num_reserved,
        stats.num_rejected
    );

    let rules = match &config.input.rules {
        Some(path) => RuleSet::from_file(path)
            .with_context(|| format!("Failed to load rule set: {:?}", path))?,
        None => {
            log::warn!("No rule set given, decoding only");
            RuleSet::default()
        }
    };
    let unresolved = rules.resolve(decoder.catalog());
    log::info!(
        "Rule set: {} rules, {} unresolved",
        rules.len(),
        unresolved.len()
    );

    let mut engine = ValidationEngine::new(Arc::new(rules));
    if let Some(ms) = config.monitoring.default_stale_ms {
        engine = engine.with_default_period(Duration::from_millis(ms));
    }

    let log_path = match &config.input.log {
        Some(path) => path,
        None => {
            log::info!("No capture given, catalog and rule set loaded successfully");
            return Ok(());
        }
    };
    let file =
        File::open(log_path).with_context(|| format!("Failed to open capture: {:?}", log_path))?;
    let mut reader = LogReader::new(BufReader::new(file));

    let mut tracker = ViolationTracker::new();
    let mut reporter = Reporter::new(io::stdout().lock(), config.output.format);
    let evaluate_every = config.monitoring.evaluate_every;
    let mut since_tick = 0usize;
    let mut last_time = None;
    let mut frames_read = 0usize;

    for frame in reader.by_ref() {
        if max_frames.is_some_and(|max| frames_read >= max) {
            log::info!("Stopping after {} frames", frames_read);
            break;
        }
        let frame = frame?;
        frames_read += 1;

        match decoder.process_frame(&frame) {
            Ok(Some(_)) => since_tick += 1,
            Ok(None) => continue,
            // Already counted by the decoder; one bad frame must not stop the replay
            Err(_) => continue,
        }
        last_time = Some(frame.timestamp());

        if since_tick >= evaluate_every {
            since_tick = 0;
            let now = frame.timestamp();
            let violations = engine.evaluate(&decoder.cache().snapshot_at(now));
            reporter.transitions(now, &tracker.update(&violations))?;
        }
    }

    // Frames decoded after the last tick still count
    if since_tick > 0 {
        if let Some(now) = last_time {
            let violations = engine.evaluate(&decoder.cache().snapshot_at(now));
            reporter.transitions(now, &tracker.update(&violations))?;
        }
    }

    reporter.summary(
        stats,
        &decoder.frame_stats(),
        reader.malformed(),
        tracker.active(),
    )?;

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
