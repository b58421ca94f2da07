// Seismograph: Command-Line Entry Point
//
// Subcommands:
//   replay   Run a JSON-lines motion capture through a shake detector and
//            print one JSON line per detected shake on stdout.
//   config   Print the effective detector configuration as TOML.
//
// Detector options come from an optional TOML file, then from command-line
// flags, which take precedence.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use seismograph::config::{self, ShakeConfig, ShakeOptions};
use seismograph::logging;
use seismograph::tasks::replay::{self, ReplayRecord};
use seismograph::{ManualClock, MotionBus, ShakeDetector, ShakeEvent, ShakeRecorder};

#[derive(Debug, Parser)]
#[command(name = "seismograph")]
#[command(about = "Detect shake gestures in accelerometer captures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Replay(ReplayArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct DetectorArgs {
    /// TOML file with min_shake_count / min_amplitude / cooldown_ms.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, allow_negative_numbers = true)]
    min_shake_count: Option<i64>,
    #[arg(long, allow_negative_numbers = true)]
    min_amplitude: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    cooldown_ms: Option<f64>,
}

impl DetectorArgs {
    fn options(&self) -> Result<ShakeOptions> {
        let from_file = match &self.config {
            Some(path) => config::load_options(path)?,
            None => ShakeOptions::new(),
        };
        Ok(from_file.overridden_by(ShakeOptions {
            min_shake_count: self.min_shake_count,
            min_amplitude: self.min_amplitude,
            cooldown_ms: self.cooldown_ms,
            on_threshold_reached: None,
        }))
    }
}

#[derive(Debug, Args)]
struct ReplayArgs {
    /// JSON-lines motion capture.
    capture: PathBuf,
    #[command(flatten)]
    detector: DetectorArgs,
    /// Replay at capture pace through a running recorder instead of virtual time.
    #[arg(long)]
    realtime: bool,
    /// Playback speed multiplier for --realtime.
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(flatten)]
    detector: DetectorArgs,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------
fn main() -> Result<()> {
    logging::init()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay(args) => run_replay(args),
        Commands::Config(args) => run_config(args),
    }
}

fn run_replay(args: ReplayArgs) -> Result<()> {
    let options = args.detector.options()?;
    let records = replay::load_capture(&args.capture)?;
    log::info!("Loaded {} record(s) from {}", records.len(), args.capture.display());

    let shakes = if args.realtime {
        replay_realtime(&records, options, args.speed)?
    } else {
        replay_virtual(&records, options)
    };

    for shake in &shakes {
        println!("{}", serde_json::to_string(shake)?);
    }
    Ok(())
}

/// The detector is created at the capture's first timestamp, so its initial
/// cooldown covers the start of the capture.
fn replay_virtual(records: &[ReplayRecord], options: ShakeOptions) -> Vec<ShakeEvent> {
    let start_ms = records.iter().find_map(|r| r.t_ms).unwrap_or(0.0);
    let clock = ManualClock::new(start_ms);
    let mut detector = ShakeDetector::with_clock(options, clock.clone());
    replay::replay_virtual(records, &mut detector, &clock).shakes
}

fn replay_realtime(records: &[ReplayRecord], options: ShakeOptions, speed: f64) -> Result<Vec<ShakeEvent>> {
    let bus = Arc::new(MotionBus::new());
    let mut recorder = ShakeRecorder::new(Arc::clone(&bus), ShakeDetector::new(options));
    let shakes_rx = recorder.subscribe();

    recorder.start()?;
    let dispatched = replay::replay_paced(records, &bus, speed)?;
    recorder.stop()?;

    let shakes: Vec<ShakeEvent> = shakes_rx.try_iter().collect();
    log::info!("Dispatched {} event(s), {} shake(s)", dispatched, shakes.len());
    Ok(shakes)
}

fn run_config(args: ConfigArgs) -> Result<()> {
    let config = ShakeConfig::resolve(&args.detector.options()?);
    print!("{}", config.to_toml()?);
    Ok(())
}
