// Seismograph: Host Logger
//
// `log` backend for the CLI.  Human-readable lines go to stderr; when
// SEISMOGRAPH_LOG_JSON_PATH is set every record is also appended to that
// file as a JSON line.  SEISMOGRAPH_LOG selects the level (default `info`).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use log::{LevelFilter, Log, Metadata, Record};
use serde_json::json;

pub const ENV_LOG_LEVEL: &str = "SEISMOGRAPH_LOG";
pub const ENV_LOG_JSON_PATH: &str = "SEISMOGRAPH_LOG_JSON_PATH";

pub struct Logger {
    level: LevelFilter,
    json_file: Option<Mutex<File>>,
}

impl Logger {
    pub fn from_env() -> anyhow::Result<Self> {
        let level = match std::env::var(ENV_LOG_LEVEL) {
            Ok(value) => parse_level(&value)?,
            Err(_) => LevelFilter::Info,
        };
        let path = std::env::var(ENV_LOG_JSON_PATH).ok().map(PathBuf::from);
        Self::new(level, path.as_deref())
    }

    pub fn new(level: LevelFilter, json_path: Option<&Path>) -> anyhow::Result<Self> {
        let json_file = match json_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating log directory {}", parent.display()))?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                Some(Mutex::new(file))
            }
            None => None,
        };
        Ok(Self { level, json_file })
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    fn write_json(&self, record: &Record<'_>) {
        let Some(file) = &self.json_file else {
            return;
        };

        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let entry = json!({
            "ts_ms": ts_ms,
            "level": record.level().as_str(),
            "target": record.target(),
            "msg": record.args().to_string(),
        });

        if let Ok(mut file) = file.lock() {
            let _ = writeln!(file, "{}", entry);
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!("{:<5} {}: {}", record.level(), record.target(), record.args());
        self.write_json(record);
    }

    fn flush(&self) {
        if let Some(file) = &self.json_file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Install the environment-configured logger as the global `log` backend.
pub fn init() -> anyhow::Result<()> {
    let logger = Logger::from_env()?;
    let level = logger.level();
    log::set_boxed_logger(Box::new(logger)).context("installing logger")?;
    log::set_max_level(level);
    Ok(())
}

fn parse_level(value: &str) -> anyhow::Result<LevelFilter> {
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {} value `{}`", ENV_LOG_LEVEL, value))
}
