// Seismograph: Detector Configuration
//
// Built-in defaults, option coercion and TOML config loading.  Every option
// falls back to its default when it is absent, mistyped or not strictly
// positive, so building a configuration never fails.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::detector::ShakeAction;

// ---------------------------------------------------------------------------
// Detector defaults
// ---------------------------------------------------------------------------
pub const DEFAULT_MIN_SHAKE_COUNT: u32 = 3;
pub const DEFAULT_MIN_AMPLITUDE: f64 = 3.0;
pub const DEFAULT_COOLDOWN_MS: f64 = 1500.0;
pub const DEFAULT_SHAKE_MESSAGE: &str = "EAAAARTHQUAAAAKEEE!";

// ---------------------------------------------------------------------------
// Motion source / worker
// ---------------------------------------------------------------------------
pub const MOTION_EVENT_NAME: &str = "devicemotion";
pub const DETECTOR_THREAD_NAME: &str = "shake-detector";
pub const STACK_DETECTOR: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Config file keys
// ---------------------------------------------------------------------------
pub const KEY_MIN_SHAKE_COUNT: &str = "min_shake_count";
pub const KEY_MIN_AMPLITUDE: &str = "min_amplitude";
pub const KEY_COOLDOWN_MS: &str = "cooldown_ms";
const KNOWN_KEYS: [&str; 3] = [KEY_MIN_SHAKE_COUNT, KEY_MIN_AMPLITUDE, KEY_COOLDOWN_MS];

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Validated detector thresholds.  Fixed for the lifetime of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShakeConfig {
    /// Reversals that must be *exceeded* before a shake fires.
    pub min_shake_count: u32,
    pub min_amplitude: f64,
    pub cooldown_ms: f64,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            min_shake_count: DEFAULT_MIN_SHAKE_COUNT,
            min_amplitude: DEFAULT_MIN_AMPLITUDE,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
        }
    }
}

impl ShakeConfig {
    /// Apply the defaults to whatever the caller supplied.
    pub fn resolve(options: &ShakeOptions) -> Self {
        let min_shake_count = or_default(
            KEY_MIN_SHAKE_COUNT,
            options.min_shake_count,
            |n| n > 0 && n <= i64::from(u32::MAX),
            i64::from(DEFAULT_MIN_SHAKE_COUNT),
        ) as u32;
        let min_amplitude = or_default(
            KEY_MIN_AMPLITUDE,
            options.min_amplitude,
            |a| a > 0.0,
            DEFAULT_MIN_AMPLITUDE,
        );
        let cooldown_ms = or_default(
            KEY_COOLDOWN_MS,
            options.cooldown_ms,
            |ms| ms > 0.0,
            DEFAULT_COOLDOWN_MS,
        );

        Self {
            min_shake_count,
            min_amplitude,
            cooldown_ms,
        }
    }

    /// Render as a TOML document that [`parse_options`] reads back.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string(self).context("serialising shake config")
    }
}

fn or_default<T>(name: &str, supplied: Option<T>, accept: impl Fn(T) -> bool, default: T) -> T
where
    T: Copy + fmt::Debug,
{
    match supplied {
        Some(value) if accept(value) => value,
        Some(value) => {
            log::debug!("Option {} = {:?} rejected, using default {:?}", name, value, default);
            default
        }
        None => default,
    }
}

// ---------------------------------------------------------------------------
// Caller-supplied options
// ---------------------------------------------------------------------------

/// Loosely validated construction options.  `None` means "use the default".
#[derive(Debug, Default)]
pub struct ShakeOptions {
    pub min_shake_count: Option<i64>,
    pub min_amplitude: Option<f64>,
    pub cooldown_ms: Option<f64>,
    pub on_threshold_reached: Option<ShakeAction>,
}

impl ShakeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_shake_count(mut self, count: i64) -> Self {
        self.min_shake_count = Some(count);
        self
    }

    pub fn min_amplitude(mut self, amplitude: f64) -> Self {
        self.min_amplitude = Some(amplitude);
        self
    }

    pub fn cooldown_ms(mut self, cooldown_ms: f64) -> Self {
        self.cooldown_ms = Some(cooldown_ms);
        self
    }

    pub fn on_threshold_reached<F>(mut self, action: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on_threshold_reached = Some(ShakeAction::Custom(Box::new(action)));
        self
    }

    /// Build options from an untyped table (a parsed config file).  Entries of
    /// the wrong type are treated as absent; unknown keys are ignored.
    pub fn from_table(table: &toml::Table) -> Self {
        for key in table.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                log::warn!("Ignoring unknown config key `{}`", key);
            }
        }

        Self {
            min_shake_count: table
                .get(KEY_MIN_SHAKE_COUNT)
                .and_then(|v| integer_value(KEY_MIN_SHAKE_COUNT, v)),
            min_amplitude: table
                .get(KEY_MIN_AMPLITUDE)
                .and_then(|v| real_value(KEY_MIN_AMPLITUDE, v)),
            cooldown_ms: table
                .get(KEY_COOLDOWN_MS)
                .and_then(|v| real_value(KEY_COOLDOWN_MS, v)),
            on_threshold_reached: None,
        }
    }

    /// Values set in `overrides` win; the callback is kept from `self` unless
    /// `overrides` carries one.
    pub fn overridden_by(self, overrides: ShakeOptions) -> Self {
        Self {
            min_shake_count: overrides.min_shake_count.or(self.min_shake_count),
            min_amplitude: overrides.min_amplitude.or(self.min_amplitude),
            cooldown_ms: overrides.cooldown_ms.or(self.cooldown_ms),
            on_threshold_reached: overrides.on_threshold_reached.or(self.on_threshold_reached),
        }
    }
}

fn integer_value(key: &str, value: &toml::Value) -> Option<i64> {
    match value {
        toml::Value::Integer(n) => Some(*n),
        toml::Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
        other => {
            log::debug!("Config key `{}` is not a whole number ({}), ignoring", key, other);
            None
        }
    }
}

fn real_value(key: &str, value: &toml::Value) -> Option<f64> {
    match value {
        toml::Value::Integer(n) => Some(*n as f64),
        toml::Value::Float(f) => Some(*f),
        other => {
            log::debug!("Config key `{}` is not numeric ({}), ignoring", key, other);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Config files
// ---------------------------------------------------------------------------

pub fn parse_options(text: &str) -> anyhow::Result<ShakeOptions> {
    let table: toml::Table = text.parse().context("parsing TOML")?;
    Ok(ShakeOptions::from_table(&table))
}

pub fn load_options(path: &Path) -> anyhow::Result<ShakeOptions> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    parse_options(&text).with_context(|| format!("loading config file {}", path.display()))
}
