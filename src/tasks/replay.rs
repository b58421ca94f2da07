// Seismograph: Capture Replay
//
// Captures are JSON lines, one motion event per line with an optional
// `t_ms` timestamp:
//
//   {"t_ms": 16.0, "acceleration": {"x": -4.1}}
//   {"t_ms": 32.0, "accelerationIncludingGravity": {"x": 6.3}}
//
// Blank lines and lines starting with `#` are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, ManualClock};
use crate::config::MOTION_EVENT_NAME;
use crate::detector::ShakeDetector;
use crate::events::{MotionEvent, ShakeEvent};
use crate::source::MotionBus;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_ms: Option<f64>,
    #[serde(flatten)]
    pub event: MotionEvent,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    /// Records that carried an X reading.
    pub samples: usize,
    /// Records without one.
    pub skipped: usize,
    pub shakes: Vec<ShakeEvent>,
}

pub fn read_capture(reader: impl BufRead) -> anyhow::Result<Vec<ReplayRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("reading capture line {}", line_no))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(trimmed)
            .with_context(|| format!("parsing capture line {}", line_no))?;
        records.push(record);
    }
    Ok(records)
}

pub fn load_capture(path: &Path) -> anyhow::Result<Vec<ReplayRecord>> {
    let file = File::open(path).with_context(|| format!("opening capture {}", path.display()))?;
    read_capture(BufReader::new(file)).with_context(|| format!("loading capture {}", path.display()))
}

/// Feed records straight into `detector`, moving `clock` to each record's
/// timestamp first.  Records without a timestamp, or with one earlier than
/// the clock, reuse the current time.
pub fn replay_virtual(
    records: &[ReplayRecord],
    detector: &mut ShakeDetector<ManualClock>,
    clock: &ManualClock,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();

    for record in records {
        if let Some(t_ms) = record.t_ms {
            if t_ms >= clock.now_ms() {
                clock.set(t_ms);
            } else {
                log::warn!("Capture timestamp {} ms goes backwards, holding {} ms", t_ms, clock.now_ms());
            }
        }

        if record.event.sample_x().is_none() {
            summary.skipped += 1;
            continue;
        }
        summary.samples += 1;
        if detector.process_event(&record.event) {
            summary.shakes.extend(detector.last_shake());
        }
    }

    log::info!(
        "Replayed {} sample(s), skipped {}, {} shake(s)",
        summary.samples,
        summary.skipped,
        summary.shakes.len()
    );
    summary
}

/// Dispatch records on `bus` in real time, scaled by `speed` (2.0 = twice as
/// fast).  Returns how many records were dispatched.
pub fn replay_paced(records: &[ReplayRecord], bus: &MotionBus, speed: f64) -> anyhow::Result<usize> {
    if !(speed.is_finite() && speed > 0.0) {
        bail!("replay speed must be a positive number, got {}", speed);
    }

    let mut previous_t: Option<f64> = None;
    for record in records {
        if let (Some(prev), Some(t_ms)) = (previous_t, record.t_ms) {
            let wait_ms = (t_ms - prev).max(0.0) / speed;
            if wait_ms > 0.0 {
                thread::sleep(Duration::from_secs_f64(wait_ms / 1000.0));
            }
        }
        if record.t_ms.is_some() {
            previous_t = record.t_ms;
        }

        if bus.dispatch(MOTION_EVENT_NAME, record.event) == 0 {
            log::debug!("No `{}` listeners for replayed event", MOTION_EVENT_NAME);
        }
    }
    Ok(records.len())
}
