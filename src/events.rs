// Seismograph: Motion & Shake Events

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Motion events (input)
// ---------------------------------------------------------------------------

/// One accelerometer reading in m/s².  Axes a sensor did not report are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl Acceleration {
    pub fn x(x: f64) -> Self {
        Self {
            x: Some(x),
            ..Self::default()
        }
    }
}

/// A device-motion record as delivered by a motion source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionEvent {
    /// Linear acceleration with gravity removed, when the platform provides it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration: Option<Acceleration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_including_gravity: Option<Acceleration>,
}

impl MotionEvent {
    /// Event carrying only a linear X reading.
    pub fn linear(x: f64) -> Self {
        Self {
            acceleration: Some(Acceleration::x(x)),
            acceleration_including_gravity: None,
        }
    }

    /// Event carrying only a gravity-inclusive X reading.
    pub fn with_gravity(x: f64) -> Self {
        Self {
            acceleration: None,
            acceleration_including_gravity: Some(Acceleration::x(x)),
        }
    }

    /// The scalar fed to the detector: `acceleration.x`, falling back to
    /// `accelerationIncludingGravity.x` when the former is missing.
    pub fn sample_x(&self) -> Option<f64> {
        self.acceleration
            .and_then(|a| a.x)
            .or_else(|| self.acceleration_including_gravity.and_then(|a| a.x))
    }
}

// ---------------------------------------------------------------------------
// Shake events (output)
// ---------------------------------------------------------------------------

/// Published to subscribers each time the detector fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShakeEvent {
    /// Detector clock time of the firing.
    pub timestamp_ms: f64,
    /// Qualifying reversals counted for this firing.
    pub reversals: u32,
}
