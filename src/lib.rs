//! Shake-gesture detection over a stream of accelerometer samples.
//!
//! A [`ShakeDetector`] counts sign reversals of the X axis against a fixed
//! baseline sample and fires once enough of them arrive outside the cooldown
//! window.  [`ShakeRecorder`] attaches a detector to any [`MotionSource`].

pub mod clock;
pub mod config;
pub mod detector;
pub mod events;
pub mod logging;
pub mod source;
pub mod tasks;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ShakeConfig, ShakeOptions};
pub use detector::{DetectorPhase, ShakeAction, ShakeDetector};
pub use events::{Acceleration, MotionEvent, ShakeEvent};
pub use source::{ListenerId, MotionBus, MotionSource};
pub use tasks::recorder::ShakeRecorder;
pub use tasks::replay::{ReplayRecord, ReplaySummary};
