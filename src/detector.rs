// Seismograph: Shake Detector
//
// Counts sign reversals of a scalar acceleration signal.  A reversal is a
// sample whose sign differs from the baseline sample and whose magnitude
// reaches `min_amplitude`.  Once more than `min_shake_count` reversals have
// been seen the detector fires, resets its count and ignores every sample for
// `cooldown_ms`.
//
// The baseline is the first non-NaN sample received and is never replaced,
// so every later sample is compared against it rather than its predecessor.
// NaN and infinite samples never count as reversals.

use std::cmp::Ordering;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::clock::{Clock, SystemClock};
use crate::config::{ShakeConfig, ShakeOptions, DEFAULT_SHAKE_MESSAGE};
use crate::events::{MotionEvent, ShakeEvent};

// ---------------------------------------------------------------------------
// Threshold action
// ---------------------------------------------------------------------------

/// What to run when the shake threshold is reached.
#[derive(Default)]
pub enum ShakeAction {
    /// Logs and returns [`DEFAULT_SHAKE_MESSAGE`].
    #[default]
    Sentinel,
    Custom(Box<dyn FnMut() + Send>),
}

impl ShakeAction {
    /// Run the action.  Only the sentinel produces a value.
    pub fn invoke(&mut self) -> Option<&'static str> {
        match self {
            Self::Sentinel => {
                log::info!("{}", DEFAULT_SHAKE_MESSAGE);
                Some(DEFAULT_SHAKE_MESSAGE)
            }
            Self::Custom(action) => {
                action();
                None
            }
        }
    }
}

impl fmt::Debug for ShakeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sentinel => f.write_str("Sentinel"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Derived from the time since the last firing; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    Cooling,
    Accumulating,
}

/// Not internally synchronised: deliver samples from one thread at a time.
pub struct ShakeDetector<C: Clock = SystemClock> {
    config: ShakeConfig,
    clock: C,
    current_shake_count: u32,
    last_shake_ms: f64,
    previous_sample: Option<f64>,
    last_shake: Option<ShakeEvent>,
    on_threshold_reached: ShakeAction,
    subscribers: Vec<Sender<ShakeEvent>>,
}

impl ShakeDetector<SystemClock> {
    pub fn new(options: ShakeOptions) -> Self {
        Self::with_clock(options, SystemClock::new())
    }
}

impl Default for ShakeDetector<SystemClock> {
    fn default() -> Self {
        Self::new(ShakeOptions::default())
    }
}

impl<C: Clock> ShakeDetector<C> {
    pub fn with_clock(mut options: ShakeOptions, clock: C) -> Self {
        let config = ShakeConfig::resolve(&options);
        let last_shake_ms = clock.now_ms();
        log::debug!(
            "Shake detector ready (count > {}, amplitude >= {}, cooldown {} ms)",
            config.min_shake_count,
            config.min_amplitude,
            config.cooldown_ms
        );

        Self {
            config,
            clock,
            current_shake_count: 0,
            last_shake_ms,
            previous_sample: None,
            last_shake: None,
            on_threshold_reached: options.on_threshold_reached.take().unwrap_or_default(),
            subscribers: Vec::new(),
        }
    }

    /// Feed one acceleration sample.  Returns `true` only on the call that
    /// fires a shake.
    pub fn process_sample(&mut self, x: f64) -> bool {
        if self.previous_sample.is_none() && !x.is_nan() {
            self.previous_sample = Some(x);
        }

        let now = self.clock.now_ms();
        if self.in_cooldown(now) {
            return false;
        }

        if !self.is_reversal(x) {
            return false;
        }
        self.current_shake_count += 1;
        log::debug!("Reversal {} at {:.1} ms (x = {})", self.current_shake_count, now, x);

        if self.current_shake_count > self.config.min_shake_count {
            self.fire(now);
            return true;
        }
        false
    }

    /// Extract the X reading from a motion event and process it.  Events
    /// without a usable reading are ignored.
    pub fn process_event(&mut self, event: &MotionEvent) -> bool {
        match event.sample_x() {
            Some(x) => self.process_sample(x),
            None => {
                log::debug!("Motion event without an X reading, skipping");
                false
            }
        }
    }

    /// Register an observer.  Each firing sends one [`ShakeEvent`]; dropping
    /// the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<ShakeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Live observers, counted as of the last firing.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn phase(&self) -> DetectorPhase {
        if self.in_cooldown(self.clock.now_ms()) {
            DetectorPhase::Cooling
        } else {
            DetectorPhase::Accumulating
        }
    }

    pub fn config(&self) -> &ShakeConfig {
        &self.config
    }

    pub fn min_shake_count(&self) -> u32 {
        self.config.min_shake_count
    }

    pub fn min_amplitude(&self) -> f64 {
        self.config.min_amplitude
    }

    pub fn cooldown_ms(&self) -> f64 {
        self.config.cooldown_ms
    }

    pub fn current_shake_count(&self) -> u32 {
        self.current_shake_count
    }

    pub fn last_shake_ms(&self) -> f64 {
        self.last_shake_ms
    }

    pub fn previous_sample(&self) -> Option<f64> {
        self.previous_sample
    }

    /// The most recent firing, if any.
    pub fn last_shake(&self) -> Option<ShakeEvent> {
        self.last_shake
    }

    pub fn on_threshold_reached_mut(&mut self) -> &mut ShakeAction {
        &mut self.on_threshold_reached
    }

    fn in_cooldown(&self, now: f64) -> bool {
        now - self.last_shake_ms < self.config.cooldown_ms
    }

    fn is_reversal(&self, x: f64) -> bool {
        let Some(baseline) = self.previous_sample else {
            return false;
        };
        x.is_finite() && sign(x) != sign(baseline) && x.abs() >= self.config.min_amplitude
    }

    fn fire(&mut self, now: f64) {
        let event = ShakeEvent {
            timestamp_ms: now,
            reversals: self.current_shake_count,
        };
        self.current_shake_count = 0;
        self.last_shake_ms = now;
        self.last_shake = Some(event);
        log::info!("Shake detected at {:.1} ms ({} reversals)", now, event.reversals);

        self.on_threshold_reached.invoke();
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }
}

impl<C: Clock> fmt::Debug for ShakeDetector<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShakeDetector")
            .field("config", &self.config)
            .field("current_shake_count", &self.current_shake_count)
            .field("last_shake_ms", &self.last_shake_ms)
            .field("previous_sample", &self.previous_sample)
            .field("last_shake", &self.last_shake)
            .field("on_threshold_reached", &self.on_threshold_reached)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// `None` for NaN.  Both zeroes compare equal.
fn sign(v: f64) -> Option<Ordering> {
    v.partial_cmp(&0.0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{DEFAULT_COOLDOWN_MS, DEFAULT_MIN_AMPLITUDE, DEFAULT_MIN_SHAKE_COUNT};

    fn detector(options: ShakeOptions) -> (ShakeDetector<ManualClock>, ManualClock) {
        let clock = ManualClock::new(0.0);
        (ShakeDetector::with_clock(options, clock.clone()), clock)
    }

    fn counting(options: ShakeOptions) -> (ShakeDetector<ManualClock>, ManualClock, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let (det, clock) = detector(options.on_threshold_reached(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        }));
        (det, clock, fired)
    }

    #[test]
    fn default_construction() {
        let mut det: ShakeDetector = ShakeDetector::default();
        assert_eq!(det.min_shake_count(), 3);
        assert_eq!(det.cooldown_ms(), 1500.0);
        assert_eq!(det.min_amplitude(), 3.0);
        assert_eq!(det.current_shake_count(), 0);
        assert_eq!(det.previous_sample(), None);
        assert_eq!(det.on_threshold_reached_mut().invoke(), Some("EAAAARTHQUAAAAKEEE!"));
    }

    #[test]
    fn custom_action_replaces_sentinel() {
        let (mut det, _clock, fired) = counting(ShakeOptions::new());
        assert_eq!(det.on_threshold_reached_mut().invoke(), None);
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn invalid_options_use_defaults() {
        let (det, _clock) = detector(
            ShakeOptions::new()
                .min_shake_count(0)
                .min_amplitude(-1.0)
                .cooldown_ms(0.0),
        );
        assert_eq!(det.min_shake_count(), DEFAULT_MIN_SHAKE_COUNT);
        assert_eq!(det.min_amplitude(), DEFAULT_MIN_AMPLITUDE);
        assert_eq!(det.cooldown_ms(), DEFAULT_COOLDOWN_MS);
    }

    #[test]
    fn starts_cooling_from_construction_time() {
        let clock = ManualClock::new(250.0);
        let det = ShakeDetector::with_clock(ShakeOptions::new(), clock.clone());
        assert_eq!(det.last_shake_ms(), 250.0);
        assert_eq!(det.phase(), DetectorPhase::Cooling);

        clock.advance(DEFAULT_COOLDOWN_MS);
        assert_eq!(det.phase(), DetectorPhase::Accumulating);
    }

    #[test]
    fn samples_inside_cooldown_are_ignored() {
        let (mut det, clock) = detector(ShakeOptions::new());
        clock.set(10.0);

        assert!(!det.process_sample(-5.0));
        assert!(!det.process_sample(5.0));
        assert!(!det.process_sample(-5.0));
        assert_eq!(det.current_shake_count(), 0);
        // The baseline is still captured while cooling.
        assert_eq!(det.previous_sample(), Some(-5.0));
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let (mut det, clock) = detector(ShakeOptions::new());
        det.process_sample(-5.0);

        clock.set(DEFAULT_COOLDOWN_MS - 1.0);
        assert!(!det.process_sample(5.0));
        assert_eq!(det.current_shake_count(), 0);

        clock.set(DEFAULT_COOLDOWN_MS);
        assert!(!det.process_sample(5.0));
        assert_eq!(det.current_shake_count(), 1);
    }

    #[test]
    fn opposite_sign_with_enough_amplitude_is_a_reversal() {
        let (mut det, clock) = detector(ShakeOptions::new().min_amplitude(3.0));
        clock.set(DEFAULT_COOLDOWN_MS);

        assert!(!det.process_sample(-5.0));
        assert_eq!(det.current_shake_count(), 0);

        assert!(!det.process_sample(5.0));
        assert_eq!(det.current_shake_count(), 1);

        // Below the amplitude floor.
        assert!(!det.process_sample(1.0));
        assert_eq!(det.current_shake_count(), 1);

        // Exactly at the floor counts.
        assert!(!det.process_sample(3.0));
        assert_eq!(det.current_shake_count(), 2);
    }

    #[test]
    fn same_sign_is_not_a_reversal() {
        let (mut det, clock) = detector(ShakeOptions::new());
        clock.set(DEFAULT_COOLDOWN_MS);

        det.process_sample(5.0);
        assert!(!det.process_sample(5.0));
        assert!(!det.process_sample(50.0));
        assert_eq!(det.current_shake_count(), 0);
    }

    #[test]
    fn fires_only_after_count_exceeds_threshold() {
        let (mut det, clock, fired) = counting(ShakeOptions::new().min_shake_count(3));
        clock.set(DEFAULT_COOLDOWN_MS);
        det.process_sample(-5.0);

        for expected in 1..=3 {
            assert!(!det.process_sample(5.0));
            assert_eq!(det.current_shake_count(), expected);
        }
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);

        assert!(det.process_sample(5.0));
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(det.current_shake_count(), 0);
    }

    #[test]
    fn firing_restarts_the_cooldown() {
        let (mut det, clock, fired) = counting(ShakeOptions::new().min_shake_count(1));
        clock.set(2_000.0);
        det.process_sample(-5.0);
        det.process_sample(5.0);
        assert!(det.process_sample(5.0));
        assert_eq!(det.last_shake_ms(), 2_000.0);
        assert_eq!(det.phase(), DetectorPhase::Cooling);

        clock.advance(1.0);
        assert!(!det.process_sample(5.0));
        assert_eq!(det.current_shake_count(), 0);

        clock.advance(DEFAULT_COOLDOWN_MS);
        assert!(!det.process_sample(5.0));
        assert!(det.process_sample(5.0));
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(det.last_shake_ms(), 2_000.0 + 1.0 + DEFAULT_COOLDOWN_MS);
    }

    #[test]
    fn baseline_is_captured_once() {
        let (mut det, clock) = detector(ShakeOptions::new());
        clock.set(DEFAULT_COOLDOWN_MS);

        det.process_sample(10.0);
        det.process_sample(20.0);
        assert_eq!(det.previous_sample(), Some(10.0));

        // Every negative sample is compared against 10, not its predecessor.
        det.process_sample(-5.0);
        det.process_sample(-5.0);
        assert_eq!(det.current_shake_count(), 2);
        assert_eq!(det.previous_sample(), Some(10.0));
    }

    #[test]
    fn alternating_samples_only_count_against_the_baseline() {
        // minShakeCount 1 / amplitude 3 / cooldown 0 (coerced to the default).
        let (mut det, clock, fired) = counting(
            ShakeOptions::new()
                .min_shake_count(1)
                .min_amplitude(3.0)
                .cooldown_ms(0.0),
        );
        assert_eq!(det.cooldown_ms(), DEFAULT_COOLDOWN_MS);

        let at_start: Vec<bool> = [-5.0, 5.0, -5.0].iter().map(|&x| det.process_sample(x)).collect();
        assert_eq!(at_start, [false, false, false]);

        clock.set(DEFAULT_COOLDOWN_MS);
        let alternating: Vec<bool> = [5.0, -5.0].iter().map(|&x| det.process_sample(x)).collect();
        assert_eq!(alternating, [false, false]);
        assert_eq!(det.current_shake_count(), 1);

        assert!(det.process_sample(5.0));
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn nan_samples_never_qualify() {
        let (mut det, clock) = detector(ShakeOptions::new());
        clock.set(DEFAULT_COOLDOWN_MS);
        det.process_sample(-5.0);

        assert!(!det.process_sample(f64::NAN));
        assert_eq!(det.current_shake_count(), 0);
    }

    #[test]
    fn infinite_samples_never_qualify() {
        let (mut det, clock) = detector(ShakeOptions::new().min_shake_count(1));
        clock.set(DEFAULT_COOLDOWN_MS);
        det.process_sample(-5.0);

        assert!(!det.process_sample(f64::INFINITY));
        assert!(!det.process_sample(f64::INFINITY));
        assert!(!det.process_sample(f64::NEG_INFINITY));
        assert_eq!(det.current_shake_count(), 0);

        assert!(!det.process_sample(5.0));
        assert_eq!(det.current_shake_count(), 1);
    }

    #[test]
    fn nan_is_never_taken_as_the_baseline() {
        let (mut det, clock) = detector(ShakeOptions::new());
        clock.set(DEFAULT_COOLDOWN_MS);

        assert!(!det.process_sample(f64::NAN));
        assert_eq!(det.previous_sample(), None);

        // A stationary device reporting gravity stays quiet.
        let steady: Vec<bool> = (0..4).map(|_| det.process_sample(9.8)).collect();
        assert_eq!(steady, [false; 4]);
        assert_eq!(det.previous_sample(), Some(9.8));
        assert_eq!(det.current_shake_count(), 0);

        assert!(!det.process_sample(f64::NAN));
        assert_eq!(det.previous_sample(), Some(9.8));
        assert!(!det.process_sample(-4.0));
        assert_eq!(det.current_shake_count(), 1);
    }

    #[test]
    fn signed_zeroes_share_a_sign() {
        let (mut det, clock) = detector(ShakeOptions::new().min_amplitude(0.5));
        clock.set(DEFAULT_COOLDOWN_MS);
        det.process_sample(0.0);

        assert!(!det.process_sample(-0.0));
        assert_eq!(det.current_shake_count(), 0);
        assert!(!det.process_sample(-1.0));
        assert_eq!(det.current_shake_count(), 1);
    }

    #[test]
    fn subscribers_receive_each_firing() {
        let (mut det, clock) = detector(ShakeOptions::new().min_shake_count(1));
        let first = det.subscribe();
        let second = det.subscribe();
        drop(det.subscribe());

        clock.set(DEFAULT_COOLDOWN_MS);
        det.process_sample(-5.0);
        det.process_sample(5.0);
        assert!(det.process_sample(5.0));

        let expected = ShakeEvent {
            timestamp_ms: DEFAULT_COOLDOWN_MS,
            reversals: 2,
        };
        assert_eq!(first.try_recv().unwrap(), expected);
        assert_eq!(second.try_recv().unwrap(), expected);
        assert!(first.try_recv().is_err());
        assert_eq!(det.last_shake(), Some(expected));
        assert_eq!(det.subscriber_count(), 2);
    }

    #[test]
    fn motion_events_feed_the_x_reading() {
        let (mut det, clock) = detector(ShakeOptions::new());
        clock.set(DEFAULT_COOLDOWN_MS);

        assert!(!det.process_event(&MotionEvent::default()));
        assert_eq!(det.previous_sample(), None);

        det.process_event(&MotionEvent::with_gravity(-5.0));
        det.process_event(&MotionEvent::linear(5.0));
        assert_eq!(det.previous_sample(), Some(-5.0));
        assert_eq!(det.current_shake_count(), 1);
    }
}
