// Seismograph: Recorder Task
//
// Attaches a shake detector to a motion source.  `start()` registers a
// channel under the motion event name and spawns a worker thread that drains
// it into the detector; `stop()` unregisters the channel, which closes it and
// lets the worker exit.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context};

use crate::clock::{Clock, SystemClock};
use crate::config::*;
use crate::detector::ShakeDetector;
use crate::events::{MotionEvent, ShakeEvent};
use crate::source::{ListenerId, MotionSource};

pub type SharedDetector<C> = Arc<Mutex<ShakeDetector<C>>>;

struct Attachment {
    listener: ListenerId,
    worker: JoinHandle<()>,
}

pub struct ShakeRecorder<S: MotionSource, C: Clock + 'static = SystemClock> {
    source: Arc<S>,
    detector: SharedDetector<C>,
    attachment: Option<Attachment>,
}

impl<S: MotionSource, C: Clock + 'static> ShakeRecorder<S, C> {
    pub fn new(source: Arc<S>, detector: ShakeDetector<C>) -> Self {
        Self {
            source,
            detector: Arc::new(Mutex::new(detector)),
            attachment: None,
        }
    }

    /// Begin processing motion events.  Calling it while running does nothing.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.attachment.is_some() {
            return Ok(());
        }

        let (motion_tx, motion_rx) = mpsc::channel();
        let listener = self.source.add_listener(MOTION_EVENT_NAME, motion_tx);

        let detector = Arc::clone(&self.detector);
        let spawned = thread::Builder::new()
            .name(DETECTOR_THREAD_NAME.into())
            .stack_size(STACK_DETECTOR)
            .spawn(move || detector_task(motion_rx, detector));

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                self.source.remove_listener(MOTION_EVENT_NAME, listener);
                return Err(e).context("spawning shake detector thread");
            }
        };

        self.attachment = Some(Attachment { listener, worker });
        log::info!("Recording `{}` events", MOTION_EVENT_NAME);
        Ok(())
    }

    /// Detach from the source and wait for queued events to be processed.
    /// Calling it while stopped does nothing.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        let Some(Attachment { listener, worker }) = self.attachment.take() else {
            return Ok(());
        };

        if !self.source.remove_listener(MOTION_EVENT_NAME, listener) {
            log::warn!("Motion listener was already removed from the source");
        }
        worker
            .join()
            .map_err(|_| anyhow!("shake detector thread panicked"))?;
        log::info!("Recording stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn detector(&self) -> SharedDetector<C> {
        Arc::clone(&self.detector)
    }

    pub fn subscribe(&self) -> Receiver<ShakeEvent> {
        lock_detector(&self.detector).subscribe()
    }
}

impl<S: MotionSource, C: Clock + 'static> Drop for ShakeRecorder<S, C> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Failed to stop recorder: {}", e);
        }
    }
}

/// Worker body: runs until every sender for `motion_rx` is gone.
pub fn detector_task<C: Clock>(motion_rx: Receiver<MotionEvent>, detector: SharedDetector<C>) {
    log::debug!("Detector task started");

    let mut shakes: u64 = 0;
    while let Ok(event) = motion_rx.recv() {
        if lock_detector(&detector).process_event(&event) {
            shakes += 1;
        }
    }

    log::debug!("Motion channel closed after {} shake(s), exiting detector task", shakes);
}

fn lock_detector<C: Clock>(detector: &Mutex<ShakeDetector<C>>) -> MutexGuard<'_, ShakeDetector<C>> {
    // A panicking user callback poisons the lock; detector fields are updated
    // before the callback runs, so the state is still usable.
    detector.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
