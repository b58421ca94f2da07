// Seismograph: Motion Sources
//
// A motion source delivers `MotionEvent`s to listeners registered under an
// event name.  The recorder only sees the `MotionSource` trait, so the owner
// decides where events come from (a sensor driver, a replayed capture, a
// test).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Mutex, MutexGuard};

use crate::events::MotionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub trait MotionSource: Send + Sync {
    /// Start delivering `event_name` events to `listener`.
    fn add_listener(&self, event_name: &str, listener: Sender<MotionEvent>) -> ListenerId;

    /// Stop delivering to `id`, dropping its sender.  Returns `false` if it
    /// was not registered under `event_name`.
    fn remove_listener(&self, event_name: &str, id: ListenerId) -> bool;
}

// ---------------------------------------------------------------------------
// In-process broadcaster
// ---------------------------------------------------------------------------

type Listeners = HashMap<String, Vec<(ListenerId, Sender<MotionEvent>)>>;

#[derive(Debug, Default)]
pub struct MotionBus {
    next_id: AtomicU64,
    listeners: Mutex<Listeners>,
}

impl MotionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a copy of `event` to every listener of `event_name`.  Listeners
    /// whose receiver is gone are dropped.  Returns how many received it.
    pub fn dispatch(&self, event_name: &str, event: MotionEvent) -> usize {
        let mut listeners = self.lock();
        let Some(registered) = listeners.get_mut(event_name) else {
            return 0;
        };

        let before = registered.len();
        registered.retain(|(_, tx)| tx.send(event).is_ok());
        if registered.len() < before {
            log::debug!(
                "Dropped {} closed `{}` listener(s)",
                before - registered.len(),
                event_name
            );
        }
        registered.len()
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.lock().get(event_name).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        // The map is only edited with plain pushes and retains, so it is
        // consistent even if a holder panicked.
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MotionSource for MotionBus {
    fn add_listener(&self, event_name: &str, listener: Sender<MotionEvent>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(event_name.to_owned())
            .or_default()
            .push((id, listener));
        id
    }

    fn remove_listener(&self, event_name: &str, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let Some(registered) = listeners.get_mut(event_name) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(listener_id, _)| *listener_id != id);
        registered.len() < before
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn dispatch_reaches_listeners_of_that_name_only() {
        let bus = MotionBus::new();
        let (motion_tx, motion_rx) = mpsc::channel();
        let (other_tx, other_rx) = mpsc::channel();
        bus.add_listener("devicemotion", motion_tx);
        bus.add_listener("orientation", other_tx);

        assert_eq!(bus.dispatch("devicemotion", MotionEvent::linear(2.0)), 1);
        assert_eq!(motion_rx.try_recv().unwrap().sample_x(), Some(2.0));
        assert!(other_rx.try_recv().is_err());
        assert_eq!(bus.dispatch("nobody", MotionEvent::linear(2.0)), 0);
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let bus = MotionBus::new();
        let (tx, rx) = mpsc::channel();
        let id = bus.add_listener("devicemotion", tx);

        assert!(bus.remove_listener("devicemotion", id));
        assert!(!bus.remove_listener("devicemotion", id));
        assert!(!bus.remove_listener("elsewhere", id));
        assert_eq!(bus.dispatch("devicemotion", MotionEvent::linear(1.0)), 0);
        // The bus held the only sender, so the channel is now closed.
        assert!(rx.recv().is_err());
    }

    #[test]
    fn closed_listeners_are_pruned() {
        let bus = MotionBus::new();
        let (tx, rx) = mpsc::channel();
        bus.add_listener("devicemotion", tx);
        drop(rx);

        assert_eq!(bus.listener_count("devicemotion"), 1);
        assert_eq!(bus.dispatch("devicemotion", MotionEvent::linear(1.0)), 0);
        assert_eq!(bus.listener_count("devicemotion"), 0);
    }
}
