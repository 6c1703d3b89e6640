//! Client-facing events and the subscriber registry.
//!
//! Grounded on the teacher's `hub/events.rs` `HubEvent` enum (constructor
//! helpers, `is_*` predicates) and its sequential-dispatch subscriber usage.

use crate::packet::StreamSample;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

/// Events delivered to subscribers, per spec §4.7 / §6.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A stream sample arrived.
    StreamData(StreamSample),
    /// `StartStream` was acknowledged.
    StreamStarted,
    /// `StopStream` was acknowledged.
    StreamStopped,
    /// `StartStim` was acknowledged.
    TherapyStarted,
    /// `StopStim` was acknowledged.
    TherapyStopped,
}

impl ClientEvent {
    /// True for [`ClientEvent::StreamData`].
    #[must_use]
    pub fn is_stream_data(&self) -> bool {
        matches!(self, Self::StreamData(_))
    }

    /// True for a stream lifecycle event (`StreamStarted`/`StreamStopped`).
    #[must_use]
    pub fn is_stream_lifecycle(&self) -> bool {
        matches!(self, Self::StreamStarted | Self::StreamStopped)
    }

    /// True for a therapy lifecycle event.
    #[must_use]
    pub fn is_therapy_lifecycle(&self) -> bool {
        matches!(self, Self::TherapyStarted | Self::TherapyStopped)
    }
}

type Callback = Box<dyn Fn(&ClientEvent) + Send + Sync>;

/// A sequentially-invoked list of subscriber callbacks.
///
/// Resolves DESIGN NOTES §9's "event subscription dynamic dispatch" flag:
/// callbacks are plain `Fn` trait objects invoked one at a time; a panicking
/// callback is caught and logged, and delivery continues to the rest.
pub struct Subscribers {
    callbacks: Mutex<Vec<Callback>>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers").finish_non_exhaustive()
    }
}

impl Default for Subscribers {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscribers {
    /// Build an empty subscriber list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback, invoked for every future event.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        callbacks.push(Box::new(callback));
    }

    /// Invoke every subscriber with `event`, in registration order. A
    /// callback that panics is caught and logged; the rest still run.
    pub fn notify(&self, event: &ClientEvent) {
        let callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        for callback in callbacks.iter() {
            let result = catch_unwind(AssertUnwindSafe(|| callback(event)));
            if result.is_err() {
                log::warn!("client event subscriber panicked; continuing delivery");
            }
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True if no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notify_invokes_all_subscribers_in_order() {
        let subs = Subscribers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            let seen = Arc::clone(&seen);
            subs.subscribe(move |_event| seen.lock().unwrap().push(tag));
        }
        subs.notify(&ClientEvent::StreamStarted);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn panicking_subscriber_does_not_block_the_rest() {
        let subs = Subscribers::new();
        let after = Arc::new(AtomicUsize::new(0));
        subs.subscribe(|_event| panic!("boom"));
        let after_clone = Arc::clone(&after);
        subs.subscribe(move |_event| {
            after_clone.fetch_add(1, Ordering::SeqCst);
        });
        subs.notify(&ClientEvent::StreamStopped);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_predicates_classify_correctly() {
        assert!(ClientEvent::StreamStarted.is_stream_lifecycle());
        assert!(ClientEvent::TherapyStopped.is_therapy_lifecycle());
        assert!(!ClientEvent::StreamStarted.is_therapy_lifecycle());
    }
}
