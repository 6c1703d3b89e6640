//! Bounded, non-blocking inter-task queues.
//!
//! Generalizes the teacher's `mpsc::channel`-per-worker pattern
//! (`hub/workers.rs`) to `crossbeam_channel`, since several queues here are
//! genuinely multi-producer (`qCommands` is written by both the public API
//! and the Classifier task).

use crate::packet::{Packet, StreamSample};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

/// Default bound applied to every queue; matches the spec's "bounded" queue
/// requirement without imposing backpressure on a realistically sized
/// pipeline (samples arrive far slower than this drains).
pub const QUEUE_CAPACITY: usize = 256;

/// A bounded MPMC queue with non-blocking push/pop, matching the spec's
/// `try_push`/`try_pop` vocabulary.
#[derive(Clone)]
pub struct Queue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").finish_non_exhaustive()
    }
}

impl<T> Queue<T> {
    /// Build a queue with the given bound.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Non-blocking enqueue. Returns `false` if the queue is full or closed.
    pub fn try_push(&self, value: T) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }

    /// Non-blocking dequeue.
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(v) => Some(v),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drain every currently-queued item (used by finish-work-on-kill tasks).
    pub fn drain(&self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(v) = self.try_pop() {
            out.push(v);
        }
        out
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True if nothing is queued right now.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// The full set of inter-task queues, owned by the Supervisor and shared via
/// `Arc` with each task at spawn time.
#[derive(Debug, Clone)]
pub struct Queues {
    /// Validated inbound packets (Listener → Sorter).
    pub all: Queue<Packet>,
    /// Keepalive responses (Sorter → Keepalive).
    pub keepalive: Queue<Packet>,
    /// Command responses (Sorter → Commander).
    pub cmd_resp: Queue<Packet>,
    /// Decoded stream samples (Sorter → Classifier).
    pub stream: Queue<StreamSample>,
    /// Outbound opcodes (user API and Classifier → Commander).
    pub commands: Queue<crate::packet::Opcode>,
    /// Packets whose arrival must be announced to subscribers (Sorter → Notifier).
    pub client_events: Queue<Packet>,
}

impl Default for Queues {
    fn default() -> Self {
        Self::new()
    }
}

impl Queues {
    /// Build a fresh queue set, all bounded at [`QUEUE_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            all: Queue::new(QUEUE_CAPACITY),
            keepalive: Queue::new(QUEUE_CAPACITY),
            cmd_resp: Queue::new(QUEUE_CAPACITY),
            stream: Queue::new(QUEUE_CAPACITY),
            commands: Queue::new(QUEUE_CAPACITY),
            client_events: Queue::new(QUEUE_CAPACITY),
        }
    }

    /// Drop every queued item on all six queues (used on `sendConnectAsync`
    /// recovery, per spec §4.8).
    pub fn clear_all(&self) {
        self.all.drain();
        self.keepalive.drain();
        self.cmd_resp.drain();
        self.stream.drain();
        self.commands.drain();
        self.client_events.drain();
    }
}
