//! Process-wide session state, owned by the Supervisor.
//!
//! Resolves DESIGN NOTES §9's "ad-hoc locks → atomic flags + single owning
//! task" redesign flag: every flag here is an `AtomicBool`/`AtomicU8`, the
//! Supervisor and Commander are the only writers, and every other task reads
//! without locking.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Supervisor lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// No port is open.
    Created = 0,
    /// Port opened but handshake not yet confirmed.
    Opened = 1,
    /// Handshake confirmed.
    Connected = 2,
    /// All tasks spawned and running.
    Running = 3,
    /// Reconnecting after a fatal task exit.
    Restart = 4,
    /// Shutting down by user request.
    Stopping = 5,
    /// Unrecoverable; awaits an explicit `start()`.
    Error = 6,
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Opened,
            2 => Self::Connected,
            3 => Self::Running,
            4 => Self::Restart,
            5 => Self::Stopping,
            _ => Self::Error,
        }
    }
}

/// Atomic, shared process state: lifecycle status, stream/therapy booleans,
/// and the four "sent-but-unacked" guard flags.
#[derive(Debug)]
pub struct SessionState {
    status: AtomicU8,
    is_streaming: AtomicBool,
    is_stimming: AtomicBool,
    start_stream_sent: AtomicBool,
    stop_stream_sent: AtomicBool,
    start_stim_sent: AtomicBool,
    stop_stim_sent: AtomicBool,
    user_streaming: AtomicBool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Build a fresh session in the `Created` state, all flags clear.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(Status::Created as u8),
            is_streaming: AtomicBool::new(false),
            is_stimming: AtomicBool::new(false),
            start_stream_sent: AtomicBool::new(false),
            stop_stream_sent: AtomicBool::new(false),
            start_stim_sent: AtomicBool::new(false),
            stop_stim_sent: AtomicBool::new(false),
            user_streaming: AtomicBool::new(false),
        }
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Transition to a new lifecycle status. Only the Supervisor calls this.
    pub fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Whether a StartStream/StopStream ACK has set streaming on.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.is_streaming.load(Ordering::Acquire)
    }

    /// Whether a StartStim/StopStim ACK has set therapy on.
    #[must_use]
    pub fn is_stimming(&self) -> bool {
        self.is_stimming.load(Ordering::Acquire)
    }

    /// The user's last requested stream state, independent of ACK state.
    #[must_use]
    pub fn user_streaming(&self) -> bool {
        self.user_streaming.load(Ordering::Acquire)
    }

    /// Set the user's last requested stream state (public API only).
    pub fn set_user_streaming(&self, value: bool) {
        self.user_streaming.store(value, Ordering::Release);
    }

    /// Try to set `startStreamSent`; returns `false` (refused) if already set.
    pub fn try_set_start_stream_sent(&self) -> bool {
        self.start_stream_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Try to set `stopStreamSent`; returns `false` (refused) if already set.
    pub fn try_set_stop_stream_sent(&self) -> bool {
        self.stop_stream_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Try to set `startStimSent`; returns `false` (refused) if already set.
    pub fn try_set_start_stim_sent(&self) -> bool {
        self.start_stim_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Try to set `stopStimSent`; returns `false` (refused) if already set.
    pub fn try_set_stop_stim_sent(&self) -> bool {
        self.stop_stim_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Apply a `StartStream` acknowledgement: set streaming, clear the sent guard.
    pub fn ack_start_stream(&self) {
        self.is_streaming.store(true, Ordering::Release);
        self.start_stream_sent.store(false, Ordering::Release);
    }

    /// Apply a `StopStream` acknowledgement: clear streaming, clear the sent guard.
    pub fn ack_stop_stream(&self) {
        self.is_streaming.store(false, Ordering::Release);
        self.stop_stream_sent.store(false, Ordering::Release);
    }

    /// Apply a `StartStim` acknowledgement: set therapy, clear the sent guard.
    pub fn ack_start_stim(&self) {
        self.is_stimming.store(true, Ordering::Release);
        self.start_stim_sent.store(false, Ordering::Release);
    }

    /// Apply a `StopStim` acknowledgement: clear therapy, clear the sent guard.
    pub fn ack_stop_stim(&self) {
        self.is_stimming.store(false, Ordering::Release);
        self.stop_stim_sent.store(false, Ordering::Release);
    }

    /// Reset all four `*Sent` guard flags (advisory error recovery, or
    /// `sendConnectAsync`).
    pub fn reset_sent_flags(&self) {
        self.start_stream_sent.store(false, Ordering::Release);
        self.stop_stream_sent.store(false, Ordering::Release);
        self.start_stim_sent.store(false, Ordering::Release);
        self.stop_stim_sent.store(false, Ordering::Release);
    }

    /// Reset therapy state entirely (`sendConnectAsync` recovery path).
    pub fn reset_for_reconnect(&self) {
        self.is_stimming.store(false, Ordering::Release);
        self.reset_sent_flags();
    }
}
