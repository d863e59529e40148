//! One-shot timers.
//!
//! A timer is identified by its key; scheduling a key that is already
//! pending replaces the earlier instance, so at most one timer of a given
//! kind exists per session (or system-wide).

use std::time::Duration;

use tandem_core::Profile;

use crate::registry::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerScope {
    System,
    Session(SessionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// No confirmation for a profile connect.
    ProfileConnect(Profile),
    /// Signaling settle time before media may start.
    MediaHoldoff,
    /// Deferred release of a fully disconnected session.
    DestroySession,
    /// End of the broadcast scan window.
    DiscoveryWindow,
    /// No answer to a capability search.
    ProbeTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub scope: TimerScope,
    pub kind: TimerKind,
}

impl TimerKey {
    pub fn session(id: SessionId, kind: TimerKind) -> Self {
        Self {
            scope: TimerScope::Session(id),
            kind,
        }
    }

    pub fn system(kind: TimerKind) -> Self {
        Self {
            scope: TimerScope::System,
            kind,
        }
    }
}

/// Delayed follow-up events. Firing posts `Event::Timer(key)` back to the
/// engine's dispatch loop.
pub trait Scheduler {
    /// Arm `key`, cancelling any pending instance first.
    fn schedule(&mut self, key: TimerKey, delay: Duration);

    fn cancel(&mut self, key: TimerKey);

    /// Cancel every timer scoped to `id`.
    fn cancel_session(&mut self, id: SessionId);
}

// ── In-memory scheduler ──────────────────────────────────────────────────────

/// Records armed timers; the owner decides when they fire.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    armed: Vec<(TimerKey, Duration)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.armed.iter().any(|(k, _)| k == key)
    }

    pub fn delay_of(&self, key: &TimerKey) -> Option<Duration> {
        self.armed.iter().find(|(k, _)| k == key).map(|(_, d)| *d)
    }

    pub fn armed(&self) -> impl Iterator<Item = &TimerKey> {
        self.armed.iter().map(|(k, _)| k)
    }

    pub fn find(&self, pred: impl Fn(&TimerKey) -> bool) -> Option<TimerKey> {
        self.armed.iter().map(|(k, _)| *k).find(|k| pred(k))
    }

    /// Disarm `key` if armed. True means the caller should deliver it.
    pub fn take(&mut self, key: &TimerKey) -> bool {
        let before = self.armed.len();
        self.armed.retain(|(k, _)| k != key);
        self.armed.len() != before
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.cancel(key);
        self.armed.push((key, delay));
    }

    fn cancel(&mut self, key: TimerKey) {
        self.armed.retain(|(k, _)| *k != key);
    }

    fn cancel_session(&mut self, id: SessionId) {
        self.armed.retain(|(k, _)| k.scope != TimerScope::Session(id));
    }
}
