//! Timers on the tokio runtime.
//!
//! Each armed key owns a sleeping task that posts the key back to the event
//! loop with a sequence number. A fire is only delivered to the engine if
//! the loop can still claim that sequence; one that raced a cancel or a
//! re-arm is dropped.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use tandem_engine::{Scheduler, SessionId, TimerKey, TimerScope};

use crate::event_loop::Input;

struct Armed {
    seq: u64,
    task: JoinHandle<()>,
}

pub struct TokioScheduler {
    tx: UnboundedSender<Input>,
    armed: HashMap<TimerKey, Armed>,
    next_seq: u64,
}

impl TokioScheduler {
    pub fn new(tx: UnboundedSender<Input>) -> Self {
        Self {
            tx,
            armed: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Take ownership of a fired timer. False if it was cancelled or
    /// replaced after it fired.
    pub fn claim(&mut self, key: TimerKey, seq: u64) -> bool {
        match self.armed.get(&key) {
            Some(a) if a.seq == seq => {
                self.armed.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn armed(&self) -> usize {
        self.armed.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.cancel(key);
        self.next_seq += 1;
        let seq = self.next_seq;
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Input::Timer { key, seq });
        });
        tracing::trace!(?key, ?delay, seq, "timer armed");
        self.armed.insert(key, Armed { seq, task });
    }

    fn cancel(&mut self, key: TimerKey) {
        if let Some(a) = self.armed.remove(&key) {
            a.task.abort();
        }
    }

    fn cancel_session(&mut self, id: SessionId) {
        self.armed.retain(|key, a| {
            if key.scope == TimerScope::Session(id) {
                a.task.abort();
                false
            } else {
                true
            }
        });
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, a) in self.armed.drain() {
            a.task.abort();
        }
    }
}
