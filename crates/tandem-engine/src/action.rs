//! Externally requested top-level actions and the current/pending slots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An action requested by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Cancel whatever is waiting in the pending slot.
    None,
    Connect,
    Disconnect,
    StartCall,
    EndCall,
    StartStream,
    EndStream,
    Discover,
    #[serde(rename = "discover-connected")]
    DiscoverWhileConnected,
    Inquire,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::None,
        Action::Connect,
        Action::Disconnect,
        Action::StartCall,
        Action::EndCall,
        Action::StartStream,
        Action::EndStream,
        Action::Discover,
        Action::DiscoverWhileConnected,
        Action::Inquire,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::None => "none",
            Action::Connect => "connect",
            Action::Disconnect => "disconnect",
            Action::StartCall => "start-call",
            Action::EndCall => "end-call",
            Action::StartStream => "start-stream",
            Action::EndStream => "end-stream",
            Action::Discover => "discover",
            Action::DiscoverWhileConnected => "discover-connected",
            Action::Inquire => "inquire",
        }
    }

    /// Actions that only make sense once a peer is connected.
    pub fn needs_connection(self) -> bool {
        matches!(self, Action::StartCall | Action::StartStream)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

// ── Slots ────────────────────────────────────────────────────────────────────

/// The one in-flight action and the one action waiting behind it.
///
/// The pending slot has depth one: deferring while something is already
/// pending replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSlots {
    current: Option<Action>,
    pending: Option<Action>,
}

impl ActionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Action> {
        self.current
    }

    pub fn pending(&self) -> Option<Action> {
        self.pending
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    /// Mark `action` as in flight.
    pub fn begin(&mut self, action: Action) {
        self.current = Some(action);
    }

    /// Park `action` until the in-flight one completes. Returns what it displaced.
    pub fn defer(&mut self, action: Action) -> Option<Action> {
        self.pending.replace(action)
    }

    pub fn cancel_pending(&mut self) -> Option<Action> {
        self.pending.take()
    }

    /// The in-flight action finished. Hands back the pending one for re-dispatch.
    pub fn finish(&mut self) -> Option<Action> {
        self.current = None;
        self.pending.take()
    }

    /// Drop the in-flight action without touching the pending one.
    pub fn abandon(&mut self) -> Option<Action> {
        self.current.take()
    }

    /// Drop everything, e.g. on power-off.
    pub fn clear(&mut self) {
        self.current = None;
        self.pending = None;
    }
}
