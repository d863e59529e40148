//! Status notifications for the human-facing control surface.

use serde::Serialize;

use tandem_core::{BdAddr, CallState, Profile, ProfileSet, ProfileState, QualityChoice};

use crate::dispatcher::GatewayState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusEvent {
    ModeChanged { state: GatewayState },
    ProfileChanged { addr: BdAddr, profile: Profile, state: ProfileState },
    SessionConnected { addr: BdAddr, profiles: ProfileSet },
    SessionConnectFailed { addr: BdAddr },
    SessionDisconnected { addr: BdAddr },
    /// An inbound connection was refused.
    SessionRejected { addr: BdAddr, profile: Profile },
    CandidateFound { addr: BdAddr, path_loss: u8, profiles: ProfileSet },
    DiscoveryFinished { found: Option<BdAddr> },
    CallStateChanged { addr: BdAddr, call: CallState },
    QualityChanged { choice: QualityChoice },
}

pub trait Notifier {
    fn notify(&mut self, event: StatusEvent);
}

#[derive(Debug, Default)]
pub struct NotificationLog {
    events: Vec<StatusEvent>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[StatusEvent] {
        &self.events
    }

    pub fn take(&mut self) -> Vec<StatusEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn count(&self, pred: impl Fn(&StatusEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl Notifier for NotificationLog {
    fn notify(&mut self, event: StatusEvent) {
        self.events.push(event);
    }
}
