//! Requests to the radio stack.
//!
//! Every request returns immediately. `Ok` only means the stack accepted
//! the request; the outcome arrives later as a [`TransportEvent`].
//!
//! [`TransportEvent`]: crate::event::TransportEvent

use serde::{Deserialize, Serialize};

use tandem_core::{BdAddr, Profile, ProfileSet};

use crate::event::{ChannelHandle, Seid};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum TransportRequest {
    StartInquiry,
    StopInquiry,
    Search { addr: BdAddr, profile: Profile },
    /// `None` tells the stack to give up on pairing.
    PinReply { addr: BdAddr, pin: Option<String> },
    ReadLinkInfo { addr: BdAddr },
    /// Accept or reject an inbound connect indication.
    Respond { addr: BdAddr, profile: Profile, handle: ChannelHandle, accept: bool },

    VoiceConnect { addr: BdAddr },
    VoiceDisconnect { handle: ChannelHandle },
    VoiceStartCall { handle: ChannelHandle },
    VoiceEndCall { handle: ChannelHandle },
    VoiceAudioConnect { handle: ChannelHandle },
    VoiceAudioDisconnect { handle: ChannelHandle },

    StreamConnect { addr: BdAddr },
    StreamOpen { handle: ChannelHandle, seid: Seid, config: Vec<u8> },
    StreamStart { handle: ChannelHandle },
    StreamSuspend { handle: ChannelHandle },
    StreamClose { handle: ChannelHandle },
    StreamDisconnect { handle: ChannelHandle },

    ControlConnect { addr: BdAddr },
    ControlDisconnect { handle: ChannelHandle },
}

impl TransportRequest {
    /// The per-profile connect request for `profile`.
    pub fn connect(profile: Profile, addr: BdAddr) -> Self {
        match profile {
            Profile::Voice => TransportRequest::VoiceConnect { addr },
            Profile::Streaming => TransportRequest::StreamConnect { addr },
            Profile::Control => TransportRequest::ControlConnect { addr },
        }
    }

    /// The profile a connect request is for, if it is one.
    pub fn connect_profile(&self) -> Option<Profile> {
        match self {
            TransportRequest::VoiceConnect { .. } => Some(Profile::Voice),
            TransportRequest::StreamConnect { .. } => Some(Profile::Streaming),
            TransportRequest::ControlConnect { .. } => Some(Profile::Control),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("stack link is down")]
    LinkDown,
    #[error("stack refused request: {0}")]
    Refused(String),
}

/// The radio stack collaborator.
pub trait Transport {
    fn request(&mut self, req: TransportRequest) -> Result<(), TransportError>;
}

// ── In-memory transport ──────────────────────────────────────────────────────

/// Records every accepted request. Connects for profiles in `refused`,
/// signaling disconnects while `refuse_disconnects` is set and everything
/// while `down` is set are rejected.
#[derive(Debug, Default)]
pub struct RequestLog {
    requests: Vec<TransportRequest>,
    refused: ProfileSet,
    refuse_disconnects: bool,
    down: bool,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_connect(&mut self, profile: Profile) {
        self.refused.insert(profile);
    }

    pub fn refuse_disconnects(&mut self, refuse: bool) {
        self.refuse_disconnects = refuse;
    }

    pub fn set_down(&mut self, down: bool) {
        self.down = down;
    }

    pub fn requests(&self) -> &[TransportRequest] {
        &self.requests
    }

    pub fn last(&self) -> Option<&TransportRequest> {
        self.requests.last()
    }

    /// Drain the log, returning what was recorded since the last drain.
    pub fn take(&mut self) -> Vec<TransportRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn contains(&self, req: &TransportRequest) -> bool {
        self.requests.contains(req)
    }

    pub fn count(&self, pred: impl Fn(&TransportRequest) -> bool) -> usize {
        self.requests.iter().filter(|r| pred(r)).count()
    }
}

impl Transport for RequestLog {
    fn request(&mut self, req: TransportRequest) -> Result<(), TransportError> {
        if self.down {
            return Err(TransportError::LinkDown);
        }
        if let Some(profile) = req.connect_profile() {
            if self.refused.contains(profile) {
                return Err(TransportError::Refused(format!("{profile} connect")));
            }
        }
        if self.refuse_disconnects
            && matches!(
                req,
                TransportRequest::VoiceDisconnect { .. }
                    | TransportRequest::StreamDisconnect { .. }
                    | TransportRequest::ControlDisconnect { .. }
            )
        {
            return Err(TransportError::Refused("disconnect".into()));
        }
        self.requests.push(req);
        Ok(())
    }
}
