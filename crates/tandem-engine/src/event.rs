//! Inputs to the engine.
//!
//! Everything the engine reacts to is one of these variants. Transport
//! notifications are correlated by peer address and/or the opaque channel
//! handle the stack handed out when the channel was created.

use serde::{Deserialize, Serialize};

use tandem_core::{BdAddr, Profile, Quality};

use crate::action::Action;
use crate::codec::Endpoint;
use crate::timer::TimerKey;

/// Opaque identifier of a signaling or media channel, issued by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelHandle(pub u16);

/// Stream endpoint identifier on the peer.
pub type Seid = u8;

/// Outcome carried by a connect confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectStatus {
    Success,
    Failed,
    /// Link key or PIN rejected by the peer.
    AuthenticationFailed,
    /// Peer refused the profile connection.
    Rejected,
}

/// Remote-control pass-through operation received from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassthroughOp {
    Play,
    Pause,
    Stop,
    Forward,
    Backward,
}

/// Notifications from the radio stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransportEvent {
    /// Stack finished initialising.
    Ready,

    // ── Discovery ────────────────────────────────────────────────────────
    InquiryResult { addr: BdAddr, rssi: i8, eir: Vec<u8> },
    InquiryComplete,
    SearchResult { addr: BdAddr, profile: Profile, found: bool },

    // ── Security / link ──────────────────────────────────────────────────
    PinRequest { addr: BdAddr },
    AuthenticationResult { addr: BdAddr, success: bool },
    LinkInfo { addr: BdAddr, quality: Quality, edr: bool },

    // ── Voice ────────────────────────────────────────────────────────────
    VoiceConnectInd { addr: BdAddr, handle: ChannelHandle },
    VoiceConnectCfm { addr: BdAddr, handle: Option<ChannelHandle>, status: ConnectStatus },
    VoiceDisconnected { handle: ChannelHandle },
    /// Audio channel came up (`Some`) or went away (`None`).
    VoiceAudio { handle: ChannelHandle, audio: Option<ChannelHandle> },
    VoiceCallStatus { handle: ChannelHandle, active: bool },

    // ── Streaming ────────────────────────────────────────────────────────
    StreamConnectInd { addr: BdAddr, handle: ChannelHandle },
    StreamConnectCfm { addr: BdAddr, handle: Option<ChannelHandle>, status: ConnectStatus },
    /// Endpoints discovered on the peer once signaling is up.
    StreamCapabilities { handle: ChannelHandle, endpoints: Vec<Endpoint> },
    StreamOpenCfm { handle: ChannelHandle, media: Option<ChannelHandle>, success: bool },
    StreamOpenInd { handle: ChannelHandle, media: ChannelHandle, seid: Seid },
    StreamStartCfm { handle: ChannelHandle, success: bool },
    StreamStartInd { handle: ChannelHandle },
    StreamSuspendCfm { handle: ChannelHandle, success: bool },
    StreamSuspendInd { handle: ChannelHandle },
    StreamCloseCfm { handle: ChannelHandle },
    StreamCloseInd { handle: ChannelHandle },
    StreamDisconnected { handle: ChannelHandle },

    // ── Control ──────────────────────────────────────────────────────────
    ControlConnectInd { addr: BdAddr, handle: ChannelHandle },
    ControlConnectCfm { addr: BdAddr, handle: Option<ChannelHandle>, status: ConnectStatus },
    ControlDisconnected { handle: ChannelHandle },
    ControlPassthrough { handle: ChannelHandle, op: PassthroughOp },
}

impl TransportEvent {
    /// Handle and profile for events correlated by channel rather than
    /// by peer address.
    pub fn channel(&self) -> Option<(ChannelHandle, Profile)> {
        use TransportEvent::*;
        match self {
            VoiceDisconnected { handle } | VoiceAudio { handle, .. } | VoiceCallStatus { handle, .. } => {
                Some((*handle, Profile::Voice))
            }
            StreamCapabilities { handle, .. }
            | StreamOpenCfm { handle, .. }
            | StreamOpenInd { handle, .. }
            | StreamStartCfm { handle, .. }
            | StreamStartInd { handle }
            | StreamSuspendCfm { handle, .. }
            | StreamSuspendInd { handle }
            | StreamCloseCfm { handle }
            | StreamCloseInd { handle }
            | StreamDisconnected { handle } => Some((*handle, Profile::Streaming)),
            ControlDisconnected { handle } | ControlPassthrough { handle, .. } => {
                Some((*handle, Profile::Control))
            }
            _ => None,
        }
    }
}

/// One unit of work for the engine's dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Bring the engine out of Uninitialised.
    Start,
    /// Tear everything down and stop accepting actions.
    PowerOff,
    Transport(TransportEvent),
    Timer(TimerKey),
    Action(Action),
}

impl From<TransportEvent> for Event {
    fn from(ev: TransportEvent) -> Self {
        Event::Transport(ev)
    }
}

impl From<Action> for Event {
    fn from(action: Action) -> Self {
        Event::Action(action)
    }
}
