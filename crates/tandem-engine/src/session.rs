//! Per-peer session record.
//!
//! A session aggregates the three profile machines for one remote peer,
//! the channel handles the stack issued for them, and the bookkeeping the
//! coordinator needs to run one connect cycle.

use serde::Serialize;

use tandem_core::{BdAddr, CallState, Profile, ProfileSet, ProfileState, Quality};

use crate::codec::CodecParams;
use crate::event::{ChannelHandle, Seid};

/// Who brought the session up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Initiator,
    Acceptor,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceMachine {
    pub state: ProfileState,
    pub call: CallState,
}

#[derive(Debug, Clone, Default)]
pub struct StreamMachine {
    pub state: ProfileState,
    /// Endpoint chosen on the peer.
    pub seid: Option<Seid>,
    pub codec: Option<CodecParams>,
    /// Reopen the media channel as soon as the close completes.
    pub reopen_after_close: bool,
    pub reopen_attempts: u8,
    /// Tear signaling down once the media channel is closed.
    pub disconnect_after_close: bool,
    /// Inside the post-connect window where no media start is attempted.
    pub holdoff: bool,
    /// A start was asked for and has not happened yet.
    pub start_wanted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ControlMachine {
    pub state: ProfileState,
}

/// Channel handles issued by the stack. `None` means no channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Handles {
    pub voice: Option<ChannelHandle>,
    pub voice_audio: Option<ChannelHandle>,
    pub stream_signal: Option<ChannelHandle>,
    pub stream_media: Option<ChannelHandle>,
    pub control: Option<ChannelHandle>,
}

impl Handles {
    pub fn any(&self) -> bool {
        self.voice.is_some()
            || self.voice_audio.is_some()
            || self.stream_signal.is_some()
            || self.stream_media.is_some()
            || self.control.is_some()
    }

    /// The profile owning `handle`, if any channel of this session is it.
    pub fn owner(&self, handle: ChannelHandle) -> Option<Profile> {
        let h = Some(handle);
        if self.voice == h || self.voice_audio == h {
            Some(Profile::Voice)
        } else if self.stream_signal == h || self.stream_media == h {
            Some(Profile::Streaming)
        } else if self.control == h {
            Some(Profile::Control)
        } else {
            None
        }
    }

    fn release(&mut self, profile: Profile) {
        match profile {
            Profile::Voice => {
                self.voice = None;
                self.voice_audio = None;
            }
            Profile::Streaming => {
                self.stream_signal = None;
                self.stream_media = None;
            }
            Profile::Control => self.control = None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    addr: BdAddr,
    pub role: Role,
    pub voice: VoiceMachine,
    pub stream: StreamMachine,
    pub control: ControlMachine,
    pub handles: Handles,

    /// Profiles the peer is known to support.
    pub supported: ProfileSet,
    /// Connect cycle bookkeeping.
    pub attempted: ProfileSet,
    pub responded: ProfileSet,
    pub succeeded: ProfileSet,
    /// A session-level connect is in flight and owes one terminal report.
    pub connecting: bool,
    /// Tear down whatever comes up from here on.
    pub disconnect_pending: bool,
    /// At least one profile came up since the session was last fully down.
    pub was_connected: bool,

    pub quality: Quality,
    /// Link running at the top data-rate tier.
    pub edr: bool,
    pub link_info_requested: bool,
    pub pin_index: u8,
}

impl Session {
    pub fn new(addr: BdAddr, role: Role) -> Self {
        Self {
            addr,
            role,
            voice: VoiceMachine::default(),
            stream: StreamMachine::default(),
            control: ControlMachine::default(),
            handles: Handles::default(),
            supported: ProfileSet::EMPTY,
            attempted: ProfileSet::EMPTY,
            responded: ProfileSet::EMPTY,
            succeeded: ProfileSet::EMPTY,
            connecting: false,
            disconnect_pending: false,
            was_connected: false,
            quality: Quality::Unknown,
            edr: true,
            link_info_requested: false,
            pin_index: 0,
        }
    }

    pub fn addr(&self) -> BdAddr {
        self.addr
    }

    pub fn state(&self, profile: Profile) -> ProfileState {
        match profile {
            Profile::Voice => self.voice.state,
            Profile::Streaming => self.stream.state,
            Profile::Control => self.control.state,
        }
    }

    /// Move `profile` to `state`. Entering Disconnected releases the
    /// profile's channel handles.
    pub fn set_state(&mut self, profile: Profile, state: ProfileState) {
        let old = self.state(profile);
        if old != state {
            tracing::debug!(peer = %self.addr, %profile, from = ?old, to = ?state, "profile state");
        }
        match profile {
            Profile::Voice => self.voice.state = state,
            Profile::Streaming => self.stream.state = state,
            Profile::Control => self.control.state = state,
        }
        if state.is_disconnected() {
            self.handles.release(profile);
        }
    }

    /// Profiles whose signaling is up.
    pub fn connected_profiles(&self) -> ProfileSet {
        Profile::PRIORITY
            .into_iter()
            .filter(|p| self.state(*p).is_connected())
            .collect()
    }

    pub fn all_disconnected(&self) -> bool {
        Profile::PRIORITY
            .into_iter()
            .all(|p| self.state(p).is_disconnected())
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.stream.state, ProfileState::Starting | ProfileState::Streaming)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            addr: self.addr,
            role: self.role,
            voice: self.voice.state,
            streaming: self.stream.state,
            control: self.control.state,
            call: self.voice.call,
            quality: self.quality,
            edr: self.edr,
        }
    }
}

/// Read-only view for the status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub addr: BdAddr,
    pub role: Role,
    pub voice: ProfileState,
    pub streaming: ProfileState,
    pub control: ProfileState,
    pub call: CallState,
    pub quality: Quality,
    pub edr: bool,
}
