//! Voice profile: signaling, the call sub-state, and the audio channel.
//!
//! The audio channel and the call are independent. A peer may open audio
//! before any call exists, and a call may run while audio is routed to the
//! phone.

use tandem_core::{CallState, Profile, ProfileState};

use super::{enter, request_disconnect, signaling_down, unexpected, ProfileReport};
use crate::audio::AudioCommand;
use crate::context::Context;
use crate::event::{ChannelHandle, TransportEvent};
use crate::notify::StatusEvent;
use crate::session::Session;
use crate::transport::TransportRequest;

fn set_call(s: &mut Session, call: CallState, cx: &mut Context<'_>) -> Option<ProfileReport> {
    if s.voice.call == call {
        return None;
    }
    tracing::debug!(peer = %s.addr(), from = ?s.voice.call, to = ?call, "call state");
    s.voice.call = call;
    cx.notify(StatusEvent::CallStateChanged { addr: s.addr(), call });
    Some(ProfileReport::CallChanged(call))
}

/// Place an outgoing call on a connected voice profile.
pub fn start_call(s: &mut Session, cx: &mut Context<'_>) -> Vec<ProfileReport> {
    let Some(handle) = s.handles.voice.filter(|_| s.voice.state == ProfileState::Connected) else {
        unexpected(s, Profile::Voice, "start call");
        return Vec::new();
    };
    if s.voice.call != CallState::Idle {
        tracing::debug!(peer = %s.addr(), call = ?s.voice.call, "call already in progress");
        return Vec::new();
    }
    if !cx.send(TransportRequest::VoiceStartCall { handle }) {
        return Vec::new();
    }
    if s.handles.voice_audio.is_none() {
        cx.send(TransportRequest::VoiceAudioConnect { handle });
    }
    set_call(s, CallState::Setup, cx).into_iter().collect()
}

/// Hang up. The call reaches Idle once the peer reports it inactive.
pub fn end_call(s: &mut Session, cx: &mut Context<'_>) -> Vec<ProfileReport> {
    let Some(handle) = s.handles.voice else {
        unexpected(s, Profile::Voice, "end call");
        return Vec::new();
    };
    match s.voice.call {
        CallState::Setup | CallState::Active => {
            if !cx.send(TransportRequest::VoiceEndCall { handle }) {
                return Vec::new();
            }
            set_call(s, CallState::Shutdown, cx).into_iter().collect()
        }
        CallState::Shutdown => Vec::new(),
        CallState::Idle => {
            tracing::debug!(peer = %s.addr(), "no call to end");
            Vec::new()
        }
    }
}

pub fn disconnect(s: &mut Session, cx: &mut Context<'_>) -> bool {
    match s.voice.state {
        ProfileState::Connected => {
            let handle = s.handles.voice;
            request_disconnect(s, Profile::Voice, handle, cx)
        }
        ProfileState::Disconnecting => true,
        _ => false,
    }
}

fn audio_up(s: &mut Session, audio: ChannelHandle, cx: &mut Context<'_>) {
    if let Some(old) = s.handles.voice_audio.replace(audio) {
        if old != audio {
            cx.audio(AudioCommand::DisconnectChannel { handle: old });
        }
    }
    tracing::info!(peer = %s.addr(), handle = audio.0, "voice audio up");
    cx.audio(AudioCommand::Load { profile: Profile::Voice });
    cx.audio(AudioCommand::ConnectChannel { handle: audio });
}

fn audio_down(s: &mut Session, cx: &mut Context<'_>) {
    if let Some(old) = s.handles.voice_audio.take() {
        tracing::info!(peer = %s.addr(), handle = old.0, "voice audio down");
        cx.audio(AudioCommand::DisconnectChannel { handle: old });
    }
}

/// Local teardown for a channel that is being dropped without the peer.
pub(crate) fn drop_channel(s: &mut Session, cx: &mut Context<'_>) {
    audio_down(s, cx);
    set_call(s, CallState::Idle, cx);
}

/// Voice events correlated by handle, after the session was resolved.
pub fn on_event(s: &mut Session, ev: &TransportEvent, cx: &mut Context<'_>) -> Vec<ProfileReport> {
    let mut reports = Vec::new();
    match ev {
        TransportEvent::VoiceAudio { audio, .. } => {
            if !s.voice.state.is_connected() {
                unexpected(s, Profile::Voice, "audio channel");
                return reports;
            }
            match audio {
                Some(a) => audio_up(s, *a, cx),
                None => audio_down(s, cx),
            }
        }

        TransportEvent::VoiceCallStatus { active, .. } => {
            if !s.voice.state.is_connected() {
                unexpected(s, Profile::Voice, "call status");
                return reports;
            }
            if *active {
                reports.extend(set_call(s, CallState::Active, cx));
            } else {
                reports.extend(set_call(s, CallState::Idle, cx));
                if let Some(handle) = s.handles.voice.filter(|_| s.handles.voice_audio.is_some()) {
                    cx.send(TransportRequest::VoiceAudioDisconnect { handle });
                }
            }
        }

        TransportEvent::VoiceDisconnected { .. } => {
            if s.voice.state.is_disconnected() {
                unexpected(s, Profile::Voice, "disconnected");
                return reports;
            }
            audio_down(s, cx);
            reports.extend(set_call(s, CallState::Idle, cx));
            reports.push(signaling_down(s, Profile::Voice, cx));
        }

        other => {
            tracing::warn!(peer = %s.addr(), event = ?other, "not a voice event, dropped");
        }
    }
    reports
}
