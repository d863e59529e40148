//! Streaming profile: signaling plus the media channel lifecycle.
//!
//! ```text
//! Connected ─open─▶ Opening ─▶ Open ─start─▶ Starting ─▶ Streaming
//!     ▲                         ▲  │                        │
//!     │                         │  └──────suspend◀── Suspending
//!     └──────── Closing ◀─close─┘
//! ```
//!
//! After signaling comes up no start is attempted until the holdoff timer
//! fires. A failed start closes the media channel and reopens it, bounded
//! by `max_reopen_attempts`.

use tandem_core::{Profile, ProfileState};

use super::{enter, request_disconnect, signaling_down, unexpected, ProfileReport};
use crate::audio::AudioCommand;
use crate::codec::negotiate_codec_capabilities;
use crate::context::Context;
use crate::event::TransportEvent;
use crate::registry::SessionId;
use crate::session::{Session, StreamMachine};
use crate::settings::Settings;
use crate::timer::{TimerKey, TimerKind};
use crate::transport::TransportRequest;

const P: Profile = Profile::Streaming;

/// Result of asking a session to start streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRequest {
    /// A start request is outstanding or the stream is already running.
    Underway,
    /// Remembered; issued once the media channel is open and the holdoff
    /// window has passed.
    Deferred,
    Impossible,
}

pub(crate) fn on_signaling_up(id: SessionId, s: &mut Session, cx: &mut Context<'_>, settings: &Settings) {
    s.stream = StreamMachine {
        state: s.stream.state,
        start_wanted: s.stream.start_wanted,
        holdoff: true,
        ..StreamMachine::default()
    };
    cx.timers
        .schedule(TimerKey::session(id, TimerKind::MediaHoldoff), settings.media_holdoff);
}

fn send_start(s: &mut Session, cx: &mut Context<'_>) -> StartRequest {
    let Some(handle) = s.handles.stream_signal else {
        return StartRequest::Impossible;
    };
    if cx.send(TransportRequest::StreamStart { handle }) {
        enter(s, P, ProfileState::Starting, cx);
        StartRequest::Underway
    } else {
        s.stream.start_wanted = false;
        StartRequest::Impossible
    }
}

fn send_open(s: &mut Session, cx: &mut Context<'_>) -> bool {
    let (Some(handle), Some(seid), Some(codec)) = (s.handles.stream_signal, s.stream.seid, s.stream.codec.as_ref()) else {
        return false;
    };
    let req = TransportRequest::StreamOpen {
        handle,
        seid,
        config: codec.config.clone(),
    };
    if cx.send(req) {
        enter(s, P, ProfileState::Opening, cx);
        true
    } else {
        false
    }
}

pub fn request_start(s: &mut Session, cx: &mut Context<'_>) -> StartRequest {
    match s.stream.state {
        ProfileState::Open if !s.stream.holdoff => {
            s.stream.start_wanted = true;
            send_start(s, cx)
        }
        ProfileState::Open | ProfileState::Connected | ProfileState::Opening | ProfileState::Suspending | ProfileState::Closing => {
            s.stream.start_wanted = true;
            StartRequest::Deferred
        }
        ProfileState::Starting | ProfileState::Streaming => StartRequest::Underway,
        _ => {
            unexpected(s, P, "start request");
            StartRequest::Impossible
        }
    }
}

/// Suspend a running stream. Returns true if a suspend is outstanding.
pub fn request_suspend(s: &mut Session, cx: &mut Context<'_>) -> bool {
    s.stream.start_wanted = false;
    match s.stream.state {
        ProfileState::Streaming | ProfileState::Starting => {
            let Some(handle) = s.handles.stream_signal else {
                return false;
            };
            if cx.send(TransportRequest::StreamSuspend { handle }) {
                enter(s, P, ProfileState::Suspending, cx);
                true
            } else {
                false
            }
        }
        ProfileState::Suspending => true,
        _ => false,
    }
}

fn send_close(s: &mut Session, cx: &mut Context<'_>) -> bool {
    let Some(handle) = s.handles.stream_signal else {
        return false;
    };
    if cx.send(TransportRequest::StreamClose { handle }) {
        enter(s, P, ProfileState::Closing, cx);
        true
    } else {
        false
    }
}

/// Close media first if it is open, then signaling.
pub fn disconnect(s: &mut Session, cx: &mut Context<'_>) -> bool {
    s.stream.start_wanted = false;
    s.stream.reopen_after_close = false;
    match s.stream.state {
        ProfileState::Connected | ProfileState::Opening => {
            let handle = s.handles.stream_signal;
            request_disconnect(s, P, handle, cx)
        }
        ProfileState::Open | ProfileState::Starting | ProfileState::Streaming | ProfileState::Suspending => {
            s.stream.disconnect_after_close = true;
            if send_close(s, cx) {
                true
            } else {
                let handle = s.handles.stream_signal;
                request_disconnect(s, P, handle, cx)
            }
        }
        ProfileState::Closing => {
            s.stream.disconnect_after_close = true;
            true
        }
        ProfileState::Disconnecting => true,
        _ => false,
    }
}

pub fn on_holdoff_end(s: &mut Session, cx: &mut Context<'_>) -> Vec<ProfileReport> {
    if !s.stream.holdoff {
        unexpected(s, P, "holdoff end");
        return Vec::new();
    }
    s.stream.holdoff = false;
    tracing::debug!(peer = %s.addr(), "media holdoff over");
    if s.stream.start_wanted && s.stream.state == ProfileState::Open {
        return start_or_fail(s, cx);
    }
    Vec::new()
}

fn start_or_fail(s: &mut Session, cx: &mut Context<'_>) -> Vec<ProfileReport> {
    match send_start(s, cx) {
        StartRequest::Impossible => vec![ProfileReport::MediaStartFailed],
        _ => Vec::new(),
    }
}

fn media_live(s: &mut Session, cx: &mut Context<'_>) {
    s.stream.start_wanted = false;
    s.stream.reopen_attempts = 0;
    enter(s, P, ProfileState::Streaming, cx);
    cx.audio(AudioCommand::Load { profile: P });
    if let Some(params) = s.stream.codec.clone() {
        cx.audio(AudioCommand::Codec { params });
    }
    if let Some(media) = s.handles.stream_media {
        cx.audio(AudioCommand::ConnectChannel { handle: media });
    }
}

fn media_quiet(s: &mut Session, cx: &mut Context<'_>) {
    if let Some(media) = s.handles.stream_media {
        cx.audio(AudioCommand::DisconnectChannel { handle: media });
    }
}

/// Local teardown for signaling that is being dropped without the peer.
pub(crate) fn drop_channel(s: &mut Session, cx: &mut Context<'_>) {
    if s.stream.state == ProfileState::Streaming || s.stream.state == ProfileState::Suspending {
        media_quiet(s, cx);
    }
    s.stream = StreamMachine {
        state: s.stream.state,
        ..StreamMachine::default()
    };
}

/// Media channel closed, by us or the peer.
fn media_closed(s: &mut Session, cx: &mut Context<'_>, reports: &mut Vec<ProfileReport>) {
    if s.stream.state == ProfileState::Streaming || s.stream.state == ProfileState::Suspending {
        media_quiet(s, cx);
    }
    s.handles.stream_media = None;
    enter(s, P, ProfileState::Connected, cx);
    reports.push(ProfileReport::MediaClosed);

    if s.stream.disconnect_after_close {
        s.stream.disconnect_after_close = false;
        let handle = s.handles.stream_signal;
        if !request_disconnect(s, P, handle, cx) {
            reports.push(ProfileReport::Disconnected(P));
        }
    } else if s.stream.reopen_after_close {
        s.stream.reopen_after_close = false;
        if !send_open(s, cx) {
            s.stream.start_wanted = false;
            reports.push(ProfileReport::MediaStartFailed);
        }
    }
}

pub fn on_event(s: &mut Session, ev: &TransportEvent, cx: &mut Context<'_>, settings: &Settings) -> Vec<ProfileReport> {
    let mut reports = Vec::new();
    let state = s.stream.state;
    match ev {
        TransportEvent::StreamCapabilities { endpoints, .. } => {
            if state != ProfileState::Connected {
                unexpected(s, P, "capabilities");
                return reports;
            }
            let words = cx.store.codec_words();
            match negotiate_codec_capabilities(endpoints, &words, settings.max_bitpool) {
                Ok((seid, params)) => {
                    tracing::info!(
                        peer = %s.addr(),
                        seid,
                        codec = ?params.codec,
                        rate = params.sample_rate_hz,
                        "stream endpoint configured"
                    );
                    s.stream.seid = Some(seid);
                    s.stream.codec = Some(params);
                    if !send_open(s, cx) && s.stream.start_wanted {
                        s.stream.start_wanted = false;
                        reports.push(ProfileReport::MediaStartFailed);
                    }
                }
                Err(e) => {
                    tracing::warn!(peer = %s.addr(), error = %e, "codec negotiation rejected every endpoint");
                    if s.stream.start_wanted {
                        s.stream.start_wanted = false;
                        reports.push(ProfileReport::MediaStartFailed);
                    }
                }
            }
        }

        TransportEvent::StreamOpenCfm { media, success, .. } => {
            if state != ProfileState::Opening {
                unexpected(s, P, "open confirmation");
                return reports;
            }
            match (success, media) {
                (true, Some(m)) => {
                    s.handles.stream_media = Some(*m);
                    enter(s, P, ProfileState::Open, cx);
                    reports.push(ProfileReport::MediaOpened);
                    if s.stream.start_wanted && !s.stream.holdoff {
                        reports.extend(start_or_fail(s, cx));
                    }
                }
                _ => {
                    tracing::warn!(peer = %s.addr(), "media open failed");
                    enter(s, P, ProfileState::Connected, cx);
                    if s.stream.start_wanted {
                        s.stream.start_wanted = false;
                        reports.push(ProfileReport::MediaStartFailed);
                    }
                }
            }
        }

        TransportEvent::StreamOpenInd { media, seid, .. } => {
            if state != ProfileState::Connected {
                unexpected(s, P, "open indication");
                return reports;
            }
            s.stream.seid = Some(*seid);
            s.handles.stream_media = Some(*media);
            enter(s, P, ProfileState::Open, cx);
            reports.push(ProfileReport::MediaOpened);
            if s.stream.start_wanted && !s.stream.holdoff {
                reports.extend(start_or_fail(s, cx));
            }
        }

        TransportEvent::StreamStartCfm { success, .. } => {
            if state != ProfileState::Starting {
                unexpected(s, P, "start confirmation");
                return reports;
            }
            if *success {
                media_live(s, cx);
                reports.push(ProfileReport::MediaStarted);
            } else if s.stream.reopen_attempts < settings.max_reopen_attempts {
                s.stream.reopen_attempts += 1;
                tracing::info!(
                    peer = %s.addr(),
                    attempt = s.stream.reopen_attempts,
                    "media start failed, reopening"
                );
                s.stream.reopen_after_close = true;
                if !send_close(s, cx) {
                    s.stream.reopen_after_close = false;
                    s.stream.start_wanted = false;
                    enter(s, P, ProfileState::Open, cx);
                    reports.push(ProfileReport::MediaStartFailed);
                }
            } else {
                tracing::warn!(peer = %s.addr(), "media start failed, giving up");
                s.stream.start_wanted = false;
                enter(s, P, ProfileState::Open, cx);
                reports.push(ProfileReport::MediaStartFailed);
            }
        }

        TransportEvent::StreamStartInd { .. } => {
            if state != ProfileState::Open {
                unexpected(s, P, "start indication");
                return reports;
            }
            media_live(s, cx);
            reports.push(ProfileReport::MediaStarted);
        }

        TransportEvent::StreamSuspendCfm { success, .. } => {
            if state != ProfileState::Suspending {
                unexpected(s, P, "suspend confirmation");
                return reports;
            }
            if *success {
                media_quiet(s, cx);
                enter(s, P, ProfileState::Open, cx);
                reports.push(ProfileReport::MediaSuspended);
                if s.stream.start_wanted {
                    reports.extend(start_or_fail(s, cx));
                }
            } else {
                tracing::warn!(peer = %s.addr(), "suspend refused, closing media");
                if !send_close(s, cx) {
                    enter(s, P, ProfileState::Streaming, cx);
                }
            }
        }

        TransportEvent::StreamSuspendInd { .. } => {
            if state != ProfileState::Streaming {
                unexpected(s, P, "suspend indication");
                return reports;
            }
            media_quiet(s, cx);
            enter(s, P, ProfileState::Open, cx);
            reports.push(ProfileReport::MediaSuspended);
        }

        TransportEvent::StreamCloseCfm { .. } => {
            if state != ProfileState::Closing {
                unexpected(s, P, "close confirmation");
                return reports;
            }
            media_closed(s, cx, &mut reports);
        }

        TransportEvent::StreamCloseInd { .. } => {
            if !state.has_media() && state != ProfileState::Closing {
                unexpected(s, P, "close indication");
                return reports;
            }
            // Peer closed; do not fight it with a reopen.
            s.stream.reopen_after_close = false;
            media_closed(s, cx, &mut reports);
        }

        TransportEvent::StreamDisconnected { .. } => {
            if state.is_disconnected() {
                unexpected(s, P, "disconnected");
                return reports;
            }
            if state == ProfileState::Streaming || state == ProfileState::Suspending {
                media_quiet(s, cx);
            }
            if state.has_media() || state == ProfileState::Closing {
                reports.push(ProfileReport::MediaClosed);
            }
            let wanted = s.stream.start_wanted;
            s.stream = StreamMachine {
                state: s.stream.state,
                ..StreamMachine::default()
            };
            if wanted {
                reports.push(ProfileReport::MediaStartFailed);
            }
            reports.push(signaling_down(s, P, cx));
        }

        other => {
            tracing::warn!(peer = %s.addr(), event = ?other, "not a streaming event, dropped");
        }
    }
    reports
}
