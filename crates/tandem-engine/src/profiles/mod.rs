//! The three per-session profile state machines.
//!
//! Each machine only touches its own fields of the [`Session`] passed in.
//! Connect and disconnect share one lifecycle and live here; everything
//! profile-specific lives in the submodules. An event that arrives in a
//! state that does not expect it is logged and dropped.

pub mod control;
pub mod streaming;
pub mod voice;

use tandem_core::{CallState, Profile, ProfileState};

use crate::context::Context;
use crate::event::{ChannelHandle, ConnectStatus, PassthroughOp};
use crate::notify::StatusEvent;
use crate::registry::SessionId;
use crate::session::Session;
use crate::settings::Settings;
use crate::timer::{TimerKey, TimerKind};
use crate::transport::{TransportError, TransportRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    Failed,
    /// The peer rejected our credentials.
    AuthFailed,
}

/// What a machine tells the layers above after handling an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileReport {
    ConnectResult { profile: Profile, outcome: ConnectOutcome },
    Disconnected(Profile),
    MediaOpened,
    MediaStarted,
    /// A requested start could not be completed.
    MediaStartFailed,
    MediaSuspended,
    MediaClosed,
    CallChanged(CallState),
    Passthrough(PassthroughOp),
}

/// Move `profile` to `state` and tell the control surface.
pub(crate) fn enter(s: &mut Session, profile: Profile, state: ProfileState, cx: &mut Context<'_>) {
    if s.state(profile) == state {
        return;
    }
    s.set_state(profile, state);
    cx.notify(StatusEvent::ProfileChanged {
        addr: s.addr(),
        profile,
        state,
    });
}

pub(crate) fn unexpected(s: &Session, profile: Profile, what: &str) {
    tracing::warn!(
        peer = %s.addr(),
        %profile,
        state = ?s.state(profile),
        event = what,
        "unexpected in state, dropped"
    );
}

fn set_signal_handle(s: &mut Session, profile: Profile, handle: ChannelHandle) {
    match profile {
        Profile::Voice => s.handles.voice = Some(handle),
        Profile::Streaming => s.handles.stream_signal = Some(handle),
        Profile::Control => s.handles.control = Some(handle),
    }
}

pub(crate) fn disconnect_request(profile: Profile, handle: ChannelHandle) -> TransportRequest {
    match profile {
        Profile::Voice => TransportRequest::VoiceDisconnect { handle },
        Profile::Streaming => TransportRequest::StreamDisconnect { handle },
        Profile::Control => TransportRequest::ControlDisconnect { handle },
    }
}

// ── Connect ──────────────────────────────────────────────────────────────────

/// Start an outbound connect. The outcome arrives as a confirmation or as
/// the connect timer firing.
pub fn connect(
    id: SessionId,
    s: &mut Session,
    profile: Profile,
    cx: &mut Context<'_>,
    settings: &Settings,
) -> Result<(), TransportError> {
    if !s.state(profile).is_disconnected() {
        unexpected(s, profile, "connect request");
        return Err(TransportError::Refused(format!("{profile} not disconnected")));
    }
    cx.request(TransportRequest::connect(profile, s.addr()))?;
    enter(s, profile, ProfileState::Paging, cx);
    cx.timers.schedule(
        TimerKey::session(id, TimerKind::ProfileConnect(profile)),
        settings.connect_timeout,
    );
    Ok(())
}

/// Accept an inbound connect indication.
pub fn accept(
    id: SessionId,
    s: &mut Session,
    profile: Profile,
    handle: ChannelHandle,
    cx: &mut Context<'_>,
    settings: &Settings,
) -> Result<(), TransportError> {
    cx.request(TransportRequest::Respond {
        addr: s.addr(),
        profile,
        handle,
        accept: true,
    })?;
    set_signal_handle(s, profile, handle);
    enter(s, profile, ProfileState::Paged, cx);
    cx.timers.schedule(
        TimerKey::session(id, TimerKind::ProfileConnect(profile)),
        settings.connect_timeout,
    );
    Ok(())
}

pub fn on_connect_cfm(
    id: SessionId,
    s: &mut Session,
    profile: Profile,
    handle: Option<ChannelHandle>,
    status: ConnectStatus,
    cx: &mut Context<'_>,
    settings: &Settings,
) -> Option<ProfileReport> {
    if !s.state(profile).is_connecting() {
        // Confirmation for an attempt we already gave up on.
        if let (ConnectStatus::Success, Some(h)) = (status, handle) {
            tracing::warn!(peer = %s.addr(), %profile, "late connect confirmation, closing channel");
            cx.send(disconnect_request(profile, h));
        } else {
            unexpected(s, profile, "connect confirmation");
        }
        return None;
    }

    cx.timers
        .cancel(TimerKey::session(id, TimerKind::ProfileConnect(profile)));

    let outcome = match (status, handle) {
        (ConnectStatus::Success, Some(h)) => {
            set_signal_handle(s, profile, h);
            enter(s, profile, ProfileState::Connected, cx);
            if profile == Profile::Streaming {
                streaming::on_signaling_up(id, s, cx, settings);
            }
            ConnectOutcome::Connected
        }
        (ConnectStatus::AuthenticationFailed, _) => {
            enter(s, profile, ProfileState::Disconnected, cx);
            ConnectOutcome::AuthFailed
        }
        (status, _) => {
            tracing::debug!(peer = %s.addr(), %profile, ?status, "profile connect failed");
            enter(s, profile, ProfileState::Disconnected, cx);
            ConnectOutcome::Failed
        }
    };
    Some(ProfileReport::ConnectResult { profile, outcome })
}

/// The connect timer fired. A still-connecting profile counts as failed.
pub fn on_connect_timeout(s: &mut Session, profile: Profile, cx: &mut Context<'_>) -> Option<ProfileReport> {
    if !s.state(profile).is_connecting() {
        unexpected(s, profile, "connect timeout");
        return None;
    }
    tracing::info!(peer = %s.addr(), %profile, "profile connect timed out");
    enter(s, profile, ProfileState::Disconnected, cx);
    Some(ProfileReport::ConnectResult {
        profile,
        outcome: ConnectOutcome::Failed,
    })
}

// ── Disconnect ───────────────────────────────────────────────────────────────

/// Ask `profile` to go down. Returns true if a request is now outstanding.
/// Connecting profiles are left to resolve first. A refused request leaves
/// the profile Disconnected.
pub fn disconnect(s: &mut Session, profile: Profile, cx: &mut Context<'_>) -> bool {
    match profile {
        Profile::Voice => voice::disconnect(s, cx),
        Profile::Streaming => streaming::disconnect(s, cx),
        Profile::Control => control::disconnect(s, cx),
    }
}

/// Common tail of every disconnect path: the signaling channel is gone.
/// A channel lost before its confirmation counts as a failed connect.
pub(crate) fn signaling_down(s: &mut Session, profile: Profile, cx: &mut Context<'_>) -> ProfileReport {
    let was_connecting = s.state(profile).is_connecting();
    enter(s, profile, ProfileState::Disconnected, cx);
    if was_connecting {
        ProfileReport::ConnectResult {
            profile,
            outcome: ConnectOutcome::Failed,
        }
    } else {
        ProfileReport::Disconnected(profile)
    }
}

/// Send the disconnect for a connected profile's signaling channel.
/// Returns true if the request is outstanding. Otherwise the channel is
/// dropped locally and the profile is Disconnected on return.
pub(crate) fn request_disconnect(s: &mut Session, profile: Profile, handle: Option<ChannelHandle>, cx: &mut Context<'_>) -> bool {
    match handle {
        Some(handle) if cx.send(disconnect_request(profile, handle)) => {
            enter(s, profile, ProfileState::Disconnecting, cx);
            return true;
        }
        Some(_) => {}
        None => unexpected(s, profile, "disconnect without channel"),
    }
    tracing::warn!(peer = %s.addr(), %profile, "disconnect not sent, dropping channel");
    match profile {
        Profile::Voice => voice::drop_channel(s, cx),
        Profile::Streaming => streaming::drop_channel(s, cx),
        Profile::Control => {}
    }
    enter(s, profile, ProfileState::Disconnected, cx);
    false
}
