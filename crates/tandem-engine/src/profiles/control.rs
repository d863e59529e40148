//! Control profile: signaling and pass-through commands from the peer.

use tandem_core::{Profile, ProfileState};

use super::{request_disconnect, signaling_down, unexpected, ProfileReport};
use crate::context::Context;
use crate::event::TransportEvent;
use crate::session::Session;

const P: Profile = Profile::Control;

pub fn disconnect(s: &mut Session, cx: &mut Context<'_>) -> bool {
    match s.control.state {
        ProfileState::Connected => {
            let handle = s.handles.control;
            request_disconnect(s, P, handle, cx)
        }
        ProfileState::Disconnecting => true,
        _ => false,
    }
}

pub fn on_event(s: &mut Session, ev: &TransportEvent, cx: &mut Context<'_>) -> Vec<ProfileReport> {
    match ev {
        TransportEvent::ControlPassthrough { op, .. } => {
            if s.control.state != ProfileState::Connected {
                unexpected(s, P, "passthrough");
                return Vec::new();
            }
            tracing::debug!(peer = %s.addr(), ?op, "passthrough");
            vec![ProfileReport::Passthrough(*op)]
        }
        TransportEvent::ControlDisconnected { .. } => {
            if s.control.state.is_disconnected() {
                unexpected(s, P, "disconnected");
                return Vec::new();
            }
            vec![signaling_down(s, P, cx)]
        }
        other => {
            tracing::warn!(peer = %s.addr(), event = ?other, "not a control event, dropped");
            Vec::new()
        }
    }
}
