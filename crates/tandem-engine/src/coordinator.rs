//! Cross-profile coordinator.
//!
//! Connects a session's profiles one at a time in priority order and folds
//! their individual outcomes into one session-level result. Every connect
//! cycle ends in exactly one `ConnectSucceeded` or `ConnectFailed`:
//! success as soon as every target profile has answered and at least one
//! came up, failure if none did or the cycle was cancelled.

use tandem_core::record::MruEntry;
use tandem_core::{BdAddr, Profile, ProfileSet};

use crate::context::Context;
use crate::notify::StatusEvent;
use crate::profiles::{self, ConnectOutcome};
use crate::registry::SessionId;
use crate::session::{Role, Session};
use crate::settings::Settings;
use crate::timer::{TimerKey, TimerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionReport {
    ConnectSucceeded { id: SessionId, addr: BdAddr, profiles: ProfileSet },
    ConnectFailed { id: SessionId, addr: BdAddr },
    /// Every profile is down after the session had been connected.
    Disconnected { id: SessionId, addr: BdAddr },
}

/// Profiles this cycle tries: what the peer supports and we enable.
fn target(s: &Session, local: ProfileSet) -> ProfileSet {
    s.supported.intersection(local)
}

fn schedule_destroy(id: SessionId, cx: &mut Context<'_>, settings: &Settings) {
    cx.timers
        .schedule(TimerKey::session(id, TimerKind::DestroySession), settings.destroy_delay);
}

/// Begin a connect cycle for `s`.
pub fn request_connect(
    id: SessionId,
    s: &mut Session,
    local: ProfileSet,
    cx: &mut Context<'_>,
    settings: &Settings,
) -> Vec<SessionReport> {
    if s.connecting {
        tracing::debug!(peer = %s.addr(), "connect already in progress");
        return Vec::new();
    }
    cx.timers.cancel(TimerKey::session(id, TimerKind::DestroySession));
    if s.all_disconnected() {
        s.role = Role::Initiator;
    }
    s.connecting = true;
    s.disconnect_pending = false;
    s.attempted = ProfileSet::EMPTY;
    s.responded = ProfileSet::EMPTY;
    s.succeeded = ProfileSet::EMPTY;

    let target = target(s, local);
    tracing::info!(peer = %s.addr(), profiles = ?target, "session connect");
    advance(id, s, local, cx, settings)
}

/// Issue the next profile connect, or finish the cycle once nothing is
/// left to try.
fn advance(
    id: SessionId,
    s: &mut Session,
    local: ProfileSet,
    cx: &mut Context<'_>,
    settings: &Settings,
) -> Vec<SessionReport> {
    for profile in target(s, local).iter() {
        if s.attempted.contains(profile) || s.responded.contains(profile) {
            continue;
        }
        s.attempted.insert(profile);

        let state = s.state(profile);
        if state.is_connecting() {
            // An inbound attempt is already underway; its result counts.
            return Vec::new();
        }
        if !state.is_disconnected() {
            s.responded.insert(profile);
            if state.is_connected() {
                s.succeeded.insert(profile);
            }
            continue;
        }

        match profiles::connect(id, s, profile, cx, settings) {
            Ok(()) => return Vec::new(),
            Err(e) => {
                tracing::info!(peer = %s.addr(), %profile, error = %e, "profile connect not started");
                s.responded.insert(profile);
            }
        }
    }
    finish(id, s, cx, settings)
}

fn finish(id: SessionId, s: &mut Session, cx: &mut Context<'_>, settings: &Settings) -> Vec<SessionReport> {
    s.connecting = false;
    let addr = s.addr();
    if s.succeeded.is_empty() {
        tracing::info!(peer = %addr, "session connect failed");
        cx.notify(StatusEvent::SessionConnectFailed { addr });
        if s.all_disconnected() {
            schedule_destroy(id, cx, settings);
        }
        return vec![SessionReport::ConnectFailed { id, addr }];
    }
    let profiles = s.succeeded;
    connected(id, s, profiles, cx)
}

fn connected(id: SessionId, s: &mut Session, profiles: ProfileSet, cx: &mut Context<'_>) -> Vec<SessionReport> {
    let addr = s.addr();
    s.was_connected = true;
    tracing::info!(peer = %addr, ?profiles, "session connected");
    cx.store.remember(MruEntry {
        addr,
        profiles,
        pin_index: s.pin_index,
    });
    cx.notify(StatusEvent::SessionConnected { addr, profiles });
    vec![SessionReport::ConnectSucceeded { id, addr, profiles }]
}

/// Retry `profile` with the next PIN candidate. False once the list is
/// exhausted or the retry could not be started.
fn retry_with_next_pin(
    id: SessionId,
    s: &mut Session,
    profile: Profile,
    cx: &mut Context<'_>,
    settings: &Settings,
) -> bool {
    let next = s.pin_index as usize + 1;
    if next >= cx.store.pins().len() {
        tracing::info!(peer = %s.addr(), %profile, "pin candidates exhausted");
        return false;
    }
    s.pin_index = next as u8;
    tracing::info!(peer = %s.addr(), %profile, pin_index = next, "authentication failed, retrying");
    profiles::connect(id, s, profile, cx, settings).is_ok()
}

/// Fold one profile's connect outcome into the session.
pub fn on_profile_result(
    id: SessionId,
    s: &mut Session,
    profile: Profile,
    outcome: ConnectOutcome,
    local: ProfileSet,
    cx: &mut Context<'_>,
    settings: &Settings,
) -> Vec<SessionReport> {
    cx.timers
        .cancel(TimerKey::session(id, TimerKind::ProfileConnect(profile)));

    if outcome == ConnectOutcome::Connected && s.disconnect_pending {
        tracing::info!(peer = %s.addr(), %profile, "connected after cancel, disconnecting");
        profiles::disconnect(s, profile, cx);
    }

    if !s.connecting {
        // Inbound, or a profile resolving after the cycle was cancelled.
        if outcome == ConnectOutcome::Connected {
            s.supported.insert(profile);
            if !s.was_connected && !s.disconnect_pending {
                return connected(id, s, ProfileSet::single(profile), cx);
            }
        }
        return on_profile_down(id, s, cx, settings);
    }

    if outcome == ConnectOutcome::AuthFailed && retry_with_next_pin(id, s, profile, cx, settings) {
        return Vec::new();
    }

    s.responded.insert(profile);
    if outcome == ConnectOutcome::Connected {
        s.succeeded.insert(profile);
    }
    advance(id, s, local, cx, settings)
}

/// Take every profile down. A cycle still in flight ends here as a
/// failure; its outstanding attempt is disconnected once it resolves.
pub fn request_disconnect(
    id: SessionId,
    s: &mut Session,
    cx: &mut Context<'_>,
    settings: &Settings,
) -> Vec<SessionReport> {
    let mut reports = Vec::new();
    s.disconnect_pending = true;
    if s.connecting {
        s.connecting = false;
        let addr = s.addr();
        tracing::info!(peer = %addr, "session connect cancelled");
        cx.notify(StatusEvent::SessionConnectFailed { addr });
        reports.push(SessionReport::ConnectFailed { id, addr });
    }
    for profile in Profile::PRIORITY {
        profiles::disconnect(s, profile, cx);
    }
    reports.extend(on_profile_down(id, s, cx, settings));
    reports
}

/// A profile reached Disconnected. Completes the session-level disconnect
/// once all three are down.
pub fn on_profile_down(
    id: SessionId,
    s: &mut Session,
    cx: &mut Context<'_>,
    settings: &Settings,
) -> Vec<SessionReport> {
    if !s.all_disconnected() {
        return Vec::new();
    }
    s.disconnect_pending = false;
    schedule_destroy(id, cx, settings);
    if !s.was_connected {
        return Vec::new();
    }
    s.was_connected = false;
    let addr = s.addr();
    tracing::info!(peer = %addr, "session disconnected");
    cx.notify(StatusEvent::SessionDisconnected { addr });
    vec![SessionReport::Disconnected { id, addr }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChannelHandle, ConnectStatus};
    use crate::profiles::ProfileReport;
    use crate::registry::SessionRegistry;
    use crate::test_support::Collaborators;
    use crate::transport::TransportRequest;
    use tandem_core::ProfileState;
    use crate::store::ConfigStore;

    fn setup(supported: ProfileSet) -> (SessionRegistry, SessionId) {
        let mut reg = SessionRegistry::with_capacity(1);
        let id = reg
            .find_or_create(BdAddr::new([9; 6]), true, Role::Initiator)
            .unwrap();
        reg.get_mut(id).unwrap().supported = supported;
        (reg, id)
    }

    fn cfm(
        id: SessionId,
        s: &mut Session,
        c: &mut Collaborators,
        profile: Profile,
        status: ConnectStatus,
        handle: u16,
    ) -> Vec<SessionReport> {
        let settings = Settings::default();
        let report = profiles::on_connect_cfm(
            id,
            s,
            profile,
            Some(ChannelHandle(handle)),
            status,
            &mut c.cx(),
            &settings,
        );
        match report {
            Some(ProfileReport::ConnectResult { profile, outcome }) => {
                on_profile_result(id, s, profile, outcome, ProfileSet::ALL, &mut c.cx(), &settings)
            }
            other => panic!("expected connect result, got {other:?}"),
        }
    }

    #[test]
    fn profiles_are_tried_one_at_a_time_in_priority_order() {
        let (mut reg, id) = setup(ProfileSet::ALL);
        let mut c = Collaborators::new();
        let s = reg.get_mut(id).unwrap();
        let settings = Settings::default();

        assert!(request_connect(id, s, ProfileSet::ALL, &mut c.cx(), &settings).is_empty());
        assert_eq!(c.transport.take(), vec![TransportRequest::VoiceConnect { addr: s.addr() }]);

        assert!(cfm(id, s, &mut c, Profile::Voice, ConnectStatus::Success, 1).is_empty());
        assert_eq!(c.transport.take(), vec![TransportRequest::StreamConnect { addr: s.addr() }]);
    }

    #[test]
    fn partial_failure_still_succeeds_once() {
        let (mut reg, id) = setup(ProfileSet::ALL);
        let mut c = Collaborators::new();
        let settings = Settings::default();
        let s = reg.get_mut(id).unwrap();

        request_connect(id, s, ProfileSet::ALL, &mut c.cx(), &settings);
        assert!(cfm(id, s, &mut c, Profile::Voice, ConnectStatus::Failed, 1).is_empty());
        assert!(cfm(id, s, &mut c, Profile::Streaming, ConnectStatus::Success, 2).is_empty());

        // Control never answers.
        let timeout = profiles::on_connect_timeout(s, Profile::Control, &mut c.cx()).unwrap();
        let ProfileReport::ConnectResult { outcome, .. } = timeout else {
            panic!("expected connect result");
        };
        let reports = on_profile_result(id, s, Profile::Control, outcome, ProfileSet::ALL, &mut c.cx(), &settings);
        assert_eq!(
            reports,
            vec![SessionReport::ConnectSucceeded {
                id,
                addr: s.addr(),
                profiles: ProfileSet::single(Profile::Streaming),
            }]
        );
        assert_eq!(s.control.state, ProfileState::Disconnected);
        assert_eq!(c.notes.count(|e| matches!(e, StatusEvent::SessionConnected { .. })), 1);
        assert_eq!(c.store.mru()[0].profiles, ProfileSet::single(Profile::Streaming));
    }

    #[test]
    fn nothing_to_try_fails_immediately() {
        let (mut reg, id) = setup(ProfileSet::single(Profile::Control));
        let mut c = Collaborators::new();
        let s = reg.get_mut(id).unwrap();
        let local = ProfileSet::single(Profile::Voice);
        let reports = request_connect(id, s, local, &mut c.cx(), &Settings::default());
        assert_eq!(reports, vec![SessionReport::ConnectFailed { id, addr: s.addr() }]);
        assert!(c.timers.is_armed(&TimerKey::session(id, TimerKind::DestroySession)));
    }

    #[test]
    fn refused_requests_fall_through_to_failure() {
        let (mut reg, id) = setup(ProfileSet::ALL);
        let mut c = Collaborators::new();
        for p in Profile::PRIORITY {
            c.transport.refuse_connect(p);
        }
        let s = reg.get_mut(id).unwrap();
        let reports = request_connect(id, s, ProfileSet::ALL, &mut c.cx(), &Settings::default());
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0], SessionReport::ConnectFailed { .. }));
    }

    #[test]
    fn auth_failure_retries_with_next_pin() {
        let (mut reg, id) = setup(ProfileSet::single(Profile::Voice));
        let mut c = Collaborators::new();
        let s = reg.get_mut(id).unwrap();
        request_connect(id, s, ProfileSet::ALL, &mut c.cx(), &Settings::default());
        c.transport.take();

        assert!(cfm(id, s, &mut c, Profile::Voice, ConnectStatus::AuthenticationFailed, 1).is_empty());
        assert_eq!(s.pin_index, 1);
        assert_eq!(c.transport.take(), vec![TransportRequest::VoiceConnect { addr: s.addr() }]);

        // Exhaust the remaining three candidates.
        for _ in 0..2 {
            cfm(id, s, &mut c, Profile::Voice, ConnectStatus::AuthenticationFailed, 1);
        }
        let reports = cfm(id, s, &mut c, Profile::Voice, ConnectStatus::AuthenticationFailed, 1);
        assert!(matches!(reports[..], [SessionReport::ConnectFailed { .. }]));
        assert_eq!(s.pin_index, 3);
    }

    #[test]
    fn disconnect_during_connect_reports_failure_once() {
        let (mut reg, id) = setup(ProfileSet::ALL);
        let mut c = Collaborators::new();
        let settings = Settings::default();
        let s = reg.get_mut(id).unwrap();
        request_connect(id, s, ProfileSet::ALL, &mut c.cx(), &settings);

        let reports = request_disconnect(id, s, &mut c.cx(), &settings);
        assert!(matches!(reports[..], [SessionReport::ConnectFailed { .. }]));

        // The outstanding voice attempt resolves and is torn straight down.
        c.transport.take();
        assert!(cfm(id, s, &mut c, Profile::Voice, ConnectStatus::Success, 1).is_empty());
        assert_eq!(
            c.transport.take(),
            vec![TransportRequest::VoiceDisconnect { handle: ChannelHandle(1) }]
        );
        assert_eq!(c.notes.count(|e| matches!(e, StatusEvent::SessionConnectFailed { .. })), 1);
        assert_eq!(c.notes.count(|e| matches!(e, StatusEvent::SessionConnected { .. })), 0);
    }
}
