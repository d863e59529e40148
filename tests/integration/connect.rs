use crate::*;

use tandem_core::ProfileState;
use tandem_engine::{GatewayState, TransportRequest};

/// A remembered peer with no capability data is tried on every profile in
/// priority order. Voice fails, Streaming connects, Control never answers:
/// the session still connects, with Control left down.
#[test]
fn test_connect_without_capability_data_settles_on_what_answered() {
    let mut rig = Rig::new().ready();
    let addr = peer(1);
    rig.remember(addr, ProfileSet::EMPTY);

    rig.act(Action::Connect);
    assert_eq!(rig.engine.state(), GatewayState::Connecting);
    assert_eq!(rig.transport.take(), vec![TransportRequest::VoiceConnect { addr }]);

    rig.feed(TransportEvent::VoiceConnectCfm {
        addr,
        handle: None,
        status: ConnectStatus::Failed,
    });
    assert_eq!(rig.transport.take(), vec![TransportRequest::StreamConnect { addr }]);

    rig.feed(TransportEvent::StreamConnectCfm {
        addr,
        handle: Some(ChannelHandle(40)),
        status: ConnectStatus::Success,
    });
    assert_eq!(rig.transport.take(), vec![TransportRequest::ControlConnect { addr }]);
    assert_eq!(rig.terminal_reports(addr), 0, "cycle must wait for control");

    let control_timeout = rig.session_timer(addr, TimerKind::ProfileConnect(Profile::Control));
    rig.fire(control_timeout);

    assert_eq!(rig.terminal_reports(addr), 1);
    assert!(rig.notes.events().contains(&StatusEvent::SessionConnected {
        addr,
        profiles: ProfileSet::single(Profile::Streaming),
    }));

    let s = rig.session(addr);
    assert_eq!(s.voice.state, ProfileState::Disconnected);
    assert_eq!(s.stream.state, ProfileState::Connected);
    assert_eq!(s.control.state, ProfileState::Disconnected);
    assert_eq!(rig.engine.state(), GatewayState::Idle);
    assert_eq!(rig.engine.slots().current(), None);
}

/// A rejected PIN is retried with the next candidate; the one that worked
/// is remembered with the peer.
#[test]
fn test_authentication_failure_retries_with_next_pin() {
    let mut rig = Rig::new().ready();
    let addr = peer(2);
    rig.remember(addr, ProfileSet::single(Profile::Voice));

    rig.act(Action::Connect);
    rig.feed(TransportEvent::PinRequest { addr });
    assert!(rig.transport.contains(&TransportRequest::PinReply {
        addr,
        pin: Some("0000".to_string()),
    }));

    rig.feed(TransportEvent::VoiceConnectCfm {
        addr,
        handle: None,
        status: ConnectStatus::AuthenticationFailed,
    });
    rig.transport.take();
    rig.feed(TransportEvent::PinRequest { addr });
    assert_eq!(
        rig.transport.take(),
        vec![TransportRequest::PinReply {
            addr,
            pin: Some("1234".to_string()),
        }]
    );
    assert_eq!(rig.terminal_reports(addr), 0);

    rig.feed(TransportEvent::VoiceConnectCfm {
        addr,
        handle: Some(ChannelHandle(3)),
        status: ConnectStatus::Success,
    });
    assert_eq!(rig.terminal_reports(addr), 1);
    let mru = rig.store.mru();
    assert_eq!(mru[0].addr, addr);
    assert_eq!(mru[0].pin_index, 1);
}

/// Running out of PIN candidates fails the profile, and with it the cycle.
#[test]
fn test_pin_list_exhaustion_fails_the_session() {
    let mut rig = Rig::new().ready();
    let addr = peer(3);
    rig.remember(addr, ProfileSet::single(Profile::Voice));
    rig.act(Action::Connect);

    let pins = rig.store.pins().len();
    for _ in 0..pins {
        rig.feed(TransportEvent::VoiceConnectCfm {
            addr,
            handle: None,
            status: ConnectStatus::AuthenticationFailed,
        });
    }
    assert_eq!(
        rig.transport.count(|r| matches!(r, TransportRequest::VoiceConnect { .. })),
        pins
    );
    assert_eq!(rig.terminal_reports(addr), 1);
    assert!(rig
        .notes
        .events()
        .contains(&StatusEvent::SessionConnectFailed { addr }));
}

/// Every remembered peer failing falls back to a discovery scan.
#[test]
fn test_failed_remembered_peers_fall_back_to_discovery() {
    let mut rig = Rig::new().ready();
    rig.remember(peer(5), ProfileSet::single(Profile::Control));
    rig.remember(peer(4), ProfileSet::single(Profile::Control));

    rig.act(Action::Connect);
    for addr in [peer(4), peer(5)] {
        assert!(rig.transport.contains(&TransportRequest::ControlConnect { addr }));
        rig.feed(TransportEvent::ControlConnectCfm {
            addr,
            handle: None,
            status: ConnectStatus::Rejected,
        });
        assert_eq!(rig.terminal_reports(addr), 1);
    }
    assert_eq!(rig.engine.state(), GatewayState::Discovering);
    assert_eq!(rig.transport.last(), Some(&TransportRequest::StartInquiry));
    assert_eq!(rig.engine.slots().current(), Some(Action::Connect));
}

/// An inbound connect needs no action and counts as a connected session.
#[test]
fn test_inbound_peer_is_remembered() {
    let mut rig = Rig::new().ready();
    let addr = peer(6);
    rig.feed(TransportEvent::ControlConnectInd {
        addr,
        handle: ChannelHandle(8),
    });
    rig.feed(TransportEvent::ControlConnectCfm {
        addr,
        handle: Some(ChannelHandle(8)),
        status: ConnectStatus::Success,
    });
    assert_eq!(rig.terminal_reports(addr), 1);
    assert_eq!(rig.store.mru()[0].addr, addr);
    assert_eq!(rig.engine.state(), GatewayState::Idle);
}
