use crate::*;

use tandem_core::{CallState, ProfileState};
use tandem_engine::{AudioCommand, GatewayState, TransportRequest};

const SIGNAL: ChannelHandle = ChannelHandle(20);
const MEDIA: ChannelHandle = ChannelHandle(21);

fn streaming_rig(addr: BdAddr) -> Rig {
    let mut rig = Rig::new().ready();
    rig.open_inbound_stream(addr, SIGNAL, MEDIA);
    rig.act(Action::StartStream);
    rig.feed(TransportEvent::StreamStartCfm {
        handle: SIGNAL,
        success: true,
    });
    assert_eq!(rig.engine.state(), GatewayState::Streaming);
    assert_eq!(rig.session(addr).stream.state, ProfileState::Streaming);
    rig.clear();
    rig
}

/// Disconnect while streaming tears the stream down first; the profile
/// disconnect only starts once the suspend has completed.
#[test]
fn test_disconnect_while_streaming_waits_for_teardown() {
    let addr = peer(1);
    let mut rig = streaming_rig(addr);

    rig.act(Action::Disconnect);
    assert_eq!(rig.transport.take(), vec![TransportRequest::StreamSuspend { handle: SIGNAL }]);
    assert_eq!(rig.engine.slots().current(), Some(Action::EndStream));
    assert_eq!(rig.engine.slots().pending(), Some(Action::Disconnect));
    assert_eq!(rig.engine.state(), GatewayState::Streaming);

    rig.feed(TransportEvent::StreamSuspendCfm {
        handle: SIGNAL,
        success: true,
    });
    assert!(rig
        .audio
        .commands()
        .contains(&AudioCommand::DisconnectChannel { handle: MEDIA }));
    assert_eq!(rig.transport.take(), vec![TransportRequest::StreamClose { handle: SIGNAL }]);
    assert_eq!(rig.engine.slots().current(), Some(Action::Disconnect));
    assert_eq!(rig.engine.slots().pending(), None);

    rig.feed(TransportEvent::StreamCloseCfm { handle: SIGNAL });
    assert_eq!(rig.transport.take(), vec![TransportRequest::StreamDisconnect { handle: SIGNAL }]);

    rig.feed(TransportEvent::StreamDisconnected { handle: SIGNAL });
    assert!(rig.notes.events().contains(&StatusEvent::SessionDisconnected { addr }));
    assert_eq!(rig.engine.state(), GatewayState::Idle);
    assert_eq!(rig.engine.slots().current(), None);

    let destroy = rig.session_timer(addr, TimerKind::DestroySession);
    rig.fire(destroy);
    assert!(rig.engine.registry().is_empty());
}

/// A profile still being accepted when Disconnect arrives holds the
/// disconnect open until its attempt resolves, here by timing out.
#[test]
fn test_disconnect_finishes_when_last_profile_fails_to_connect() {
    let mut rig = Rig::new().ready();
    let addr = peer(7);
    let voice = ChannelHandle(10);
    rig.feed(TransportEvent::VoiceConnectInd { addr, handle: voice });
    rig.feed(TransportEvent::VoiceConnectCfm {
        addr,
        handle: Some(voice),
        status: ConnectStatus::Success,
    });
    rig.feed(TransportEvent::ControlConnectInd {
        addr,
        handle: ChannelHandle(12),
    });
    assert_eq!(rig.session(addr).control.state, ProfileState::Paged);

    rig.act(Action::Disconnect);
    assert_eq!(rig.engine.slots().current(), Some(Action::Disconnect));
    rig.feed(TransportEvent::VoiceDisconnected { handle: voice });
    assert_eq!(rig.engine.slots().current(), Some(Action::Disconnect));
    assert_eq!(
        rig.notes.count(|n| matches!(n, StatusEvent::SessionDisconnected { .. })),
        0
    );

    let control = rig.session_timer(addr, TimerKind::ProfileConnect(Profile::Control));
    rig.fire(control);
    assert_eq!(
        rig.notes.count(|n| matches!(n, StatusEvent::SessionDisconnected { addr: a } if *a == addr)),
        1
    );
    assert!(!rig.session(addr).was_connected);
    assert_eq!(rig.engine.slots().current(), None);
    assert_eq!(rig.engine.state(), GatewayState::Idle);
}

/// A stack that will not take the disconnect request still lets the
/// session go down: the channels are dropped locally.
#[test]
fn test_refused_disconnect_drops_channels_locally() {
    let mut rig = Rig::new().ready();
    let addr = peer(8);
    let voice = ChannelHandle(10);
    let control = ChannelHandle(12);
    rig.feed(TransportEvent::VoiceConnectInd { addr, handle: voice });
    rig.feed(TransportEvent::VoiceConnectCfm {
        addr,
        handle: Some(voice),
        status: ConnectStatus::Success,
    });
    rig.feed(TransportEvent::ControlConnectInd { addr, handle: control });
    rig.feed(TransportEvent::ControlConnectCfm {
        addr,
        handle: Some(control),
        status: ConnectStatus::Success,
    });
    rig.clear();

    rig.transport.refuse_disconnects(true);
    rig.act(Action::Disconnect);
    assert!(rig.transport.requests().is_empty());
    let s = rig.session(addr);
    assert_eq!(s.voice.state, ProfileState::Disconnected);
    assert_eq!(s.control.state, ProfileState::Disconnected);
    assert!(!s.handles.any());
    assert!(rig.notes.events().contains(&StatusEvent::SessionDisconnected { addr }));
    assert_eq!(rig.engine.slots().current(), None);
    assert_eq!(rig.engine.state(), GatewayState::Idle);
}

#[test]
fn test_refused_stream_disconnect_after_close_completes() {
    let addr = peer(9);
    let mut rig = streaming_rig(addr);
    rig.act(Action::Disconnect);
    rig.feed(TransportEvent::StreamSuspendCfm {
        handle: SIGNAL,
        success: true,
    });
    assert_eq!(
        rig.transport.take(),
        vec![
            TransportRequest::StreamSuspend { handle: SIGNAL },
            TransportRequest::StreamClose { handle: SIGNAL },
        ]
    );

    rig.transport.refuse_disconnects(true);
    rig.feed(TransportEvent::StreamCloseCfm { handle: SIGNAL });
    assert!(rig.transport.requests().is_empty());
    assert_eq!(rig.session(addr).stream.state, ProfileState::Disconnected);
    assert!(rig.notes.events().contains(&StatusEvent::SessionDisconnected { addr }));
    assert_eq!(rig.engine.slots().current(), None);
    assert_eq!(rig.engine.state(), GatewayState::Idle);
}

#[test]
fn test_pause_then_play_from_the_dispatcher() {
    let addr = peer(2);
    let mut rig = streaming_rig(addr);

    rig.act(Action::EndStream);
    rig.feed(TransportEvent::StreamSuspendCfm {
        handle: SIGNAL,
        success: true,
    });
    assert_eq!(rig.engine.state(), GatewayState::Idle);
    assert_eq!(rig.session(addr).stream.state, ProfileState::Open);
    rig.transport.take();

    rig.act(Action::StartStream);
    assert_eq!(rig.transport.take(), vec![TransportRequest::StreamStart { handle: SIGNAL }]);
    assert_eq!(rig.engine.state(), GatewayState::Streaming);
}

/// The peer suspending on its own leaves streaming without any action.
#[test]
fn test_peer_suspend_returns_gateway_to_idle() {
    let addr = peer(3);
    let mut rig = streaming_rig(addr);
    rig.feed(TransportEvent::StreamSuspendInd { handle: SIGNAL });
    assert_eq!(rig.engine.state(), GatewayState::Idle);
    assert_eq!(rig.audio.last(), Some(&AudioCommand::EnterIdle));
}

#[test]
fn test_call_lifecycle_with_parked_disconnect() {
    let mut rig = Rig::new().ready();
    let addr = peer(4);
    let voice = ChannelHandle(10);
    rig.feed(TransportEvent::VoiceConnectInd { addr, handle: voice });
    rig.feed(TransportEvent::VoiceConnectCfm {
        addr,
        handle: Some(voice),
        status: ConnectStatus::Success,
    });
    rig.clear();

    rig.act(Action::StartCall);
    assert_eq!(
        rig.transport.take(),
        vec![
            TransportRequest::VoiceStartCall { handle: voice },
            TransportRequest::VoiceAudioConnect { handle: voice },
        ]
    );
    assert_eq!(rig.engine.state(), GatewayState::InCall);

    rig.feed(TransportEvent::VoiceAudio {
        handle: voice,
        audio: Some(ChannelHandle(11)),
    });
    rig.feed(TransportEvent::VoiceCallStatus {
        handle: voice,
        active: true,
    });
    assert_eq!(rig.session(addr).voice.call, CallState::Active);
    assert_eq!(rig.engine.slots().current(), None);

    rig.act(Action::Disconnect);
    assert_eq!(rig.transport.take(), vec![TransportRequest::VoiceEndCall { handle: voice }]);
    assert_eq!(rig.engine.slots().pending(), Some(Action::Disconnect));

    rig.feed(TransportEvent::VoiceCallStatus {
        handle: voice,
        active: false,
    });
    assert_eq!(
        rig.transport.take(),
        vec![
            TransportRequest::VoiceAudioDisconnect { handle: voice },
            TransportRequest::VoiceDisconnect { handle: voice },
        ]
    );
    assert_eq!(rig.engine.slots().current(), Some(Action::Disconnect));
}

#[test]
fn test_actions_before_ready_run_once_stack_is_up() {
    let mut rig = Rig::new();
    rig.feed(Event::Start);
    rig.act(Action::Inquire);
    rig.act(Action::Discover);
    assert!(rig.transport.requests().is_empty());
    assert_eq!(rig.engine.slots().pending(), Some(Action::Discover));

    rig.feed(TransportEvent::Ready);
    assert_eq!(rig.engine.state(), GatewayState::Discovering);
    assert_eq!(rig.engine.slots().current(), Some(Action::Discover));
    assert_eq!(rig.transport.requests(), &[TransportRequest::StartInquiry]);
}

#[test]
fn test_power_off_ends_everything() {
    let addr = peer(5);
    let mut rig = streaming_rig(addr);
    rig.feed(Event::PowerOff);
    assert_eq!(rig.engine.state(), GatewayState::PoweredOff);
    assert!(rig.transport.contains(&TransportRequest::StreamClose { handle: SIGNAL }));

    rig.transport.take();
    rig.feed(TransportEvent::StreamConnectInd {
        addr: peer(6),
        handle: ChannelHandle(50),
    });
    assert_eq!(
        rig.transport.requests(),
        &[TransportRequest::Respond {
            addr: peer(6),
            profile: Profile::Streaming,
            handle: ChannelHandle(50),
            accept: false,
        }]
    );
}
