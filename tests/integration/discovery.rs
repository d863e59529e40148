use crate::*;

use tandem_engine::discovery::{Candidate, CandidateBuffer, Insert};
use tandem_engine::{GatewayState, TransportRequest};

fn candidate(n: u8, path_loss: u8) -> Candidate {
    Candidate {
        addr: peer(n),
        profiles: ProfileSet::ALL,
        path_loss,
        complete: true,
    }
}

/// A full buffer turns away a candidate ranking below its worst entry.
#[test]
fn test_full_buffer_ignores_worse_candidate() {
    let mut buffer = CandidateBuffer::new(3);
    for (n, loss) in [(1, 30), (2, 10), (3, 20)] {
        assert_eq!(buffer.insert(candidate(n, loss)), Insert::Added);
    }
    let before = buffer.as_slice().to_vec();

    assert_eq!(buffer.insert(candidate(4, 31)), Insert::Full);
    assert_eq!(buffer.as_slice(), &before[..]);
    assert_eq!(
        buffer.as_slice().iter().map(|c| c.path_loss).collect::<Vec<_>>(),
        vec![10, 20, 30]
    );
}

#[test]
fn test_scan_keeps_only_the_nearest_candidates() {
    let settings = Settings {
        candidate_capacity: 2,
        ..Settings::default()
    };
    let mut rig = Rig::with_settings(settings).ready();
    rig.act(Action::Discover);
    assert_eq!(rig.engine.state(), GatewayState::Discovering);
    assert_eq!(rig.transport.take(), vec![TransportRequest::StartInquiry]);

    for (n, rssi) in [(1, -40), (2, -50), (3, -60)] {
        rig.feed(TransportEvent::InquiryResult {
            addr: peer(n),
            rssi,
            eir: Vec::new(),
        });
    }
    let kept: Vec<_> = rig
        .engine
        .discovery()
        .candidates()
        .iter()
        .map(|c| (c.addr, c.path_loss))
        .collect();
    assert_eq!(kept, vec![(peer(1), 44), (peer(2), 54)]);
    assert_eq!(
        rig.notes.count(|n| matches!(n, StatusEvent::CandidateFound { .. })),
        2
    );
}

/// Profiles a candidate did not advertise are probed one at a time before
/// it is connected to.
#[test]
fn test_discover_probes_then_connects_best_candidate() {
    let mut rig = Rig::new().ready();
    let addr = peer(1);
    rig.act(Action::Discover);
    rig.feed(TransportEvent::InquiryResult {
        addr,
        rssi: -40,
        eir: Vec::new(),
    });
    rig.transport.take();

    rig.feed(TransportEvent::InquiryComplete);
    assert_eq!(rig.engine.state(), GatewayState::Probing);
    assert_eq!(
        rig.transport.take(),
        vec![TransportRequest::Search {
            addr,
            profile: Profile::Voice
        }]
    );

    for (profile, found) in [(Profile::Voice, true), (Profile::Streaming, true)] {
        rig.feed(TransportEvent::SearchResult { addr, profile, found });
    }
    assert_eq!(
        rig.transport.take(),
        vec![
            TransportRequest::Search {
                addr,
                profile: Profile::Streaming
            },
            TransportRequest::Search {
                addr,
                profile: Profile::Control
            },
        ]
    );
    rig.feed(TransportEvent::SearchResult {
        addr,
        profile: Profile::Control,
        found: false,
    });
    assert_eq!(rig.engine.state(), GatewayState::Connecting);
    assert_eq!(rig.transport.take(), vec![TransportRequest::VoiceConnect { addr }]);

    rig.feed(TransportEvent::VoiceConnectCfm {
        addr,
        handle: Some(ChannelHandle(1)),
        status: ConnectStatus::Success,
    });
    assert_eq!(rig.transport.take(), vec![TransportRequest::StreamConnect { addr }]);
    rig.feed(TransportEvent::StreamConnectCfm {
        addr,
        handle: Some(ChannelHandle(2)),
        status: ConnectStatus::Success,
    });

    assert!(rig.notes.events().contains(&StatusEvent::DiscoveryFinished { found: Some(addr) }));
    assert_eq!(rig.terminal_reports(addr), 1);
    assert_eq!(rig.engine.state(), GatewayState::Idle);
    assert_eq!(rig.engine.slots().current(), None);
    assert!(!rig.engine.discovery().is_active());
}

#[test]
fn test_failed_blocking_probe_moves_to_next_candidate() {
    let mut rig = Rig::new().ready();
    rig.act(Action::Discover);
    rig.feed(TransportEvent::InquiryResult {
        addr: peer(1),
        rssi: -40,
        eir: Vec::new(),
    });
    rig.feed(TransportEvent::InquiryResult {
        addr: peer(2),
        rssi: -60,
        eir: Vec::new(),
    });
    rig.feed(TransportEvent::InquiryComplete);
    rig.feed(TransportEvent::SearchResult {
        addr: peer(1),
        profile: Profile::Voice,
        found: true,
    });
    rig.transport.take();

    rig.feed(TransportEvent::SearchResult {
        addr: peer(1),
        profile: Profile::Streaming,
        found: false,
    });
    assert_eq!(
        rig.transport.take(),
        vec![TransportRequest::Search {
            addr: peer(2),
            profile: Profile::Voice
        }]
    );
    assert!(rig.engine.registry().find(peer(1)).is_none());
}

#[test]
fn test_complete_advertisement_skips_probing() {
    let mut rig = Rig::new().ready();
    let addr = peer(7);
    rig.act(Action::Discover);
    rig.feed(TransportEvent::InquiryResult {
        addr,
        rssi: -40,
        eir: eir_complete(&[Profile::Streaming]),
    });
    rig.transport.take();

    let window = TimerKey::system(TimerKind::DiscoveryWindow);
    rig.fire(window);
    assert_eq!(
        rig.transport.take(),
        vec![TransportRequest::StopInquiry, TransportRequest::StreamConnect { addr }]
    );
}

#[test]
fn test_peer_sharing_no_profile_is_not_ranked() {
    let mut rig = Rig::new().ready();
    rig.store.set_local_profiles(ProfileSet::single(Profile::Voice));
    rig.act(Action::Discover);
    rig.feed(TransportEvent::InquiryResult {
        addr: peer(1),
        rssi: -40,
        eir: eir_complete(&[Profile::Streaming, Profile::Control]),
    });
    assert!(rig.engine.discovery().candidates().is_empty());
}

#[test]
fn test_inquiry_only_reports_without_connecting() {
    let mut rig = Rig::new().ready();
    rig.act(Action::Inquire);
    rig.feed(TransportEvent::InquiryResult {
        addr: peer(1),
        rssi: -40,
        eir: Vec::new(),
    });
    rig.feed(TransportEvent::InquiryComplete);

    assert!(rig.notes.events().contains(&StatusEvent::DiscoveryFinished { found: None }));
    assert_eq!(
        rig.transport.count(|r| matches!(
            r,
            TransportRequest::Search { .. } | TransportRequest::VoiceConnect { .. }
        )),
        0
    );
    assert_eq!(rig.engine.state(), GatewayState::Idle);
    assert_eq!(rig.engine.slots().current(), None);
}
