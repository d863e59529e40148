use crate::*;

use std::collections::HashSet;

use tandem_engine::discovery::{Candidate, CandidateBuffer, Insert};
use tandem_engine::registry::{Destroy, SessionRegistry};
use tandem_engine::session::Role;
use tandem_engine::{GatewayState, TransportRequest};

/// Deterministic xorshift so failures reproduce.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

// ── Session pool ──────────────────────────────────────────────────────────────

#[test]
fn test_pool_never_exceeds_capacity_or_duplicates_peers() {
    let mut rng = Rng(0x5EED_0001);
    let mut registry = SessionRegistry::with_capacity(3);
    let mut timers = ManualScheduler::new();

    for _ in 0..2_000 {
        if rng.below(3) == 0 {
            let live = registry.ids();
            if !live.is_empty() {
                let id = live[rng.below(live.len() as u64) as usize];
                assert_eq!(registry.destroy(id, &mut timers), Destroy::Destroyed);
                assert_eq!(registry.destroy(id, &mut timers), Destroy::Gone);
            }
        } else {
            let addr = peer(rng.below(6) as u8);
            let existing = registry.find(addr);
            let got = registry.find_or_create(addr, true, Role::Initiator);
            if existing.is_some() {
                assert_eq!(got, existing);
            }
        }

        assert!(registry.len() <= registry.capacity());
        let addrs: HashSet<_> = registry.iter().map(|(_, s)| s.addr()).collect();
        assert_eq!(addrs.len(), registry.len());
    }
}

#[test]
fn test_inbound_flood_is_capped_by_pool() {
    let mut rig = Rig::new().ready();
    let capacity = rig.engine.settings().max_sessions;
    for n in 0..(capacity as u8 * 2) {
        rig.feed(TransportEvent::ControlConnectInd {
            addr: peer(n),
            handle: ChannelHandle(100 + n as u16),
        });
    }
    assert_eq!(rig.engine.registry().len(), capacity);
    assert_eq!(
        rig.notes.count(|n| matches!(n, StatusEvent::SessionRejected { .. })),
        capacity
    );
}

// ── Terminal reports ──────────────────────────────────────────────────────────

fn connecting_rig(addr: BdAddr) -> Rig {
    let mut rig = Rig::new().ready();
    rig.remember(addr, ProfileSet::ALL);
    rig.act(Action::Connect);
    assert_eq!(rig.transport.take(), vec![TransportRequest::VoiceConnect { addr }]);
    rig
}

#[test]
fn test_every_profile_failing_reports_one_failure() {
    let addr = peer(1);
    let mut rig = connecting_rig(addr);
    rig.feed(TransportEvent::VoiceConnectCfm {
        addr,
        handle: None,
        status: ConnectStatus::Failed,
    });
    rig.feed(TransportEvent::StreamConnectCfm {
        addr,
        handle: None,
        status: ConnectStatus::Rejected,
    });
    assert_eq!(rig.terminal_reports(addr), 0);
    let timeout = rig.session_timer(addr, TimerKind::ProfileConnect(Profile::Control));
    rig.fire(timeout);

    assert_eq!(rig.terminal_reports(addr), 1);
    assert_eq!(
        rig.notes.count(|n| matches!(n, StatusEvent::SessionConnectFailed { .. })),
        1
    );
}

#[test]
fn test_power_off_mid_cycle_reports_once_and_closes_late_channel() {
    let addr = peer(2);
    let mut rig = connecting_rig(addr);
    rig.feed(TransportEvent::VoiceConnectCfm {
        addr,
        handle: Some(ChannelHandle(1)),
        status: ConnectStatus::Success,
    });
    assert_eq!(rig.transport.take(), vec![TransportRequest::StreamConnect { addr }]);

    rig.feed(Event::PowerOff);
    assert_eq!(rig.engine.state(), GatewayState::PoweredOff);
    assert_eq!(rig.terminal_reports(addr), 1);
    assert!(rig
        .transport
        .contains(&TransportRequest::VoiceDisconnect { handle: ChannelHandle(1) }));

    rig.feed(TransportEvent::StreamConnectCfm {
        addr,
        handle: Some(ChannelHandle(2)),
        status: ConnectStatus::Success,
    });
    assert_eq!(rig.terminal_reports(addr), 1);
    assert!(rig
        .transport
        .contains(&TransportRequest::StreamDisconnect { handle: ChannelHandle(2) }));
}

#[test]
fn test_inbound_attempt_during_cycle_counts_once() {
    let addr = peer(3);
    let mut rig = connecting_rig(addr);
    let control = ChannelHandle(30);

    rig.feed(TransportEvent::ControlConnectInd { addr, handle: control });
    rig.feed(TransportEvent::VoiceConnectCfm {
        addr,
        handle: Some(ChannelHandle(10)),
        status: ConnectStatus::Success,
    });
    rig.feed(TransportEvent::StreamConnectCfm {
        addr,
        handle: None,
        status: ConnectStatus::Failed,
    });
    assert_eq!(rig.terminal_reports(addr), 0);
    assert_eq!(
        rig.transport.count(|r| matches!(r, TransportRequest::ControlConnect { .. })),
        0
    );

    rig.feed(TransportEvent::ControlConnectCfm {
        addr,
        handle: Some(control),
        status: ConnectStatus::Success,
    });
    assert_eq!(rig.terminal_reports(addr), 1);
    let mut both = ProfileSet::single(Profile::Voice);
    both.insert(Profile::Control);
    assert!(rig.notes.events().contains(&StatusEvent::SessionConnected { addr, profiles: both }));
}

// ── Candidate buffer ──────────────────────────────────────────────────────────

#[test]
fn test_candidate_buffer_stays_sorted_and_bounded() {
    let mut rng = Rng(0x5EED_0002);
    let mut buffer = CandidateBuffer::new(4);

    for _ in 0..2_000 {
        let candidate = Candidate {
            addr: peer(rng.below(10) as u8),
            profiles: ProfileSet::ALL,
            path_loss: rng.below(100) as u8,
            complete: true,
        };
        let existing = buffer
            .as_slice()
            .iter()
            .find(|c| c.addr == candidate.addr)
            .copied();
        let before = buffer.as_slice().to_vec();

        let outcome = buffer.insert(candidate);
        if let Some(old) = existing {
            if candidate.path_loss >= old.path_loss {
                assert_eq!(outcome, Insert::Ignored);
                assert_eq!(buffer.as_slice(), &before[..]);
            }
        }

        let slice = buffer.as_slice();
        assert!(slice.len() <= buffer.capacity());
        assert!(slice.windows(2).all(|w| w[0].path_loss <= w[1].path_loss));
        let addrs: HashSet<_> = slice.iter().map(|c| c.addr).collect();
        assert_eq!(addrs.len(), slice.len());

        if rng.below(8) == 0 {
            buffer.pop_best();
        }
    }
}

// ── Pending slot ──────────────────────────────────────────────────────────────

#[test]
fn test_pending_slot_holds_only_the_latest_action() {
    let mut rng = Rng(0x5EED_0003);
    let addr = peer(4);
    let mut rig = connecting_rig(addr);

    for _ in 0..200 {
        let action = Action::ALL[rng.below(Action::ALL.len() as u64) as usize];
        rig.act(action);
        let expected = if action == Action::None { None } else { Some(action) };
        assert_eq!(rig.engine.slots().pending(), expected);
        assert_eq!(rig.engine.slots().current(), Some(Action::Connect));
    }
}
