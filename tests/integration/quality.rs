use crate::*;

use tandem_core::{Quality, QualityChoice};
use tandem_engine::arbiter::{select_quality, LinkSample};
use tandem_engine::TransportRequest;

const TIERS: [Quality; 5] = [Quality::Unknown, Quality::Low, Quality::Medium, Quality::Good, Quality::High];

/// Two open streams on Good and High links, one of them below the top
/// data-rate tier: the shared quality drops to Low with its bitpools.
#[test]
fn test_scatternet_selects_below_weakest_link() {
    let mut rig = Rig::new().ready();
    let (a, b) = (peer(1), peer(2));

    rig.open_inbound_stream(a, ChannelHandle(10), ChannelHandle(11));
    assert!(rig.transport.contains(&TransportRequest::ReadLinkInfo { addr: a }));
    rig.feed(TransportEvent::LinkInfo {
        addr: a,
        quality: Quality::Good,
        edr: true,
    });
    let single = rig.audio.last_quality().unwrap();
    assert_eq!(single.quality, Quality::Good);
    assert_eq!(single.bitpool, 45);

    rig.open_inbound_stream(b, ChannelHandle(20), ChannelHandle(21));
    rig.feed(TransportEvent::LinkInfo {
        addr: b,
        quality: Quality::High,
        edr: false,
    });

    let expected = QualityChoice {
        quality: Quality::Low,
        bitpool: 29,
        poor_link_bitpool: 20,
    };
    assert_eq!(rig.audio.last_quality(), Some(expected));
    assert_eq!(rig.engine.snapshot().quality, Some(expected));
    assert!(rig
        .notes
        .events()
        .contains(&StatusEvent::QualityChanged { choice: expected }));
}

#[test]
fn test_both_links_fast_costs_one_tier() {
    let mut rig = Rig::new().ready();
    let (a, b) = (peer(3), peer(4));
    rig.open_inbound_stream(a, ChannelHandle(10), ChannelHandle(11));
    rig.open_inbound_stream(b, ChannelHandle(20), ChannelHandle(21));
    for addr in [a, b] {
        rig.feed(TransportEvent::LinkInfo {
            addr,
            quality: Quality::High,
            edr: true,
        });
    }
    assert_eq!(rig.audio.last_quality().unwrap().quality, Quality::Good);
}

/// A stream going away lets the survivor climb back to its own tier.
#[test]
fn test_closing_a_stream_rearbitrates() {
    let mut rig = Rig::new().ready();
    let (a, b) = (peer(5), peer(6));
    rig.open_inbound_stream(a, ChannelHandle(10), ChannelHandle(11));
    rig.open_inbound_stream(b, ChannelHandle(20), ChannelHandle(21));
    for addr in [a, b] {
        rig.feed(TransportEvent::LinkInfo {
            addr,
            quality: Quality::High,
            edr: true,
        });
    }
    rig.feed(TransportEvent::StreamCloseInd {
        handle: ChannelHandle(20),
    });
    assert_eq!(rig.audio.last_quality().unwrap().quality, Quality::High);
}

/// Adding a concurrent stream never raises the selected tier.
#[test]
fn test_second_stream_never_raises_quality() {
    for &q1 in &TIERS {
        for edr1 in [false, true] {
            let first = LinkSample {
                quality: q1,
                edr: edr1,
                max_bitpool: 53,
            };
            let alone = select_quality(&[first], 53).unwrap();
            for &q2 in &TIERS {
                for edr2 in [false, true] {
                    let second = LinkSample {
                        quality: q2,
                        edr: edr2,
                        max_bitpool: 53,
                    };
                    let shared = select_quality(&[first, second], 53).unwrap();
                    assert!(
                        shared.quality <= alone.quality,
                        "{q1:?}/{edr1} + {q2:?}/{edr2}: {:?} > {:?}",
                        shared.quality,
                        alone.quality
                    );
                    assert!(shared.bitpool <= alone.bitpool);
                }
            }
        }
    }
}
