//! Extended inquiry response parsing.
//!
//! EIR data is a sequence of `[len][type][len-1 bytes]` structures. Only
//! the service class lists and the TX power level are used here.

use tandem_core::{Profile, ProfileSet};

const UUID16_INCOMPLETE: u8 = 0x02;
const UUID16_COMPLETE: u8 = 0x03;
const UUID128_INCOMPLETE: u8 = 0x06;
const UUID128_COMPLETE: u8 = 0x07;
const TX_POWER: u8 = 0x0A;

/// Low bytes of the Bluetooth base UUID, as they appear little-endian in
/// a 128-bit service class entry.
const BASE_UUID_LE: [u8; 12] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00,
];

/// What a peer advertised about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Advertised {
    pub profiles: ProfileSet,
    /// Some service class list was present.
    pub listed: bool,
    /// Every list present was marked complete.
    pub complete: bool,
    pub tx_power: Option<i8>,
}

fn profile_for_uuid16(uuid: u16) -> Option<Profile> {
    match uuid {
        0x111E | 0x1108 => Some(Profile::Voice),
        0x110B => Some(Profile::Streaming),
        0x110E | 0x110C | 0x110F => Some(Profile::Control),
        _ => None,
    }
}

pub fn parse(eir: &[u8]) -> Advertised {
    let mut adv = Advertised {
        complete: true,
        ..Advertised::default()
    };
    let mut rest = eir;
    while let [len, tail @ ..] = rest {
        let len = *len as usize;
        if len == 0 || len > tail.len() {
            break;
        }
        let (field, next) = tail.split_at(len);
        rest = next;
        let (kind, data) = (field[0], &field[1..]);
        match kind {
            UUID16_INCOMPLETE | UUID16_COMPLETE => {
                adv.listed = true;
                adv.complete &= kind == UUID16_COMPLETE;
                for pair in data.chunks_exact(2) {
                    let uuid = u16::from_le_bytes([pair[0], pair[1]]);
                    if let Some(p) = profile_for_uuid16(uuid) {
                        adv.profiles.insert(p);
                    }
                }
            }
            UUID128_INCOMPLETE | UUID128_COMPLETE => {
                adv.listed = true;
                adv.complete &= kind == UUID128_COMPLETE;
                for uuid in data.chunks_exact(16) {
                    if uuid[..12] == BASE_UUID_LE && uuid[14..] == [0, 0] {
                        let short = u16::from_le_bytes([uuid[12], uuid[13]]);
                        if let Some(p) = profile_for_uuid16(short) {
                            adv.profiles.insert(p);
                        }
                    }
                }
            }
            TX_POWER => adv.tx_power = data.first().map(|b| *b as i8),
            _ => {}
        }
    }
    adv.complete &= adv.listed;
    adv
}

/// Estimated path loss in dB, clamped into `0..=255`.
pub fn path_loss(tx_power: i8, rssi: i8) -> u8 {
    (tx_power as i16 - rssi as i16).clamp(0, u8::MAX as i16) as u8
}
