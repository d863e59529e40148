//! Codec capability negotiation.
//!
//! Capability and configuration bytes use the A2DP information-element
//! layouts:
//!
//! SBC (4 bytes)
//!   0: sampling frequency [7:4] (16k, 32k, 44.1k, 48k) | channel mode [3:0]
//!      (mono, dual, stereo, joint)
//!   1: block length [7:4] (4, 8, 12, 16) | subbands [3:2] (4, 8) |
//!      allocation [1:0] (SNR, loudness)
//!   2: minimum bitpool
//!   3: maximum bitpool
//!
//! AAC (6 bytes)
//!   0: object type (MPEG-2 LC 0x80, MPEG-4 LC 0x40, ...)
//!   1: sampling frequency 8k..44.1k
//!   2: sampling frequency 48k..96k [7:4] | channels [3:2] (1, 2)
//!   3..5: VBR [23] | peak bitrate [22:0]
//!
//! The locally configured words pack the first two (SBC) or three (AAC)
//! bytes big-endian.

use serde::{Deserialize, Serialize};

use tandem_core::quality::MIN_BITPOOL;

use crate::event::Seid;
use crate::store::CodecWords;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    Sbc,
    Aac,
    /// Vendor or otherwise unsupported codec.
    #[serde(other)]
    Other,
}

/// One stream endpoint advertised by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub seid: Seid,
    pub codec: CodecKind,
    #[serde(with = "hex_bytes")]
    pub caps: Vec<u8>,
}

/// The record handed to the audio processor once a stream is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecParams {
    pub codec: CodecKind,
    pub sample_rate_hz: u32,
    /// SBC only.
    pub max_bitpool: Option<u8>,
    /// AAC only, bits per second.
    pub bitrate: Option<u32>,
    /// Configuration bytes sent with the open request.
    #[serde(with = "hex_bytes")]
    pub config: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("{codec:?} capabilities truncated ({len} bytes)")]
    Truncated { codec: CodecKind, len: usize },
    #[error("no legal {0} in common with the peer")]
    NoCommonValue(&'static str),
    #[error("bitpool range {min}..={max} is empty")]
    BitpoolRange { min: u8, max: u8 },
    #[error("peer offers no usable endpoint")]
    NoEndpoint,
}

/// A value choice: the bit that selects it and what it means.
type Choice = (u8, u32);

/// Choose one bit of `peer & legal`, walking `order` best-first: a
/// preferred bit wins, otherwise the best peer-supported one.
fn pick(
    name: &'static str,
    peer: u8,
    preferred: u8,
    legal: u8,
    order: &[Choice],
) -> Result<Choice, CodecError> {
    let usable = peer & legal;
    order
        .iter()
        .find(|(bit, _)| usable & preferred & bit != 0)
        .or_else(|| order.iter().find(|(bit, _)| usable & bit != 0))
        .copied()
        .ok_or(CodecError::NoCommonValue(name))
}

// ── SBC ──────────────────────────────────────────────────────────────────────

const SBC_RATES: [Choice; 4] = [(0x20, 44_100), (0x10, 48_000), (0x40, 32_000), (0x80, 16_000)];
const SBC_MODES: [Choice; 4] = [(0x01, 3), (0x02, 2), (0x04, 1), (0x08, 0)];
const SBC_BLOCKS: [Choice; 4] = [(0x10, 16), (0x20, 12), (0x40, 8), (0x80, 4)];
const SBC_SUBBANDS: [Choice; 2] = [(0x04, 8), (0x08, 4)];
const SBC_ALLOCATION: [Choice; 2] = [(0x01, 0), (0x02, 1)];

fn negotiate_sbc(caps: &[u8], words: &CodecWords, max_bitpool: u8) -> Result<CodecParams, CodecError> {
    let [c0, c1, peer_min, peer_max] = match caps {
        [a, b, c, d, ..] => [*a, *b, *c, *d],
        _ => {
            return Err(CodecError::Truncated {
                codec: CodecKind::Sbc,
                len: caps.len(),
            })
        }
    };
    let [l0, l1] = words.sbc_supported.to_be_bytes();
    let [p0, p1] = words.sbc_preferred.to_be_bytes();

    let (rate_bit, rate) = pick("sampling frequency", c0 & 0xF0, p0 & 0xF0, l0 & 0xF0, &SBC_RATES)?;
    let (mode_bit, _) = pick("channel mode", c0 & 0x0F, p0 & 0x0F, l0 & 0x0F, &SBC_MODES)?;
    let (block_bit, _) = pick("block length", c1 & 0xF0, p1 & 0xF0, l1 & 0xF0, &SBC_BLOCKS)?;
    let (sub_bit, _) = pick("subbands", c1 & 0x0C, p1 & 0x0C, l1 & 0x0C, &SBC_SUBBANDS)?;
    let (alloc_bit, _) = pick("allocation method", c1 & 0x03, p1 & 0x03, l1 & 0x03, &SBC_ALLOCATION)?;

    let min = peer_min.max(MIN_BITPOOL);
    let max = peer_max.min(max_bitpool);
    if min > max {
        return Err(CodecError::BitpoolRange { min, max });
    }

    Ok(CodecParams {
        codec: CodecKind::Sbc,
        sample_rate_hz: rate,
        max_bitpool: Some(max),
        bitrate: None,
        config: vec![rate_bit | mode_bit, block_bit | sub_bit | alloc_bit, min, max],
    })
}

// ── AAC ──────────────────────────────────────────────────────────────────────

const AAC_OBJECTS: [Choice; 2] = [(0x80, 2), (0x40, 4)];
const AAC_CHANNELS: [Choice; 2] = [(0x04, 2), (0x08, 1)];
/// Default and ceiling peak bitrate we configure.
const AAC_BITRATE: u32 = 320_000;

fn negotiate_aac(caps: &[u8], words: &CodecWords) -> Result<CodecParams, CodecError> {
    if caps.len() < 6 {
        return Err(CodecError::Truncated {
            codec: CodecKind::Aac,
            len: caps.len(),
        });
    }
    let [_, l0, l1, l2] = words.aac_supported.to_be_bytes();
    let [_, p0, p1, p2] = words.aac_preferred.to_be_bytes();

    let (object_bit, _) = pick("object type", caps[0], p0, l0, &AAC_OBJECTS)?;

    // 44.1k lives in byte 1, 48k in byte 2. Prefer 44.1k, then 48k.
    let peer_44 = caps[1] & 0x01 & l1;
    let peer_48 = caps[2] & 0x80 & l2;
    let (rate_byte1, rate_byte2, rate) = match (peer_44 != 0, peer_48 != 0) {
        (true, true) if p1 & 0x01 == 0 && p2 & 0x80 != 0 => (0x00, 0x80, 48_000),
        (true, _) => (0x01, 0x00, 44_100),
        (false, true) => (0x00, 0x80, 48_000),
        (false, false) => return Err(CodecError::NoCommonValue("sampling frequency")),
    };

    let (channel_bit, _) = pick("channels", caps[2] & 0x0C, p2 & 0x0C, l2 & 0x0C, &AAC_CHANNELS)?;

    let peer_rate = u32::from_be_bytes([0, caps[3] & 0x7F, caps[4], caps[5]]);
    let bitrate = if peer_rate == 0 {
        AAC_BITRATE
    } else {
        peer_rate.min(AAC_BITRATE)
    };
    let [_, b0, b1, b2] = bitrate.to_be_bytes();

    Ok(CodecParams {
        codec: CodecKind::Aac,
        sample_rate_hz: rate,
        max_bitpool: None,
        bitrate: Some(bitrate),
        config: vec![object_bit, rate_byte1, rate_byte2 | channel_bit, b0, b1, b2],
    })
}

// ── Endpoint selection ───────────────────────────────────────────────────────

/// Pick an endpoint and configuration from what the peer offers.
///
/// AAC endpoints are tried first when AAC is enabled; otherwise, or when
/// none negotiates, the first SBC endpoint that negotiates wins.
pub fn negotiate_codec_capabilities(
    endpoints: &[Endpoint],
    words: &CodecWords,
    max_bitpool: u8,
) -> Result<(Seid, CodecParams), CodecError> {
    let mut last_err = CodecError::NoEndpoint;

    if words.aac_enabled {
        for ep in endpoints.iter().filter(|e| e.codec == CodecKind::Aac) {
            match negotiate_aac(&ep.caps, words) {
                Ok(params) => return Ok((ep.seid, params)),
                Err(e) => {
                    tracing::debug!(seid = ep.seid, error = %e, "aac endpoint rejected");
                    last_err = e;
                }
            }
        }
    }

    for ep in endpoints.iter().filter(|e| e.codec == CodecKind::Sbc) {
        match negotiate_sbc(&ep.caps, words, max_bitpool) {
            Ok(params) => return Ok((ep.seid, params)),
            Err(e) => {
                tracing::debug!(seid = ep.seid, error = %e, "sbc endpoint rejected");
                last_err = e;
            }
        }
    }

    Err(last_err)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
