//! Persistent store records: the fixed-size on-disk layout.
//!
//! These types ARE the storage format. Every field and every reserved byte
//! is part of it; changing anything here invalidates existing store files.
//!
//! All types are #[repr(C, packed)] for deterministic layout and use
//! zerocopy derives for allocation-free encoding. There is no unsafe code
//! in this module.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::addr::BdAddr;
use crate::profile::ProfileSet;

// ── Header ───────────────────────────────────────────────────────────────────

/// First record of every store file.
///
/// Size: 8 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct StoreHeader {
    /// Always STORE_MAGIC.
    pub magic: [u8; 4],

    /// Layout version. Currently 0x01.
    pub version: u8,

    /// Locally enabled profile bitmask (ProfileSet bits).
    pub local_profiles: u8,

    /// Number of MruRecord entries following the header.
    pub mru_count: u8,

    /// Reserved, must be zero.
    pub reserved: u8,
}

assert_eq_size!(StoreHeader, [u8; 8]);

// ── Most-recently-used peer ──────────────────────────────────────────────────

/// One entry of the most-recently-used peer list.
///
/// Size: 8 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct MruRecord {
    /// Peer address, most significant byte first.
    pub addr: [u8; 6],

    /// Profiles last seen connected (ProfileSet bits).
    pub profiles: u8,

    /// Index into the PIN candidate list that last authenticated.
    pub pin_index: u8,
}

assert_eq_size!(MruRecord, [u8; 8]);

// ── Constants ────────────────────────────────────────────────────────────────

pub const STORE_MAGIC: [u8; 4] = *b"TNDM";

pub const STORE_VERSION: u8 = 0x01;

/// Hard upper bound on the MRU list, independent of configuration.
pub const MAX_MRU: usize = 8;

// ── Decoded form ─────────────────────────────────────────────────────────────

/// A most-recently-used peer, as the engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MruEntry {
    pub addr: BdAddr,
    pub profiles: ProfileSet,
    pub pin_index: u8,
}

impl From<&MruRecord> for MruEntry {
    fn from(r: &MruRecord) -> Self {
        Self {
            addr: BdAddr::new(r.addr),
            profiles: ProfileSet::from_bits_truncate(r.profiles),
            pin_index: r.pin_index,
        }
    }
}

impl From<&MruEntry> for MruRecord {
    fn from(e: &MruEntry) -> Self {
        Self {
            addr: e.addr.bytes(),
            profiles: e.profiles.bits(),
            pin_index: e.pin_index,
        }
    }
}

/// Contents of a store file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreImage {
    pub local_profiles: ProfileSet,
    pub mru: Vec<MruEntry>,
}

impl StoreImage {
    /// Encode header plus records. Entries beyond MAX_MRU are not written.
    pub fn encode(&self) -> Vec<u8> {
        let count = self.mru.len().min(MAX_MRU);
        let header = StoreHeader {
            magic: STORE_MAGIC,
            version: STORE_VERSION,
            local_profiles: self.local_profiles.bits(),
            mru_count: count as u8,
            reserved: 0,
        };
        let mut out = Vec::with_capacity(8 * (count + 1));
        out.extend_from_slice(header.as_bytes());
        for entry in &self.mru[..count] {
            out.extend_from_slice(MruRecord::from(entry).as_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let header = StoreHeader::read_from_prefix(bytes).ok_or(RecordError::Truncated(bytes.len()))?;
        if header.magic != STORE_MAGIC {
            return Err(RecordError::BadMagic(header.magic));
        }
        if header.version != STORE_VERSION {
            return Err(RecordError::UnknownVersion(header.version));
        }
        let count = header.mru_count as usize;
        if count > MAX_MRU {
            return Err(RecordError::TooManyRecords(count));
        }

        let body = &bytes[std::mem::size_of::<StoreHeader>()..];
        let mut mru = Vec::with_capacity(count);
        for i in 0..count {
            let start = i * std::mem::size_of::<MruRecord>();
            let record = body
                .get(start..)
                .and_then(MruRecord::read_from_prefix)
                .ok_or(RecordError::Truncated(bytes.len()))?;
            let entry = MruEntry::from(&record);
            // Zeroed slots are holes left by an interrupted write.
            if !entry.addr.is_zero() {
                mru.push(entry);
            }
        }

        Ok(Self {
            local_profiles: ProfileSet::from_bits_truncate(header.local_profiles),
            mru,
        })
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("store truncated at {0} bytes")]
    Truncated(usize),

    #[error("bad store magic: {}", hex::encode(.0))]
    BadMagic([u8; 4]),

    #[error("unknown store version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("store claims {0} records, maximum is {}", MAX_MRU)]
    TooManyRecords(usize),
}

// ── Tests ────────────────────────────────────────────────────────────────────
