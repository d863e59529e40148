//! Persistent configuration collaborator.
//!
//! Reads and writes are synchronous. The daemon backs this with a file of
//! fixed-size records; the engine and its tests use [`MemoryStore`].

use tandem_core::config::{AudioConfig, GatewayConfig};
use tandem_core::record::{MruEntry, MAX_MRU};
use tandem_core::ProfileSet;

/// Static codec preference words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecWords {
    pub sbc_supported: u16,
    pub sbc_preferred: u16,
    pub aac_enabled: bool,
    pub aac_supported: u32,
    pub aac_preferred: u32,
}

impl CodecWords {
    pub fn from_config(audio: &AudioConfig) -> Self {
        Self {
            sbc_supported: audio.sbc_supported,
            sbc_preferred: audio.sbc_preferred,
            aac_enabled: audio.aac_enabled,
            aac_supported: audio.aac_supported & 0x00FF_FFFF,
            aac_preferred: audio.aac_preferred & 0x00FF_FFFF,
        }
    }
}

impl Default for CodecWords {
    fn default() -> Self {
        Self::from_config(&AudioConfig::default())
    }
}

pub trait ConfigStore {
    fn local_profiles(&self) -> ProfileSet;
    fn set_local_profiles(&mut self, profiles: ProfileSet);
    /// PIN candidates in the order they are tried.
    fn pins(&self) -> &[String];
    /// Most recently used first.
    fn mru(&self) -> Vec<MruEntry>;
    /// Move `entry` to the front of the MRU list.
    fn remember(&mut self, entry: MruEntry);
    fn codec_words(&self) -> CodecWords;
}

/// Insert `entry` at the front, dropping any older entry for the same
/// address and anything beyond `capacity`.
pub fn push_mru(list: &mut Vec<MruEntry>, entry: MruEntry, capacity: usize) {
    list.retain(|e| e.addr != entry.addr);
    list.insert(0, entry);
    list.truncate(capacity.min(MAX_MRU));
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    local_profiles: ProfileSet,
    pins: Vec<String>,
    mru: Vec<MruEntry>,
    capacity: usize,
    codec: CodecWords,
}

impl MemoryStore {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            local_profiles: config.profiles.enabled(),
            pins: config.security.pins.clone(),
            mru: Vec::new(),
            capacity: config.session.mru_capacity,
            codec: CodecWords::from_config(&config.audio),
        }
    }

    pub fn with_mru(mut self, mru: Vec<MruEntry>) -> Self {
        for entry in mru.into_iter().rev() {
            push_mru(&mut self.mru, entry, self.capacity);
        }
        self
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

impl ConfigStore for MemoryStore {
    fn local_profiles(&self) -> ProfileSet {
        self.local_profiles
    }

    fn set_local_profiles(&mut self, profiles: ProfileSet) {
        self.local_profiles = profiles;
    }

    fn pins(&self) -> &[String] {
        &self.pins
    }

    fn mru(&self) -> Vec<MruEntry> {
        self.mru.clone()
    }

    fn remember(&mut self, entry: MruEntry) {
        push_mru(&mut self.mru, entry, self.capacity);
    }

    fn codec_words(&self) -> CodecWords {
        self.codec
    }
}
