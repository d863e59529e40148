//! Profiles, profile bitmasks, and per-profile state values.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Profile ──────────────────────────────────────────────────────────────────

/// A logical channel type negotiated with a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Hands-free / headset voice.
    Voice,
    /// Stereo audio streaming.
    Streaming,
    /// Remote-control signaling.
    Control,
}

impl Profile {
    /// Fixed connect and probe priority order.
    pub const PRIORITY: [Profile; 3] = [Profile::Voice, Profile::Streaming, Profile::Control];

    /// Bit used for this profile at the persistence boundary.
    pub const fn bit(self) -> u8 {
        match self {
            Profile::Voice => 0x01,
            Profile::Streaming => 0x02,
            Profile::Control => 0x04,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Profile::Voice => "voice",
            Profile::Streaming => "streaming",
            Profile::Control => "control",
        };
        f.write_str(name)
    }
}

// ── ProfileSet ───────────────────────────────────────────────────────────────

/// Set of profiles, stored as the persisted bitmask.
///
/// Bits outside the three known profiles are dropped on construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct ProfileSet(u8);

impl ProfileSet {
    const MASK: u8 = 0x07;

    pub const EMPTY: ProfileSet = ProfileSet(0);
    pub const ALL: ProfileSet = ProfileSet(Self::MASK);

    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::MASK)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn single(profile: Profile) -> Self {
        Self(profile.bit())
    }

    pub fn contains(self, profile: Profile) -> bool {
        self.0 & profile.bit() != 0
    }

    pub fn insert(&mut self, profile: Profile) {
        self.0 |= profile.bit();
    }

    pub fn remove(&mut self, profile: Profile) {
        self.0 &= !profile.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn intersection(self, other: ProfileSet) -> ProfileSet {
        ProfileSet(self.0 & other.0)
    }

    pub fn union(self, other: ProfileSet) -> ProfileSet {
        ProfileSet(self.0 | other.0)
    }

    /// Members of `self` not in `other`.
    pub fn difference(self, other: ProfileSet) -> ProfileSet {
        ProfileSet(self.0 & !other.0)
    }

    /// True if every profile in `self` is also in `other`.
    pub fn is_subset(self, other: ProfileSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Members in priority order.
    pub fn iter(self) -> impl Iterator<Item = Profile> {
        Profile::PRIORITY.into_iter().filter(move |p| self.contains(*p))
    }
}

impl From<u8> for ProfileSet {
    fn from(bits: u8) -> Self {
        Self::from_bits_truncate(bits)
    }
}

impl From<ProfileSet> for u8 {
    fn from(set: ProfileSet) -> u8 {
        set.0
    }
}

impl FromIterator<Profile> for ProfileSet {
    fn from_iter<I: IntoIterator<Item = Profile>>(iter: I) -> Self {
        let mut set = ProfileSet::EMPTY;
        for p in iter {
            set.insert(p);
        }
        set
    }
}

impl fmt::Debug for ProfileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// ── Per-profile state ────────────────────────────────────────────────────────

/// Lifecycle state shared by the three profile state machines.
///
/// Voice and Control only ever use the connect/disconnect subset; the
/// Opening..Closing states belong to the streaming media channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileState {
    #[default]
    Disconnected,
    /// Outbound connect requested, waiting for the confirmation.
    Paging,
    /// Inbound connect accepted, waiting for the confirmation.
    Paged,
    Connected,
    Opening,
    Open,
    Starting,
    Streaming,
    Suspending,
    Closing,
    Disconnecting,
}

impl ProfileState {
    pub fn is_disconnected(self) -> bool {
        matches!(self, ProfileState::Disconnected)
    }

    /// Signaling is up (anything from Connected through Closing).
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ProfileState::Connected
                | ProfileState::Opening
                | ProfileState::Open
                | ProfileState::Starting
                | ProfileState::Streaming
                | ProfileState::Suspending
                | ProfileState::Closing
        )
    }

    /// A media channel exists for this profile.
    pub fn has_media(self) -> bool {
        matches!(
            self,
            ProfileState::Open
                | ProfileState::Starting
                | ProfileState::Streaming
                | ProfileState::Suspending
        )
    }

    pub fn is_connecting(self) -> bool {
        matches!(self, ProfileState::Paging | ProfileState::Paged)
    }
}

/// Call sub-state of the voice profile. Independent of the audio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Idle,
    Setup,
    Active,
    Shutdown,
}
