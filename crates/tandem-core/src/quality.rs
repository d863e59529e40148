//! Audio quality tiers and the static encoder bitpool tables.
//!
//! Tiers (worst → best):
//!   Unknown: not yet probed, treated as Low
//!   Low, Medium, Good, High
//!
//! Each tier maps to an SBC bitpool for a healthy link and a smaller
//! "poor-link" bitpool the encoder falls back to under packet loss.

use serde::{Deserialize, Serialize};

/// Smallest bitpool any SBC encoder accepts.
pub const MIN_BITPOOL: u8 = 2;

const NORMAL_BITPOOL: [u8; 4] = [29, 35, 45, 53];
const POOR_LINK_BITPOOL: [u8; 4] = [20, 26, 32, 35];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Unknown,
    Low,
    Medium,
    Good,
    High,
}

impl Quality {
    /// One tier lower. Saturates at Low; Unknown also lands on Low.
    pub fn downgrade(self) -> Quality {
        match self {
            Quality::High => Quality::Good,
            Quality::Good => Quality::Medium,
            Quality::Medium | Quality::Low | Quality::Unknown => Quality::Low,
        }
    }

    /// The tier to plan with: Unknown assumes the worst.
    pub fn effective(self) -> Quality {
        match self {
            Quality::Unknown => Quality::Low,
            q => q,
        }
    }

    fn table_index(self) -> usize {
        match self.effective() {
            Quality::Unknown | Quality::Low => 0,
            Quality::Medium => 1,
            Quality::Good => 2,
            Quality::High => 3,
        }
    }

    /// Bitpool for a healthy link at this tier.
    pub fn bitpool(self) -> u8 {
        NORMAL_BITPOOL[self.table_index()]
    }

    /// Bitpool for a degraded link at this tier.
    pub fn poor_link_bitpool(self) -> u8 {
        POOR_LINK_BITPOOL[self.table_index()]
    }
}

/// Result of one arbitration pass, pushed to the audio processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityChoice {
    pub quality: Quality,
    pub bitpool: u8,
    pub poor_link_bitpool: u8,
}

impl QualityChoice {
    /// Look up both table entries for `quality`, clamped into
    /// `[MIN_BITPOOL, max_bitpool]`.
    pub fn for_quality(quality: Quality, max_bitpool: u8) -> Self {
        let ceiling = max_bitpool.max(MIN_BITPOOL);
        Self {
            quality: quality.effective(),
            bitpool: quality.bitpool().clamp(MIN_BITPOOL, ceiling),
            poor_link_bitpool: quality.poor_link_bitpool().clamp(MIN_BITPOOL, ceiling),
        }
    }
}
