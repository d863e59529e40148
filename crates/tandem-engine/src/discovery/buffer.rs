//! Bounded candidate buffer, kept sorted best-first (ascending path loss).

use tandem_core::{BdAddr, ProfileSet};

/// A discovered peer being considered for connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub addr: BdAddr,
    pub profiles: ProfileSet,
    pub path_loss: u8,
    /// Advertised data listed every profile the peer has.
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Added,
    /// Same address seen with a better path loss.
    Replaced,
    /// Same address, equal or worse path loss.
    Ignored,
    /// Ranks below everything in a full buffer.
    Full,
}

#[derive(Debug, Clone)]
pub struct CandidateBuffer {
    entries: Vec<Candidate>,
    capacity: usize,
}

impl CandidateBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Insert by rank. Among equal path losses the earlier sighting stays
    /// ahead.
    pub fn insert(&mut self, candidate: Candidate) -> Insert {
        let mut outcome = Insert::Added;
        if let Some(pos) = self.entries.iter().position(|c| c.addr == candidate.addr) {
            if candidate.path_loss >= self.entries[pos].path_loss {
                return Insert::Ignored;
            }
            self.entries.remove(pos);
            outcome = Insert::Replaced;
        }

        let at = self
            .entries
            .partition_point(|c| c.path_loss <= candidate.path_loss);
        if at >= self.capacity {
            return Insert::Full;
        }
        self.entries.insert(at, candidate);
        self.entries.truncate(self.capacity);
        outcome
    }

    /// Remove and return the best candidate.
    pub fn pop_best(&mut self) -> Option<Candidate> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }
}
