//! Session registry: a fixed-size arena of per-peer sessions.
//!
//! Sessions are addressed by [`SessionId`], a slot index plus the slot's
//! generation. Destroying a session bumps the generation, so ids held by
//! delayed events (timers, late confirmations) stop resolving instead of
//! aliasing whatever session reuses the slot.

use std::fmt;

use serde::Serialize;

use tandem_core::{BdAddr, Profile};

use crate::event::ChannelHandle;
use crate::session::{Role, Session};
use crate::timer::Scheduler;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId {
    index: u16,
    generation: u32,
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    session: Option<Session>,
}

/// Outcome of [`SessionRegistry::destroy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destroy {
    Destroyed,
    /// Some profile is still up; try again once it is down.
    Deferred,
    /// The id no longer names a live session.
    Gone,
}

#[derive(Debug)]
pub struct SessionRegistry {
    slots: Vec<Slot>,
}

impl SessionRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity > 0 && capacity <= u16::MAX as usize,
            "session pool capacity {capacity} out of range"
        );
        Self {
            slots: (0..capacity).map(|_| Slot::default()).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.session.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn find(&self, addr: BdAddr) -> Option<SessionId> {
        self.iter().find(|(_, s)| s.addr() == addr).map(|(id, _)| id)
    }

    /// Look up the session for `addr`, creating it in a free slot when
    /// allowed. `None` means the peer cannot be serviced right now.
    pub fn find_or_create(&mut self, addr: BdAddr, allow_create: bool, role: Role) -> Option<SessionId> {
        if let Some(id) = self.find(addr) {
            return Some(id);
        }
        if !allow_create {
            return None;
        }
        let Some(index) = self.slots.iter().position(|s| s.session.is_none()) else {
            tracing::info!(peer = %addr, capacity = self.capacity(), "session pool full, cannot service peer now");
            return None;
        };
        let slot = &mut self.slots[index];
        slot.session = Some(Session::new(addr, role));
        let id = SessionId {
            index: index as u16,
            generation: slot.generation,
        };
        tracing::debug!(peer = %addr, session = %id, ?role, "session created");
        Some(id)
    }

    /// The session and profile owning a signaling or media handle.
    pub fn find_by_channel_handle(&self, handle: ChannelHandle) -> Option<(SessionId, Profile)> {
        self.iter()
            .find_map(|(id, s)| s.handles.owner(handle).map(|p| (id, p)))
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.session.as_ref())
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.session.as_mut())
    }

    /// Release the session if every profile is Disconnected. Cancels any
    /// timers scoped to it.
    ///
    /// # Panics
    ///
    /// If all profiles are Disconnected but a channel handle is still held.
    pub fn destroy(&mut self, id: SessionId, timers: &mut dyn Scheduler) -> Destroy {
        let Some(slot) = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
        else {
            return Destroy::Gone;
        };
        let Some(session) = slot.session.as_ref() else {
            return Destroy::Gone;
        };
        if !session.all_disconnected() {
            tracing::debug!(peer = %session.addr(), session = %id, "destroy deferred, profiles still up");
            return Destroy::Deferred;
        }
        if session.handles.any() {
            panic!(
                "session {id} for {} is fully disconnected but still holds {:?}",
                session.addr(),
                session.handles
            );
        }
        tracing::debug!(peer = %session.addr(), session = %id, "session destroyed");
        slot.session = None;
        slot.generation = slot.generation.wrapping_add(1);
        timers.cancel_session(id);
        Destroy::Destroyed
    }

    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &Session)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.session.as_ref().map(|s| {
                (
                    SessionId {
                        index: i as u16,
                        generation: slot.generation,
                    },
                    s,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SessionId, &mut Session)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.session.as_mut().map(|s| {
                (
                    SessionId {
                        index: i as u16,
                        generation,
                    },
                    s,
                )
            })
        })
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.iter().map(|(id, _)| id).collect()
    }
}
