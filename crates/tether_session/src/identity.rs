//! # Identity Registry
//!
//! Maps every participant of the session to a stable small integer.
//! Ids are handed out lowest-free-first and become reusable after the
//! participant leaves.

use std::collections::BTreeSet;

use tether_shared::ParticipantId;

/// Set of participants currently in the session.
#[derive(Clone, Debug)]
pub struct IdentityRegistry {
    /// This process's own id.
    local: ParticipantId,
    /// The session's authoritative peer.
    server: ParticipantId,
    /// Everyone currently joined, including `local` and `server`.
    participants: BTreeSet<ParticipantId>,
}

impl IdentityRegistry {
    /// Creates a registry containing the local participant and the server.
    #[must_use]
    pub fn new(local: ParticipantId, server: ParticipantId) -> Self {
        let mut participants = BTreeSet::new();
        participants.insert(local);
        participants.insert(server);
        Self {
            local,
            server,
            participants,
        }
    }

    /// Allocates the lowest free id and registers it.
    ///
    /// Returns `None` once all 256 ids are taken.
    pub fn join(&mut self) -> Option<ParticipantId> {
        let id = (0..=u8::MAX)
            .map(ParticipantId)
            .find(|id| !self.participants.contains(id))?;
        self.participants.insert(id);
        Some(id)
    }

    /// Registers an id assigned elsewhere. Returns false if already present.
    pub fn insert(&mut self, id: ParticipantId) -> bool {
        self.participants.insert(id)
    }

    /// Retires an id. Returns false if it was not registered.
    pub fn leave(&mut self, id: ParticipantId) -> bool {
        self.participants.remove(&id)
    }

    /// Returns true if `id` is currently in the session.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.participants.contains(&id)
    }

    /// All participants in ascending id order.
    pub fn ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.participants.iter().copied()
    }

    /// Snapshot of all participant ids.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ParticipantId> {
        self.ids().collect()
    }

    /// This process's id.
    #[inline]
    #[must_use]
    pub const fn local(&self) -> ParticipantId {
        self.local
    }

    /// The authoritative peer's id.
    #[inline]
    #[must_use]
    pub const fn server(&self) -> ParticipantId {
        self.server
    }

    /// Returns true if this process is the authoritative peer.
    #[inline]
    #[must_use]
    pub fn is_server(&self) -> bool {
        self.local == self.server
    }

    /// Number of participants.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Returns true if nobody is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
