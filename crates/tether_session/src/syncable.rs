//! # Syncables and Grips
//!
//! A [`Syncable`] gives a physically simulated object a session-wide id and a
//! fixed sequence of [`Grip`]s. Holder state on a grip only changes through
//! the grab transfer protocol.

use tether_shared::{Handedness, ParticipantId, SyncableId};

use crate::error::{SessionError, SessionResult};
use crate::physics::{ObjectHandle, PhysicsWorld};

/// The hand currently holding a grip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Holder {
    /// Holding participant.
    pub participant: ParticipantId,
    /// Holding hand.
    pub hand: Handedness,
}

/// One attachment point on a syncable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grip {
    /// Position within the syncable's grip sequence.
    pub index: u16,
    /// Current holder, if any.
    pub held_by: Option<Holder>,
    /// Physical object whose transform the grip attaches through. Not owned.
    pub host: ObjectHandle,
}

impl Grip {
    /// Returns true if some hand holds this grip.
    #[inline]
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.held_by.is_some()
    }
}

/// A network-aware wrapper around one physical object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Syncable {
    id: SyncableId,
    handle: ObjectHandle,
    grips: Vec<Grip>,
}

impl Syncable {
    /// Creates a syncable with `grip_count` unheld grips hosted on `handle`.
    #[must_use]
    pub fn new(id: SyncableId, handle: ObjectHandle, grip_count: u16) -> Self {
        let grips = (0..grip_count)
            .map(|index| Grip {
                index,
                held_by: None,
                host: handle,
            })
            .collect();
        Self { id, handle, grips }
    }

    /// Builds a syncable from what the physics engine reports for `handle`.
    ///
    /// Returns `None` if the engine no longer knows the object.
    #[must_use]
    pub fn from_world(
        id: SyncableId,
        handle: ObjectHandle,
        world: &dyn PhysicsWorld,
    ) -> Option<Self> {
        let grip_count = world.grip_count(handle)?;
        let grip_count = u16::try_from(grip_count).unwrap_or(u16::MAX);
        Some(Self::new(id, handle, grip_count))
    }

    /// Session-wide id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SyncableId {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: SyncableId) {
        self.id = id;
    }

    /// Backing physical object.
    #[inline]
    #[must_use]
    pub const fn handle(&self) -> ObjectHandle {
        self.handle
    }

    /// Number of grips. Fixed at construction.
    #[inline]
    #[must_use]
    pub fn grip_count(&self) -> usize {
        self.grips.len()
    }

    /// All grips in index order.
    #[must_use]
    pub fn grips(&self) -> &[Grip] {
        &self.grips
    }

    /// Grip at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::GripOutOfRange`] if `index >= grip_count()`.
    pub fn grip(&self, index: u16) -> SessionResult<&Grip> {
        self.grips.get(usize::from(index)).ok_or(SessionError::GripOutOfRange {
            syncable: self.id,
            index,
            grip_count: self.grips.len(),
        })
    }

    /// Mutable grip at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::GripOutOfRange`] if `index >= grip_count()`.
    pub fn grip_mut(&mut self, index: u16) -> SessionResult<&mut Grip> {
        let (syncable, grip_count) = (self.id, self.grips.len());
        self.grips
            .get_mut(usize::from(index))
            .ok_or(SessionError::GripOutOfRange {
                syncable,
                index,
                grip_count,
            })
    }

    /// Indices of every grip held by `participant`, with the holding hand.
    #[must_use]
    pub fn held_grips_of(&self, participant: ParticipantId) -> Vec<(u16, Handedness)> {
        self.grips
            .iter()
            .filter_map(|grip| match grip.held_by {
                Some(holder) if holder.participant == participant => {
                    Some((grip.index, holder.hand))
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grips_are_indexed_and_unheld() {
        let syncable = Syncable::new(4, ObjectHandle(9), 3);
        assert_eq!(syncable.grip_count(), 3);
        for (i, grip) in syncable.grips().iter().enumerate() {
            assert_eq!(usize::from(grip.index), i);
            assert!(!grip.is_held());
            assert_eq!(grip.host, ObjectHandle(9));
        }
    }

    #[test]
    fn test_out_of_range_grip() {
        let syncable = Syncable::new(4, ObjectHandle(9), 2);
        assert_eq!(
            syncable.grip(2),
            Err(SessionError::GripOutOfRange {
                syncable: 4,
                index: 2,
                grip_count: 2,
            })
        );
    }

    #[test]
    fn test_held_grips_of() {
        let mut syncable = Syncable::new(1, ObjectHandle(1), 3);
        let p = ParticipantId(2);
        syncable.grip_mut(0).unwrap().held_by = Some(Holder {
            participant: p,
            hand: Handedness::Left,
        });
        syncable.grip_mut(2).unwrap().held_by = Some(Holder {
            participant: ParticipantId(3),
            hand: Handedness::Right,
        });

        assert_eq!(syncable.held_grips_of(p), vec![(0, Handedness::Left)]);
        assert!(syncable.held_grips_of(ParticipantId(7)).is_empty());
    }
}
