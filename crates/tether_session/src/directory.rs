//! # Ownership Directory
//!
//! Maps [`SyncableId`]s to the [`Syncable`]s this peer knows about.
//!
//! ## Design
//!
//! - One directory per session, cleared on session end
//! - Ids are unique among registered syncables and reusable after removal
//! - Unknown ids can be resolved lazily through a world-path lookup

use std::collections::{BTreeMap, HashMap};

use tether_shared::{SyncableId, PATH_SENTINEL};

use crate::error::{SessionError, SessionResult};
use crate::physics::{ObjectHandle, PhysicsWorld};
use crate::syncable::Syncable;

/// Registry of syncables keyed by session-wide id.
#[derive(Clone, Debug, Default)]
pub struct OwnershipDirectory {
    syncables: BTreeMap<SyncableId, Syncable>,
    by_handle: HashMap<ObjectHandle, SyncableId>,
}

impl OwnershipDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a registered syncable.
    #[must_use]
    pub fn try_get(&self, id: SyncableId) -> Option<&Syncable> {
        self.syncables.get(&id)
    }

    /// Looks up a registered syncable for mutation.
    pub fn try_get_mut(&mut self, id: SyncableId) -> Option<&mut Syncable> {
        self.syncables.get_mut(&id)
    }

    /// Id under which the object `handle` is registered.
    #[must_use]
    pub fn find_by_handle(&self, handle: ObjectHandle) -> Option<SyncableId> {
        self.by_handle.get(&handle).copied()
    }

    /// Registers `syncable` under `id`.
    ///
    /// Registering the same object under the same id again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SyncableConflict`] if `id` is taken by another
    /// object, or if the object is already registered under a different id.
    pub fn register(&mut self, mut syncable: Syncable, id: SyncableId) -> SessionResult<()> {
        let handle = syncable.handle();

        if let Some(existing) = self.syncables.get(&id) {
            if existing.handle() == handle {
                return Ok(());
            }
            tracing::error!(syncable = id, "Id already registered to a different object");
            return Err(SessionError::SyncableConflict(id));
        }
        if let Some(other) = self.by_handle.get(&handle) {
            tracing::error!(syncable = id, existing = *other, "Object already registered");
            return Err(SessionError::SyncableConflict(id));
        }

        syncable.assign_id(id);
        self.by_handle.insert(handle, id);
        self.syncables.insert(id, syncable);
        tracing::debug!(syncable = id, "Registered syncable");
        Ok(())
    }

    /// Removes the syncable registered under `id`.
    pub fn unregister(&mut self, id: SyncableId) -> Option<Syncable> {
        let removed = self.syncables.remove(&id)?;
        self.by_handle.remove(&removed.handle());
        tracing::debug!(syncable = id, "Unregistered syncable");
        Some(removed)
    }

    /// Resolves `id`, constructing and registering a syncable from the world
    /// when the id is unknown and `path_hint` names a loaded object.
    ///
    /// Returns `None` when neither lookup succeeds. The object is then simply
    /// not loaded on this peer yet. Also returns `None` when `id` is taken
    /// locally by an object at a different path than `path_hint`.
    pub fn resolve(
        &mut self,
        id: SyncableId,
        path_hint: &str,
        world: &dyn PhysicsWorld,
    ) -> Option<&mut Syncable> {
        let has_path = path_hint != PATH_SENTINEL && !path_hint.is_empty();
        if let Some(handle) = self.syncables.get(&id).map(Syncable::handle) {
            if has_path && world.path_of(handle).is_some_and(|local| local != path_hint) {
                tracing::warn!(
                    syncable = id,
                    path = path_hint,
                    "Syncable id is bound to a different object on this peer"
                );
                return None;
            }
            return self.syncables.get_mut(&id);
        }
        if !has_path {
            return None;
        }

        let handle = world.resolve_path(path_hint)?;
        if let Some(existing) = self.find_by_handle(handle) {
            tracing::debug!(
                syncable = id,
                existing,
                path = path_hint,
                "Path resolves to an object registered under another id"
            );
            return self.syncables.get_mut(&existing);
        }

        let syncable = Syncable::from_world(id, handle, world)?;
        self.register(syncable, id).ok()?;
        self.syncables.get_mut(&id)
    }

    /// Lowest id not currently registered.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SyncableIdsExhausted`] if all 65536 ids are in use.
    pub fn next_free_id(&self) -> SessionResult<SyncableId> {
        let mut candidate: SyncableId = 0;
        for &taken in self.syncables.keys() {
            if taken != candidate {
                return Ok(candidate);
            }
            candidate = candidate.checked_add(1).ok_or(SessionError::SyncableIdsExhausted)?;
        }
        Ok(candidate)
    }

    /// Drops syncables whose backing object no longer exists.
    ///
    /// Returns the number of syncables removed.
    pub fn prune_destroyed(&mut self, world: &dyn PhysicsWorld) -> usize {
        let dead: Vec<SyncableId> = self
            .syncables
            .values()
            .filter(|s| world.grip_count(s.handle()).is_none())
            .map(Syncable::id)
            .collect();
        for id in &dead {
            self.unregister(*id);
        }
        dead.len()
    }

    /// Iterates every registered syncable in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Syncable> {
        self.syncables.values()
    }

    /// Iterates every registered syncable mutably in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Syncable> {
        self.syncables.values_mut()
    }

    /// Drops every syncable.
    pub fn clear(&mut self) {
        self.syncables.clear();
        self.by_handle.clear();
    }

    /// Number of registered syncables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.syncables.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.syncables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxWorld;
    use tether_shared::Transform;

    #[test]
    fn test_register_then_get() {
        let mut directory = OwnershipDirectory::new();
        let syncable = Syncable::new(0, ObjectHandle(5), 2);

        directory.register(syncable, 12).unwrap();
        let found = directory.try_get(12).unwrap();
        assert_eq!(found.id(), 12);
        assert_eq!(found.handle(), ObjectHandle(5));
        assert_eq!(directory.find_by_handle(ObjectHandle(5)), Some(12));

        assert!(directory.unregister(12).is_some());
        assert!(directory.try_get(12).is_none());
        assert!(directory.find_by_handle(ObjectHandle(5)).is_none());
    }

    #[test]
    fn test_conflicting_register_keeps_original() {
        let mut directory = OwnershipDirectory::new();
        directory.register(Syncable::new(0, ObjectHandle(1), 1), 3).unwrap();

        assert_eq!(
            directory.register(Syncable::new(0, ObjectHandle(2), 1), 3),
            Err(SessionError::SyncableConflict(3))
        );
        assert_eq!(directory.try_get(3).unwrap().handle(), ObjectHandle(1));

        // Same object, same id: accepted silently.
        assert!(directory.register(Syncable::new(0, ObjectHandle(1), 1), 3).is_ok());
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_next_free_id_fills_gaps() {
        let mut directory = OwnershipDirectory::new();
        assert_eq!(directory.next_free_id(), Ok(0));
        for (id, handle) in [(0, 10), (1, 11), (3, 13)] {
            directory.register(Syncable::new(0, ObjectHandle(handle), 1), id).unwrap();
        }
        assert_eq!(directory.next_free_id(), Ok(2));
        directory.unregister(0);
        assert_eq!(directory.next_free_id(), Ok(0));
    }

    #[test]
    fn test_resolve_prefers_id_then_path() {
        let world = SandboxWorld::new();
        let crate_handle = world.spawn("Level/Crate", Transform::IDENTITY, 2);
        let mut directory = OwnershipDirectory::new();

        assert!(directory.resolve(7, PATH_SENTINEL, &world).is_none());
        assert!(directory.resolve(7, "Level/Missing", &world).is_none());

        let resolved = directory.resolve(7, "Level/Crate", &world).unwrap();
        assert_eq!(resolved.handle(), crate_handle);
        assert_eq!(resolved.grip_count(), 2);

        // Now known by id; the hint is ignored.
        assert_eq!(directory.resolve(7, PATH_SENTINEL, &world).unwrap().id(), 7);
    }

    #[test]
    fn test_resolve_refuses_id_bound_elsewhere() {
        let world = SandboxWorld::new();
        world.spawn("Level/Crate", Transform::IDENTITY, 1);
        world.spawn("Level/Barrel", Transform::IDENTITY, 1);
        let mut directory = OwnershipDirectory::new();
        directory.resolve(0, "Level/Crate", &world).unwrap();

        assert!(directory.resolve(0, "Level/Barrel", &world).is_none());
        assert!(directory.resolve(0, "Level/Crate", &world).is_some());
    }

    #[test]
    fn test_prune_destroyed() {
        let world = SandboxWorld::new();
        let a = world.spawn("A", Transform::IDENTITY, 1);
        let b = world.spawn("B", Transform::IDENTITY, 1);
        let mut directory = OwnershipDirectory::new();
        directory.register(Syncable::new(0, a, 1), 0).unwrap();
        directory.register(Syncable::new(0, b, 1), 1).unwrap();

        world.destroy(a);
        assert_eq!(directory.prune_destroyed(&world), 1);
        assert!(directory.try_get(0).is_none());
        assert!(directory.try_get(1).is_some());
    }
}
