//! In-memory physics engine for tests and tools.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tether_shared::{Handedness, ParticipantId, Transform};

use crate::physics::{ObjectHandle, PhysicsWorld};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Binding {
    participant: ParticipantId,
    hand: Handedness,
    pose: Transform,
}

#[derive(Clone, Debug)]
struct SandboxObject {
    path: String,
    transform: Transform,
    grips: Vec<Option<Binding>>,
}

#[derive(Debug, Default)]
struct WorldState {
    objects: BTreeMap<ObjectHandle, SandboxObject>,
    hands: HashMap<(ParticipantId, Handedness), Transform>,
    next_handle: u32,
    refuse_grabs: bool,
}

/// Objects with transforms and grips, plus participants' hands.
///
/// Clones share the same world, so a test can keep a handle while the
/// session owns another.
#[derive(Clone, Debug, Default)]
pub struct SandboxWorld {
    state: Arc<Mutex<WorldState>>,
}

impl SandboxWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object reachable under `path`.
    pub fn spawn(&self, path: &str, transform: Transform, grip_count: usize) -> ObjectHandle {
        let mut state = self.state.lock();
        let handle = ObjectHandle(state.next_handle);
        state.next_handle += 1;
        state.objects.insert(
            handle,
            SandboxObject {
                path: path.to_string(),
                transform,
                grips: vec![None; grip_count],
            },
        );
        handle
    }

    /// Removes an object. Its handle stops resolving.
    pub fn destroy(&self, handle: ObjectHandle) -> bool {
        self.state.lock().objects.remove(&handle).is_some()
    }

    /// Places a participant's hand.
    pub fn set_hand(&self, participant: ParticipantId, hand: Handedness, transform: Transform) {
        self.state.lock().hands.insert((participant, hand), transform);
    }

    /// Makes every subsequent grab fail while `refuse` is set.
    pub fn refuse_grabs(&self, refuse: bool) {
        self.state.lock().refuse_grabs = refuse;
    }

    /// Object pose at the moment grip `grip` was bound.
    #[must_use]
    pub fn grab_pose(&self, handle: ObjectHandle, grip: usize) -> Option<Transform> {
        self.binding(handle, grip).map(|b| b.pose)
    }

    /// Hand bound to grip `grip`, if any.
    #[must_use]
    pub fn holder_of(
        &self,
        handle: ObjectHandle,
        grip: usize,
    ) -> Option<(ParticipantId, Handedness)> {
        self.binding(handle, grip).map(|b| (b.participant, b.hand))
    }

    fn binding(&self, handle: ObjectHandle, grip: usize) -> Option<Binding> {
        *self.state.lock().objects.get(&handle)?.grips.get(grip)?
    }
}

impl PhysicsWorld for SandboxWorld {
    fn resolve_path(&self, path: &str) -> Option<ObjectHandle> {
        self.state
            .lock()
            .objects
            .iter()
            .find(|(_, object)| object.path == path)
            .map(|(handle, _)| *handle)
    }

    fn path_of(&self, handle: ObjectHandle) -> Option<String> {
        self.state.lock().objects.get(&handle).map(|o| o.path.clone())
    }

    fn grip_count(&self, handle: ObjectHandle) -> Option<usize> {
        self.state.lock().objects.get(&handle).map(|o| o.grips.len())
    }

    fn transform(&self, handle: ObjectHandle) -> Option<Transform> {
        self.state.lock().objects.get(&handle).map(|o| o.transform)
    }

    fn set_transform(&mut self, handle: ObjectHandle, transform: Transform) -> bool {
        match self.state.lock().objects.get_mut(&handle) {
            Some(object) => {
                object.transform = transform;
                true
            }
            None => false,
        }
    }

    fn hand_transform(&self, participant: ParticipantId, hand: Handedness) -> Option<Transform> {
        self.state.lock().hands.get(&(participant, hand)).copied()
    }

    fn grab(
        &mut self,
        handle: ObjectHandle,
        participant: ParticipantId,
        hand: Handedness,
        grip: usize,
    ) -> bool {
        let mut state = self.state.lock();
        if state.refuse_grabs {
            return false;
        }
        let Some(object) = state.objects.get_mut(&handle) else {
            return false;
        };
        let pose = object.transform;
        match object.grips.get_mut(grip) {
            Some(slot) => {
                *slot = Some(Binding {
                    participant,
                    hand,
                    pose,
                });
                true
            }
            None => false,
        }
    }

    fn release(&mut self, handle: ObjectHandle, grip: usize) -> bool {
        let mut state = self.state.lock();
        state
            .objects
            .get_mut(&handle)
            .and_then(|object| object.grips.get_mut(grip))
            .and_then(Option::take)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_shared::{Quaternion, Vec3};

    #[test]
    fn test_grab_binds_current_pose() {
        let mut world = SandboxWorld::new();
        let start = Transform::new(Vec3::new(1.0, 2.0, 3.0), Quaternion::IDENTITY);
        let handle = world.spawn("Props/Cup", start, 2);

        assert_eq!(world.resolve_path("Props/Cup"), Some(handle));
        assert_eq!(world.path_of(handle).as_deref(), Some("Props/Cup"));
        assert!(world.grab(handle, ParticipantId(1), Handedness::Right, 1));
        assert_eq!(world.grab_pose(handle, 1), Some(start));
        assert!(!world.grab(handle, ParticipantId(1), Handedness::Right, 2));

        assert!(world.release(handle, 1));
        assert!(!world.release(handle, 1));
    }

    #[test]
    fn test_clones_share_state() {
        let world = SandboxWorld::new();
        let mut other = world.clone();
        let handle = world.spawn("A", Transform::IDENTITY, 1);
        let moved = Transform::new(Vec3::X, Quaternion::IDENTITY);

        assert!(other.set_transform(handle, moved));
        assert_eq!(world.transform(handle), Some(moved));
        world.destroy(handle);
        assert!(other.transform(handle).is_none());
    }
}
